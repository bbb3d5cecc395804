//! URL handling module
//!
//! Target validation for submitted URLs, normalization into identity keys
//! (deduplication and canonical comparison), and same-site tests used when
//! classifying links.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_same_site};
pub use normalize::{normalize_url, same_document};

use crate::UrlError;
use url::Url;

/// Validates that a submitted target is an absolute HTTP(S) URL with a host
///
/// Unlike [`normalize_url`] this keeps the URL exactly as submitted (apart
/// from the parser's own canonicalization) so the fetch goes to what the
/// tenant asked for.
///
/// # Examples
///
/// ```
/// use autoseo::url::validate_target_url;
///
/// assert!(validate_target_url("https://example.com/").is_ok());
/// assert!(validate_target_url("/relative/path").is_err());
/// assert!(validate_target_url("mailto:someone@example.com").is_err());
/// ```
pub fn validate_target_url(raw: &str) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let url = Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::InvalidScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}
