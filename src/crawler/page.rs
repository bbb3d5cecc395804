use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// One redirect response followed while fetching a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectHop {
    /// URL that answered with the redirect
    pub url: String,
    pub status: u16,
}

/// A fetched page as seen by the checks
///
/// Produced once per fetch attempt and never modified afterwards.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: Url,

    /// URL the fetch started from
    pub requested_url: Url,

    pub status_code: u16,

    /// Response headers keyed by lowercase name; repeated headers are joined with `, `
    pub headers: BTreeMap<String, String>,

    /// Body decoded as UTF-8 (lossily), cut at the configured byte limit
    pub body: String,

    /// Bytes received from the server, including any past the limit
    pub body_bytes: usize,

    /// True when the body exceeded the byte limit
    pub truncated: bool,

    pub fetched_at: DateTime<Utc>,

    /// Every redirect followed, in order
    pub redirect_chain: Vec<RedirectHop>,

    /// The origin's robots.txt, when one was found
    pub robots_txt: Option<String>,

    /// Wall time spent fetching, redirects and robots.txt included
    pub elapsed: Duration,
}

impl Page {
    /// Builds a 200 OK page around static markup, mainly for exercising checks
    pub fn from_html(url: Url, html: impl Into<String>) -> Self {
        let body = html.into();
        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "text/html; charset=utf-8".to_string(),
        );
        Self {
            requested_url: url.clone(),
            url,
            status_code: 200,
            headers,
            body_bytes: body.len(),
            body,
            truncated: false,
            fetched_at: Utc::now(),
            redirect_chain: Vec::new(),
            robots_txt: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn was_redirected(&self) -> bool {
        !self.redirect_chain.is_empty()
    }
}
