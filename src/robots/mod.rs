//! Robots.txt handling module
//!
//! The fetcher looks up robots.txt once per origin and keeps it in a
//! [`RobotsCache`]; the robots check evaluates the cached rules against the
//! analyzed URL with [`ParsedRobots`].

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use url::Url;

/// Returns the robots.txt location for the origin serving `url`
///
/// # Examples
///
/// ```
/// use url::Url;
/// use autoseo::robots::robots_url;
///
/// let page = Url::parse("https://example.com:8443/blog/post?id=1").unwrap();
/// assert_eq!(
///     robots_url(&page).unwrap().as_str(),
///     "https://example.com:8443/robots.txt"
/// );
/// ```
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}

/// Cache key for the origin serving `url` (scheme, host and port)
pub fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}
