//! Robots.txt parser implementation
//!
//! Rule matching is delegated to the robotstxt crate; only the `Crawl-delay`
//! extension, which that crate ignores, is parsed here.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data for one origin
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used when the origin has no robots.txt or it could not be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Builds from an optional robots.txt body; `None` allows everything
    pub fn from_optional(content: Option<&str>) -> Self {
        content.map_or_else(Self::allow_all, Self::from_content)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// True when the file carries any `Disallow` rule
    pub fn has_disallow_rules(&self) -> bool {
        self.directives()
            .any(|(key, value)| key == "disallow" && !value.is_empty())
    }

    /// Checks if a URL is allowed for the given crawler token
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `user_agent` - The crawler token, e.g. `Googlebot`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay in seconds that applies to `user_agent`
    ///
    /// A delay in a group naming the agent wins over one in the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }

        let agent = user_agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut for_wildcard = None;
        let mut for_agent = None;

        for (key, value) in self.directives() {
            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after rules starts a new group
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        for_agent = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        for_wildcard = Some(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        for_agent.or(for_wildcard)
    }

    /// Iterates `(lowercase key, trimmed value)` pairs, skipping comments
    fn directives(&self) -> impl Iterator<Item = (String, &str)> {
        self.content.lines().filter_map(|line| {
            let line = line.split('#').next().unwrap_or("").trim();
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_lowercase(), value.trim()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/admin", "Googlebot"));
        assert!(!robots.has_disallow_rules());
    }

    #[test]
    fn test_disallow_all() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("https://example.com/", "Googlebot"));
        assert!(!robots.is_allowed("https://example.com/page", "Googlebot"));
        assert!(robots.has_disallow_rules());
    }

    #[test]
    fn test_disallow_prefix() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(robots.is_allowed("https://example.com/page", "Googlebot"));
        assert!(!robots.is_allowed("https://example.com/admin/users", "Googlebot"));
    }

    #[test]
    fn test_allow_overrides_longer_match() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/public";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("https://example.com/private", "Googlebot"));
        assert!(robots.is_allowed("https://example.com/private/public", "Googlebot"));
    }

    #[test]
    fn test_agent_specific_group() {
        let content = "User-agent: Googlebot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("https://example.com/page", "Googlebot"));
        assert!(robots.is_allowed("https://example.com/page", "Bingbot"));
    }

    #[test]
    fn test_empty_disallow_is_not_a_rule() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow:\n");
        assert!(!robots.has_disallow_rules());
        assert!(robots.is_allowed("https://example.com/anything", "Googlebot"));
    }

    #[test]
    fn test_garbage_allows() {
        let robots = ParsedRobots::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("https://example.com/any/path", "Googlebot"));
    }

    #[test]
    fn test_from_optional() {
        assert!(ParsedRobots::from_optional(None).is_allowed("/x", "Googlebot"));
        let robots = ParsedRobots::from_optional(Some("User-agent: *\nDisallow: /x"));
        assert!(!robots.is_allowed("https://example.com/x", "Googlebot"));
    }

    #[test]
    fn test_crawl_delay_prefers_named_agent() {
        let content = "User-agent: Googlebot\nCrawl-delay: 5\n\nUser-agent: *\nCrawl-delay: 10";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("Googlebot"), Some(5.0));
        assert_eq!(robots.crawl_delay("Bingbot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let content = "User-agent: BotA\nUser-agent: BotB\nDisallow: /tmp\nCrawl-delay: 3";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("bota"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotB"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_crawl_delay_with_comment() {
        let robots = ParsedRobots::from_content("User-agent: * # everyone\nCrawl-delay: 2.5 # slow");
        assert_eq!(robots.crawl_delay("Googlebot"), Some(2.5));
    }
}
