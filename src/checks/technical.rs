//! Technical SEO checks: canonical URL, crawl directives, page weight and
//! structured data

use crate::checks::{Check, CheckError, CheckInput, CheckOutcome, Severity};
use crate::config::ChecksConfig;
use crate::robots::ParsedRobots;
use crate::url::same_document;
use serde_json::Value;

/// One canonical link, resolvable and pointing at this page
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalCheck;

impl Check for CanonicalCheck {
    fn id(&self) -> &str {
        "canonical"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let canonicals = &input.parsed.canonicals;
        outcome.metric("canonical_links", canonicals.len());

        let Some(first) = canonicals.first() else {
            outcome.limit(50);
            outcome.warning("Missing canonical link");
            return Ok(outcome);
        };

        if canonicals.len() > 1 {
            outcome.limit(50);
            outcome.warning(format!(
                "Found {} canonical links; search engines may ignore all of them",
                canonicals.len()
            ));
        }

        let resolved = match input.page.url.join(first) {
            Ok(url) if !first.is_empty() && matches!(url.scheme(), "http" | "https") => url,
            _ => {
                outcome.limit(0);
                outcome.report(
                    Severity::Critical,
                    "Canonical link is not a valid http(s) URL",
                    Some(first.clone()),
                );
                return Ok(outcome);
            }
        };

        if !same_document(resolved.as_str(), input.page.url.as_str()) {
            outcome.limit(80);
            outcome.report(
                Severity::Warning,
                "Canonical link points to a different URL",
                Some(resolved.to_string()),
            );
        }

        Ok(outcome)
    }
}

/// Indexing directives from the robots meta tag, `X-Robots-Tag` and robots.txt
#[derive(Debug, Clone)]
pub struct RobotsCheck {
    agent: String,
}

impl RobotsCheck {
    pub fn new(config: &ChecksConfig) -> Self {
        Self {
            agent: config.robots_agent.clone(),
        }
    }

    /// Lowercase directive tokens that apply to this agent
    fn directives(&self, input: &CheckInput) -> Vec<String> {
        let agent = self.agent.to_ascii_lowercase();
        let header = input.page.header("x-robots-tag").unwrap_or("");

        input
            .parsed
            .meta_robots
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(header))
            .flat_map(|value| value.split(','))
            .filter_map(|token| {
                let token = token.trim().to_ascii_lowercase();
                // `googlebot: noindex` only applies to the named crawler
                match token.split_once(':') {
                    Some((scope, directive)) if scope.trim() == agent => {
                        Some(directive.trim().to_string())
                    }
                    Some(_) => None,
                    None if token.is_empty() => None,
                    None => Some(token),
                }
            })
            .collect()
    }
}

impl Check for RobotsCheck {
    fn id(&self) -> &str {
        "robots"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let directives = self.directives(input);
        let has = |d: &str| directives.iter().any(|t| t == d);

        let noindex = has("noindex") || has("none");
        let nofollow = has("nofollow") || has("none");

        let robots = ParsedRobots::from_optional(input.page.robots_txt.as_deref());
        let blocked = !robots.is_allowed(input.page.url.as_str(), &self.agent);

        if let Some(delay) = robots.crawl_delay(&self.agent) {
            outcome.metric("crawl_delay_ms", (delay * 1000.0) as usize);
        }
        outcome.metric("directives", directives.len());

        if blocked && noindex {
            outcome.limit(0);
            outcome.critical(format!(
                "robots.txt blocks {} from this page, so its noindex directive can never be read",
                self.agent
            ));
        } else if blocked {
            outcome.limit(50);
            outcome.report(
                Severity::Warning,
                format!("robots.txt blocks {} from crawling this page", self.agent),
                Some(input.page.url.to_string()),
            );
        }

        if (noindex && has("index")) || (nofollow && has("follow")) {
            outcome.limit(60);
            outcome.warning(format!(
                "Contradictory robots directives: {}",
                directives.join(", ")
            ));
        }

        if noindex && !blocked {
            outcome.info("Page asks search engines not to index it");
        }

        Ok(outcome)
    }
}

/// HTML size, referenced resources and truncation
#[derive(Debug, Clone)]
pub struct PageWeightCheck {
    max_page_bytes: usize,
    max_resources: usize,
}

impl PageWeightCheck {
    pub fn new(config: &ChecksConfig) -> Self {
        Self {
            max_page_bytes: config.max_page_bytes,
            max_resources: config.max_resource_count,
        }
    }
}

impl Check for PageWeightCheck {
    fn id(&self) -> &str {
        "page_weight"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let page = &input.page;
        let parsed = &input.parsed;
        let resources = parsed.resource_count();

        outcome.metric("html_bytes", page.body_bytes);
        outcome.metric("resources", resources);
        outcome.metric("scripts", parsed.script_count);
        outcome.metric("stylesheets", parsed.stylesheet_count);
        outcome.metric("images", parsed.images.len());

        if page.truncated {
            outcome.limit(20);
            outcome.critical(format!(
                "HTML exceeded the download limit and was truncated after {} bytes",
                page.body.len()
            ));
        }

        if page.body_bytes > self.max_page_bytes {
            outcome.deduct(30);
            outcome.warning(format!(
                "HTML document is {} bytes (budget {})",
                page.body_bytes, self.max_page_bytes
            ));
        }

        if resources > self.max_resources {
            outcome.deduct(30);
            outcome.warning(format!(
                "Page references {} scripts, stylesheets and images (budget {})",
                resources, self.max_resources
            ));
        }

        Ok(outcome)
    }
}

/// JSON-LD is well-formed and typed; microdata items declare an `itemtype`
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredDataCheck;

impl StructuredDataCheck {
    /// Items of a JSON-LD document: the top-level object(s) or its `@graph`
    fn items(value: &Value) -> Vec<&Value> {
        match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => match map.get("@graph") {
                Some(Value::Array(graph)) => graph.iter().collect(),
                _ => vec![value],
            },
            _ => vec![value],
        }
    }
}

impl Check for StructuredDataCheck {
    fn id(&self) -> &str {
        "structured_data"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let parsed = &input.parsed;
        outcome.metric("json_ld_blocks", parsed.json_ld.len());
        outcome.metric("microdata_items", parsed.microdata_items);

        if parsed.json_ld.is_empty() && parsed.microdata_items == 0 {
            outcome.info("No structured data found");
            return Ok(outcome);
        }

        for (index, block) in parsed.json_ld.iter().enumerate() {
            let locator = Some(format!("JSON-LD block {}", index + 1));

            let value: Value = match serde_json::from_str(block) {
                Ok(value) => value,
                Err(e) => {
                    outcome.limit(0);
                    outcome.report(Severity::Critical, format!("Malformed JSON-LD: {}", e), locator);
                    continue;
                }
            };

            // @context may sit on the wrapper of a @graph
            let top_context = value.get("@context").is_some();
            for item in Self::items(&value) {
                if !item.is_object() {
                    outcome.deduct(30);
                    outcome.report(
                        Severity::Warning,
                        "JSON-LD item is not an object",
                        locator.clone(),
                    );
                    continue;
                }
                if !top_context && item.get("@context").is_none() {
                    outcome.deduct(30);
                    outcome.report(Severity::Warning, "JSON-LD item has no @context", locator.clone());
                }
                if item.get("@type").is_none() {
                    outcome.deduct(30);
                    outcome.report(Severity::Warning, "JSON-LD item has no @type", locator.clone());
                }
            }
        }

        if parsed.microdata_missing_type > 0 {
            outcome.deduct(20);
            outcome.warning(format!(
                "{} microdata items have no itemtype",
                parsed.microdata_missing_type
            ));
        }

        Ok(outcome)
    }
}
