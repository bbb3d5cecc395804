//! On-page content checks: title, meta description, headings and depth

use crate::checks::{Check, CheckError, CheckInput, CheckOutcome, Severity};
use crate::config::ChecksConfig;

/// `<title>` is present, unique and within the configured length bounds
#[derive(Debug, Clone)]
pub struct TitleCheck {
    min_length: usize,
    max_length: usize,
}

impl TitleCheck {
    pub fn new(config: &ChecksConfig) -> Self {
        Self {
            min_length: config.title_min_length,
            max_length: config.title_max_length,
        }
    }
}

impl Check for TitleCheck {
    fn id(&self) -> &str {
        "title"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        Ok(evaluate_text_element(
            &input.parsed.titles,
            TextRules {
                label: "title",
                min: self.min_length,
                max: self.max_length,
                multiple_ceiling: 50,
                short_ceiling: 50,
                long_ceiling: 70,
            },
        ))
    }
}

/// `<meta name="description">` is present, unique and within length bounds
#[derive(Debug, Clone)]
pub struct MetaDescriptionCheck {
    min_length: usize,
    max_length: usize,
}

impl MetaDescriptionCheck {
    pub fn new(config: &ChecksConfig) -> Self {
        Self {
            min_length: config.description_min_length,
            max_length: config.description_max_length,
        }
    }
}

impl Check for MetaDescriptionCheck {
    fn id(&self) -> &str {
        "meta_description"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        Ok(evaluate_text_element(
            &input.parsed.meta_descriptions,
            TextRules {
                label: "meta description",
                min: self.min_length,
                max: self.max_length,
                multiple_ceiling: 50,
                short_ceiling: 60,
                long_ceiling: 80,
            },
        ))
    }
}

struct TextRules {
    label: &'static str,
    min: usize,
    max: usize,
    multiple_ceiling: u8,
    short_ceiling: u8,
    long_ceiling: u8,
}

/// Shared rules for single-valued head text (title, meta description)
fn evaluate_text_element(values: &[String], rules: TextRules) -> CheckOutcome {
    let mut outcome = CheckOutcome::perfect();
    outcome.metric("count", values.len());

    let Some(first) = values.iter().find(|v| !v.is_empty()) else {
        outcome.limit(0);
        let message = if values.is_empty() {
            format!("Missing {}", rules.label)
        } else {
            format!("The {} is empty", rules.label)
        };
        outcome.critical(message);
        return outcome;
    };

    if values.len() > 1 {
        outcome.limit(rules.multiple_ceiling);
        outcome.warning(format!(
            "Found {} {} elements; exactly one is expected",
            values.len(),
            rules.label
        ));
    }

    let length = first.chars().count();
    outcome.metric("length", length);

    if length < rules.min {
        outcome.limit(rules.short_ceiling);
        outcome.report(
            Severity::Warning,
            format!(
                "The {} is too short ({} characters, minimum {})",
                rules.label, length, rules.min
            ),
            Some(first.clone()),
        );
    } else if length > rules.max {
        outcome.limit(rules.long_ceiling);
        outcome.report(
            Severity::Warning,
            format!(
                "The {} is too long ({} characters, maximum {})",
                rules.label, length, rules.max
            ),
            Some(first.clone()),
        );
    }

    outcome
}

/// Exactly one non-empty `<h1>`
#[derive(Debug, Clone, Copy, Default)]
pub struct H1Check;

impl Check for H1Check {
    fn id(&self) -> &str {
        "h1"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let h1s: Vec<&str> = input
            .parsed
            .headings
            .iter()
            .filter(|h| h.level == 1)
            .map(|h| h.text.as_str())
            .collect();
        outcome.metric("h1_count", h1s.len());

        if h1s.is_empty() {
            outcome.limit(0);
            outcome.critical("Missing <h1> heading");
            return Ok(outcome);
        }

        if h1s.len() > 1 {
            outcome.limit(50);
            outcome.warning(format!(
                "Found {} <h1> headings; exactly one is expected",
                h1s.len()
            ));
        }

        if h1s.iter().any(|text| text.is_empty()) {
            outcome.limit(50);
            outcome.warning("An <h1> heading has no text");
        }

        Ok(outcome)
    }
}

/// Headings never skip a level on the way down (h2 straight to h4, ...)
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingHierarchyCheck;

impl Check for HeadingHierarchyCheck {
    fn id(&self) -> &str {
        "heading_hierarchy"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let headings = &input.parsed.headings;
        outcome.metric("headings", headings.len());

        if headings.is_empty() {
            outcome.info("Page has no headings");
            return Ok(outcome);
        }

        let mut skipped = 0;

        // The outline opens at h1, or h2 on pages whose h1 lives in a template
        let first = &headings[0];
        if first.level > 2 {
            skipped += 1;
            outcome.deduct(20);
            outcome.report(
                Severity::Warning,
                format!("Heading outline starts at h{} instead of h1", first.level),
                Some(format!("h{}: {}", first.level, first.text)),
            );
        }

        for pair in headings.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.level > prev.level + 1 {
                skipped += 1;
                outcome.deduct(20);
                outcome.report(
                    Severity::Warning,
                    format!("Heading level skipped: h{} to h{}", prev.level, next.level),
                    Some(format!("h{}: {}", next.level, next.text)),
                );
            }
        }
        outcome.metric("skipped_levels", skipped);

        Ok(outcome)
    }
}

/// Word count above which a page can anchor a topic cluster
const PILLAR_WORDS: usize = 800;

/// Enough visible text to avoid being treated as thin content
///
/// Long pages also get an informational pillar-content note.
#[derive(Debug, Clone)]
pub struct ContentDepthCheck {
    min_words: usize,
}

impl ContentDepthCheck {
    pub fn new(config: &ChecksConfig) -> Self {
        Self {
            min_words: config.min_word_count,
        }
    }
}

impl Check for ContentDepthCheck {
    fn id(&self) -> &str {
        "content_depth"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let words = input.parsed.word_count;
        outcome.metric("word_count", words);

        if words < self.min_words {
            // Proportional: 150 of 300 words scores 50
            let score = (words * 100 / self.min_words.max(1)) as u8;
            outcome.limit(score);
            outcome.warning(format!(
                "Thin content: {} words of visible text (minimum {})",
                words, self.min_words
            ));
        } else if words > PILLAR_WORDS {
            outcome.info(format!(
                "{} words of visible text: a candidate for pillar content",
                words
            ));
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{parse_html, Page};
    use url::Url;

    fn input(html: &str) -> CheckInput {
        let url = Url::parse("https://example.com/").unwrap();
        let parsed = parse_html(html, &url);
        CheckInput {
            page: Page::from_html(url, html),
            parsed,
        }
    }

    fn run(check: &dyn Check, html: &str) -> CheckOutcome {
        check.evaluate(&input(html)).unwrap()
    }

    fn config() -> ChecksConfig {
        ChecksConfig::default()
    }

    #[test]
    fn test_title_good() {
        let html = "<head><title>A perfectly sized title for this page</title></head>";
        let outcome = run(&TitleCheck::new(&config()), html);
        assert_eq!(outcome.sub_score, 100);
        assert!(outcome.findings.is_empty());
    }

    #[test]
    fn test_title_missing_is_critical() {
        let outcome = run(&TitleCheck::new(&config()), "<head></head><body></body>");
        assert_eq!(outcome.sub_score, 0);
        assert_eq!(outcome.findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_title_empty_is_critical() {
        let outcome = run(&TitleCheck::new(&config()), "<head><title>  </title></head>");
        assert_eq!(outcome.sub_score, 0);
        assert!(outcome.findings[0].message.contains("empty"));
    }

    #[test]
    fn test_title_too_short_and_too_long() {
        let short = run(&TitleCheck::new(&config()), "<head><title>Home</title></head>");
        assert_eq!(short.sub_score, 50);
        assert!(short.findings[0].message.contains("too short"));

        let long_title = "x".repeat(80);
        let long = run(
            &TitleCheck::new(&config()),
            &format!("<head><title>{}</title></head>", long_title),
        );
        assert_eq!(long.sub_score, 70);
        assert!(long.findings[0].message.contains("too long"));
    }

    #[test]
    fn test_duplicate_titles() {
        let html = "<head><title>A perfectly sized title for this page</title><title>Another perfectly sized title here</title></head>";
        let outcome = run(&TitleCheck::new(&config()), html);
        assert_eq!(outcome.sub_score, 50);
        assert_eq!(outcome.metrics["count"], 2);
    }

    #[test]
    fn test_meta_description_rules() {
        let check = MetaDescriptionCheck::new(&config());
        assert_eq!(run(&check, "<head></head>").sub_score, 0);

        let short = run(&check, r#"<head><meta name="description" content="Too brief"></head>"#);
        assert_eq!(short.sub_score, 60);

        let good = format!(
            r#"<head><meta name="description" content="{}"></head>"#,
            "d".repeat(120)
        );
        assert_eq!(run(&check, &good).sub_score, 100);

        let long = format!(
            r#"<head><meta name="description" content="{}"></head>"#,
            "d".repeat(200)
        );
        assert_eq!(run(&check, &long).sub_score, 80);
    }

    #[test]
    fn test_h1_rules() {
        assert_eq!(run(&H1Check, "<body><h1>Hello</h1></body>").sub_score, 100);
        assert_eq!(run(&H1Check, "<body><h2>Hello</h2></body>").sub_score, 0);
        assert_eq!(run(&H1Check, "<body><h1>A</h1><h1>B</h1></body>").sub_score, 50);
        assert_eq!(run(&H1Check, "<body><h1></h1></body>").sub_score, 50);
    }

    #[test]
    fn test_heading_hierarchy() {
        let good = run(&HeadingHierarchyCheck, "<body><h1>a</h1><h2>b</h2><h3>c</h3><h2>d</h2></body>");
        assert_eq!(good.sub_score, 100);

        let skipped = run(&HeadingHierarchyCheck, "<body><h1>a</h1><h3>b</h3><h6>c</h6></body>");
        assert_eq!(skipped.sub_score, 60);
        assert_eq!(skipped.metrics["skipped_levels"], 2);
        assert_eq!(skipped.findings[0].locator.as_deref(), Some("h3: b"));
    }

    #[test]
    fn test_outline_starting_deep_is_skipped_level() {
        let outcome = run(&HeadingHierarchyCheck, "<body><h3>hi</h3><h4>there</h4></body>");
        assert_eq!(outcome.sub_score, 80);
        assert_eq!(outcome.metrics["skipped_levels"], 1);
        assert_eq!(outcome.findings[0].severity, Severity::Warning);
        assert_eq!(outcome.findings[0].locator.as_deref(), Some("h3: hi"));

        // Starting at h2 is accepted
        let h2_first = run(&HeadingHierarchyCheck, "<body><h2>a</h2><h3>b</h3></body>");
        assert_eq!(h2_first.sub_score, 100);
    }

    #[test]
    fn test_no_headings_is_info() {
        let outcome = run(&HeadingHierarchyCheck, "<body><p>text</p></body>");
        assert_eq!(outcome.sub_score, 100);
        assert_eq!(outcome.findings[0].severity, Severity::Info);
    }

    #[test]
    fn test_content_depth() {
        let check = ContentDepthCheck::new(&config());
        let thin = run(&check, &format!("<body><p>{}</p></body>", "word ".repeat(150)));
        assert_eq!(thin.sub_score, 50);
        assert_eq!(thin.metrics["word_count"], 150);

        let deep = run(&check, &format!("<body><p>{}</p></body>", "word ".repeat(400)));
        assert_eq!(deep.sub_score, 100);
        assert!(deep.findings.is_empty());

        let pillar = run(&check, &format!("<body><p>{}</p></body>", "word ".repeat(900)));
        assert_eq!(pillar.sub_score, 100);
        assert_eq!(pillar.findings.len(), 1);
        assert_eq!(pillar.findings[0].severity, Severity::Info);
        assert!(pillar.findings[0].message.contains("pillar content"));
    }
}
