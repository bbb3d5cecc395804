//! HTML parser for extracting SEO facts
//!
//! The markup is parsed exactly once per page. Everything the checks need is
//! copied out into an owned [`ParsedPage`], so the (non-`Send`) DOM never
//! leaves the parsing thread.

use crate::url::{is_same_site, same_document};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// A heading element and its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// 1 for `<h1>` through 6 for `<h6>`
    pub level: u8,
    pub text: String,
}

/// An `<img>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub src: Option<String>,
    /// `None` when the attribute is absent; `Some("")` marks a decorative image
    pub alt: Option<String>,
}

/// Where an anchor points, relative to the analyzed page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// Same site (ignoring `www.`)
    Internal(Url),
    External(Url),
    /// Points at an element of this very document
    Fragment(String),
    /// `javascript:`, `mailto:`, `tel:`, `data:` or unresolvable
    Unsupported,
}

/// An `<a href>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub target: LinkTarget,
    pub text: String,
    pub nofollow: bool,
}

/// Facts extracted from an HTML document
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Non-empty and empty `<title>` texts, in document order
    pub titles: Vec<String>,

    pub meta_descriptions: Vec<String>,

    /// `content` of every `<meta name="robots">`
    pub meta_robots: Vec<String>,

    pub headings: Vec<Heading>,
    pub images: Vec<Image>,
    pub links: Vec<Link>,

    /// Values of `id` attributes and `<a name>` anchors
    pub anchors: BTreeSet<String>,

    /// Raw `href` of every `<link rel="canonical">`
    pub canonicals: Vec<String>,

    /// Bodies of `<script type="application/ld+json">`
    pub json_ld: Vec<String>,

    /// Elements carrying `itemscope`
    pub microdata_items: usize,

    /// `itemscope` elements without an `itemtype`
    pub microdata_missing_type: usize,

    /// External `<script src>` references
    pub script_count: usize,

    /// `<link rel="stylesheet">` references
    pub stylesheet_count: usize,

    /// Words of visible text (script, style, noscript and template excluded)
    pub word_count: usize,
}

impl ParsedPage {
    /// Total referenced scripts, stylesheets and images
    pub fn resource_count(&self) -> usize {
        self.script_count + self.stylesheet_count + self.images.len()
    }
}

/// Parses HTML content and extracts everything the checks consume
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - Final page URL, used to resolve and classify links
///
/// # Example
///
/// ```
/// use autoseo::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><h1>Hi</h1></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.titles, vec!["Test".to_string()]);
/// assert_eq!(parsed.headings[0].level, 1);
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let mut parsed = ParsedPage {
        titles: select_texts(&document, "head title"),
        ..ParsedPage::default()
    };

    extract_meta(&document, &mut parsed);
    extract_headings(&document, &mut parsed);
    extract_images(&document, &mut parsed);
    extract_links(&document, base_url, &mut parsed);
    extract_head_links(&document, &mut parsed);
    extract_structured_data(&document, &mut parsed);

    if let Ok(sel) = Selector::parse("[id], a[name]") {
        for element in document.select(&sel) {
            let value = element.value();
            for name in [value.attr("id"), value.attr("name")].into_iter().flatten() {
                if !name.is_empty() {
                    parsed.anchors.insert(name.to_string());
                }
            }
        }
    }

    if let Ok(sel) = Selector::parse("script[src]") {
        parsed.script_count = document.select(&sel).count();
    }

    parsed.word_count = count_visible_words(&document);
    parsed
}

fn select_texts(document: &Html, selector: &str) -> Vec<String> {
    let Ok(sel) = Selector::parse(selector) else {
        return Vec::new();
    };
    document.select(&sel).map(|element| element_text(&element)).collect()
}

/// Whitespace-collapsed text content of an element
fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_meta(document: &Html, parsed: &mut ParsedPage) {
    let Ok(sel) = Selector::parse("meta[name]") else {
        return;
    };

    for element in document.select(&sel) {
        let value = element.value();
        let name = value.attr("name").unwrap_or("").trim();
        let content = value.attr("content").unwrap_or("").trim().to_string();

        if name.eq_ignore_ascii_case("description") {
            parsed.meta_descriptions.push(content);
        } else if name.eq_ignore_ascii_case("robots") {
            parsed.meta_robots.push(content);
        }
    }
}

fn extract_headings(document: &Html, parsed: &mut ParsedPage) {
    let Ok(sel) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return;
    };

    for element in document.select(&sel) {
        let level = element.value().name()[1..].parse().unwrap_or(6);
        parsed.headings.push(Heading {
            level,
            text: element_text(&element),
        });
    }
}

fn extract_images(document: &Html, parsed: &mut ParsedPage) {
    let Ok(sel) = Selector::parse("img") else {
        return;
    };

    parsed.images = document
        .select(&sel)
        .map(|element| Image {
            src: element.value().attr("src").map(str::to_string),
            alt: element.value().attr("alt").map(|a| a.trim().to_string()),
        })
        .collect();
}

fn extract_links(document: &Html, base_url: &Url, parsed: &mut ParsedPage) {
    let Ok(sel) = Selector::parse("a[href]") else {
        return;
    };

    for element in document.select(&sel) {
        let value = element.value();
        let href = value.attr("href").unwrap_or("").trim().to_string();
        let nofollow = value
            .attr("rel")
            .map(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")))
            .unwrap_or(false);

        parsed.links.push(Link {
            target: classify_link(&href, base_url),
            text: element_text(&element),
            href,
            nofollow,
        });
    }
}

/// Resolves an anchor href and classifies it relative to `base_url`
fn classify_link(href: &str, base_url: &Url) -> LinkTarget {
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return LinkTarget::Unsupported;
    }

    if let Some(fragment) = href.strip_prefix('#') {
        return LinkTarget::Fragment(fragment.to_string());
    }

    let Ok(resolved) = base_url.join(href) else {
        return LinkTarget::Unsupported;
    };
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return LinkTarget::Unsupported;
    }

    // `page.html#section` on page.html is still an in-document jump
    if let Some(fragment) = resolved.fragment() {
        if same_document(resolved.as_str(), base_url.as_str()) {
            return LinkTarget::Fragment(fragment.to_string());
        }
    }

    if is_same_site(base_url, &resolved) {
        LinkTarget::Internal(resolved)
    } else {
        LinkTarget::External(resolved)
    }
}

fn extract_head_links(document: &Html, parsed: &mut ParsedPage) {
    let Ok(sel) = Selector::parse("link[rel]") else {
        return;
    };

    for element in document.select(&sel) {
        let value = element.value();
        let rel = value.attr("rel").unwrap_or("");
        let has_rel = |wanted: &str| {
            rel.split_whitespace()
                .any(|r| r.eq_ignore_ascii_case(wanted))
        };

        if has_rel("canonical") {
            parsed
                .canonicals
                .push(value.attr("href").unwrap_or("").trim().to_string());
        }
        if has_rel("stylesheet") {
            parsed.stylesheet_count += 1;
        }
    }
}

fn extract_structured_data(document: &Html, parsed: &mut ParsedPage) {
    if let Ok(sel) = Selector::parse("script[type]") {
        parsed.json_ld = document
            .select(&sel)
            .filter(|element| {
                element
                    .value()
                    .attr("type")
                    .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
                    .unwrap_or(false)
            })
            .map(|element| element.text().collect::<String>())
            .collect();
    }

    if let Ok(sel) = Selector::parse("[itemscope]") {
        for element in document.select(&sel) {
            parsed.microdata_items += 1;
            let typed = element
                .value()
                .attr("itemtype")
                .map(|t| !t.trim().is_empty())
                .unwrap_or(false);
            if !typed {
                parsed.microdata_missing_type += 1;
            }
        }
    }
}

/// Counts words in text nodes that a browser would render
fn count_visible_words(document: &Html) -> usize {
    const HIDDEN: &[&str] = &["script", "style", "noscript", "template", "head"];

    document
        .root_element()
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|e| HIDDEN.contains(&e.name()))
                    .unwrap_or(false)
            })
        })
        .map(|(_, text)| text.split_whitespace().count())
        .sum()
}
