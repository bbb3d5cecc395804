//! Link checks

use crate::checks::{Check, CheckError, CheckInput, CheckOutcome, Severity};
use crate::crawler::LinkTarget;

/// Counts internal and external links and validates same-page fragments
#[derive(Debug, Clone, Copy, Default)]
pub struct LinksCheck;

/// Below this many internal links a page is flagged as a linking opportunity
const MIN_INTERNAL_LINKS: usize = 5;

/// Fragments browsers resolve without a matching element
fn is_implicit_fragment(fragment: &str) -> bool {
    fragment.is_empty() || fragment.eq_ignore_ascii_case("top")
}

impl Check for LinksCheck {
    fn id(&self) -> &str {
        "links"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let parsed = &input.parsed;

        let mut internal = 0;
        let mut external = 0;
        let mut fragments = 0;
        let mut broken = 0;

        for link in &parsed.links {
            match &link.target {
                LinkTarget::Internal(_) => internal += 1,
                LinkTarget::External(_) => external += 1,
                LinkTarget::Fragment(name) => {
                    fragments += 1;
                    if !is_implicit_fragment(name) && !parsed.anchors.contains(name) {
                        broken += 1;
                        outcome.deduct(25);
                        outcome.report(
                            Severity::Warning,
                            format!("Link points to missing anchor #{}", name),
                            Some(link.href.clone()),
                        );
                    }
                }
                LinkTarget::Unsupported => {}
            }
        }

        let nofollow = parsed.links.iter().filter(|l| l.nofollow).count();
        let empty_text = parsed
            .links
            .iter()
            .filter(|l| matches!(l.target, LinkTarget::Internal(_) | LinkTarget::External(_)))
            .filter(|l| l.text.is_empty())
            .count();

        outcome.metric("internal_links", internal);
        outcome.metric("external_links", external);
        outcome.metric("fragment_links", fragments);
        outcome.metric("nofollow_links", nofollow);
        outcome.metric("broken_fragments", broken);
        outcome.metric("empty_anchor_text", empty_text);

        if internal == 0 {
            outcome.info("Page has no internal links");
        } else if internal < MIN_INTERNAL_LINKS {
            outcome.info(format!(
                "Only {} internal links; linking related pages here would strengthen it",
                internal
            ));
        }
        if empty_text > 0 {
            outcome.info(format!("{} links have no anchor text", empty_text));
        }

        Ok(outcome)
    }
}
