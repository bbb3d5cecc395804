//! Image checks

use crate::checks::{Check, CheckError, CheckInput, CheckOutcome, Severity};

/// Share of images carrying an `alt` attribute
///
/// An empty `alt=""` marks a decorative image and counts as covered.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAltCheck;

impl Check for ImageAltCheck {
    fn id(&self) -> &str {
        "image_alt"
    }

    fn evaluate(&self, input: &CheckInput) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::perfect();
        let images = &input.parsed.images;

        let missing: Vec<_> = images.iter().filter(|img| img.alt.is_none()).collect();
        let decorative = images
            .iter()
            .filter(|img| img.alt.as_deref() == Some(""))
            .count();

        outcome.metric("images", images.len());
        outcome.metric("missing_alt", missing.len());
        outcome.metric("decorative", decorative);

        if images.is_empty() {
            return Ok(outcome);
        }

        let covered = images.len() - missing.len();
        let coverage = ((covered * 100) as f64 / images.len() as f64).round() as u8;
        outcome.limit(coverage);

        for image in missing {
            outcome.report(
                Severity::Warning,
                "Image is missing an alt attribute",
                image.src.clone().or_else(|| Some("<img>".to_string())),
            );
        }

        Ok(outcome)
    }
}
