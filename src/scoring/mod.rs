//! Overall score aggregation
//!
//! The overall score is the weighted mean of the sub-scores present, rounded
//! half up, minus a fixed deduction per critical issue, clamped to 0..=100.
//! It depends only on the check results and the weight table.

use crate::checks::{CheckRegistry, CheckResult, Severity};
use std::collections::HashMap;

/// Deterministic scorer over a static weight table
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: HashMap<String, u32>,
    critical_deduction: u32,
}

impl Scorer {
    pub fn new(weights: impl IntoIterator<Item = (String, u32)>, critical_deduction: u32) -> Self {
        Self {
            weights: weights.into_iter().collect(),
            critical_deduction,
        }
    }

    pub fn from_registry(registry: &CheckRegistry, critical_deduction: u32) -> Self {
        Self::new(registry.weights(), critical_deduction)
    }

    /// Weight of a check; unknown ids weigh nothing
    pub fn weight(&self, check_id: &str) -> u32 {
        self.weights.get(check_id).copied().unwrap_or(0)
    }

    /// Computes the overall score for a set of check results
    ///
    /// # Examples
    ///
    /// ```
    /// use autoseo::scoring::Scorer;
    ///
    /// let scorer = Scorer::new([("a".to_string(), 3), ("b".to_string(), 1)], 5);
    /// assert_eq!(scorer.score(&[]), 0);
    /// ```
    pub fn score(&self, results: &[CheckResult]) -> u8 {
        let (weighted, total) = results.iter().fold((0u64, 0u64), |(sum, total), r| {
            let weight = self.weight(&r.check_id) as u64;
            (sum + weight * r.sub_score.min(100) as u64, total + weight)
        });

        if total == 0 {
            return 0;
        }

        // Integer round-half-up of weighted / total
        let base = (2 * weighted + total) / (2 * total);

        let criticals: u64 = results
            .iter()
            .map(|r| r.count(Severity::Critical) as u64)
            .sum();
        let deduction = criticals * self.critical_deduction as u64;

        base.saturating_sub(deduction).min(100) as u8
    }
}
