//! Identity-provider fingerprint evaluator.
//!
//! Decides whether a page presents the provider's login surface at all. Only
//! such pages are scored; everything else is out of scope for the detector
//! and classified `legitimate`, which keeps coincidental indicator matches on
//! unrelated sites from producing phishing verdicts.

use crate::activate::{ActiveRules, CompiledElement, CompiledFingerprint};
use crate::signals::{PageSignals, SignalView};
use crate::types::FingerprintThresholds;
use serde::{Deserialize, Serialize};

/// Matched element counts and weights, per bucket.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementTally {
    pub primary_count: usize,
    pub primary_weight: f64,
    pub secondary_count: usize,
    pub secondary_weight: f64,
}

impl ElementTally {
    pub fn total_count(&self) -> usize {
        self.primary_count + self.secondary_count
    }

    pub fn total_weight(&self) -> f64 {
        self.primary_weight + self.secondary_weight
    }
}

/// Applies the two-branch login-surface rule.
///
/// With primary evidence: enough primary matches, enough total weight and
/// enough elements overall. Without any primary match: the stricter
/// secondary-only weight and count bars.
pub fn meets_requirements(tally: &ElementTally, t: &FingerprintThresholds) -> bool {
    let with_primary = tally.primary_count >= t.minimum_primary_elements
        && tally.total_weight() >= t.minimum_total_weight
        && tally.total_count() >= t.minimum_elements_overall;

    let secondary_only = tally.primary_count == 0
        && tally.secondary_weight >= t.minimum_secondary_only_weight
        && tally.secondary_count >= t.minimum_secondary_only_elements;

    with_primary || secondary_only
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintResult {
    pub is_login_surface: bool,
    /// False when the document configures no fingerprint elements; the gate
    /// is then open for every page.
    pub configured: bool,
    pub matched_weight: f64,
    pub matched_primary: usize,
    pub matched_total: usize,
    pub tally: ElementTally,
    pub matched_element_ids: Vec<String>,
}

impl ActiveRules {
    /// Evaluates the identity-provider fingerprint of a page.
    pub fn fingerprint(&self, signals: &dyn PageSignals) -> FingerprintResult {
        self.fingerprint_view(&SignalView::new(signals))
    }

    pub(crate) fn fingerprint_view(&self, view: &SignalView<'_>) -> FingerprintResult {
        let mut matched_ids = Vec::new();
        let mut tally = ElementTally::default();

        let is_login_surface = match &self.fingerprint {
            CompiledFingerprint::Requirements {
                primary,
                secondary,
                thresholds,
            } => {
                let (count, weight) = tally_bucket(view, primary, &mut matched_ids);
                tally.primary_count = count;
                tally.primary_weight = weight;
                let (count, weight) = tally_bucket(view, secondary, &mut matched_ids);
                tally.secondary_count = count;
                tally.secondary_weight = weight;
                meets_requirements(&tally, thresholds)
            }
            CompiledFingerprint::Legacy {
                elements,
                minimum_required,
                all_must_be_present,
            } => {
                let (count, weight) = tally_bucket(view, elements, &mut matched_ids);
                tally.secondary_count = count;
                tally.secondary_weight = weight;
                if *all_must_be_present {
                    !elements.is_empty() && count == elements.len()
                } else {
                    count >= *minimum_required
                }
            }
            CompiledFingerprint::NotConfigured => {
                return FingerprintResult {
                    is_login_surface: true,
                    configured: false,
                    matched_weight: 0.0,
                    matched_primary: 0,
                    matched_total: 0,
                    tally,
                    matched_element_ids: matched_ids,
                };
            }
        };

        FingerprintResult {
            is_login_surface,
            configured: true,
            matched_weight: tally.total_weight(),
            matched_primary: tally.primary_count,
            matched_total: tally.total_count(),
            tally,
            matched_element_ids: matched_ids,
        }
    }
}

fn tally_bucket(
    view: &SignalView<'_>,
    elements: &[CompiledElement],
    matched_ids: &mut Vec<String>,
) -> (usize, f64) {
    let mut count = 0;
    let mut weight = 0.0;
    for el in elements {
        if el.patterns.iter().any(|p| view.matches(p)) {
            count += 1;
            weight += el.weight;
            matched_ids.push(el.id.clone());
        }
    }
    (count, weight)
}
