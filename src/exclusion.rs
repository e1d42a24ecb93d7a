//! Exclusion filter: known-legitimate domains and SSO contexts that short-circuit
//! classification to `legitimate` before any scoring.

use crate::activate::{ActiveRules, NamedRegex};
use crate::compile::CompiledPattern;
use crate::enums::{Channel, ReasonCode};
use crate::signals::{PageSignals, SignalView};
use serde::{Deserialize, Serialize};

/// Why a page was excluded, and the pattern that excluded it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub reason: ReasonCode,
    pub pattern: String,
}

/// Full outcome of the exclusion stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ExclusionDecision {
    Excluded(Exclusion),
    /// A legitimate context matched but a strictly more specific suspicious
    /// context matched too.
    Overridden { legitimate: String, suspicious: String },
    NotExcluded,
}

impl ActiveRules {
    /// Returns the exclusion that applies to the page, if any.
    pub fn is_excluded(&self, signals: &dyn PageSignals) -> Option<Exclusion> {
        match self.exclusion_decision(&SignalView::new(signals)) {
            ExclusionDecision::Excluded(exclusion) => Some(exclusion),
            _ => None,
        }
    }

    pub(crate) fn exclusion_decision(&self, view: &SignalView<'_>) -> ExclusionDecision {
        let ex = &self.exclusions;

        if let Some(host) = view.hostname() {
            let host_checks = [
                (&ex.domain_patterns, ReasonCode::ExcludedDomain),
                (&ex.provider_domains, ReasonCode::KnownProviderDomain),
                (&ex.discussion_domains, ReasonCode::DiscussionDomain),
            ];
            for (patterns, reason) in host_checks {
                if let Some(hit) = first_match(patterns, host) {
                    return ExclusionDecision::Excluded(Exclusion {
                        reason,
                        pattern: hit.source.clone(),
                    });
                }
            }
        }

        if let Some(url) = view.text(Channel::Url)
            && let Some(hit) = first_match(&ex.trusted_login, url)
        {
            return ExclusionDecision::Excluded(Exclusion {
                reason: ReasonCode::TrustedLoginPattern,
                pattern: hit.source.clone(),
            });
        }

        let Some(legitimate) = most_specific(view, &ex.legitimate_contexts) else {
            return ExclusionDecision::NotExcluded;
        };
        match most_specific(view, &ex.suspicious_contexts) {
            Some(suspicious) if suspicious.specificity > legitimate.specificity => {
                ExclusionDecision::Overridden {
                    legitimate: legitimate.matcher.as_str().to_string(),
                    suspicious: suspicious.matcher.as_str().to_string(),
                }
            }
            _ => ExclusionDecision::Excluded(Exclusion {
                reason: ReasonCode::LegitimateContext,
                pattern: legitimate.matcher.as_str().to_string(),
            }),
        }
    }
}

fn first_match<'a>(patterns: &'a [NamedRegex], haystack: &str) -> Option<&'a NamedRegex> {
    patterns.iter().find(|p| p.regex.is_match(haystack))
}

/// The longest context pattern found in the page text or referrer. Ties keep
/// the earliest pattern.
fn most_specific<'a>(
    view: &SignalView<'_>,
    patterns: &'a [CompiledPattern],
) -> Option<&'a CompiledPattern> {
    patterns
        .iter()
        .filter(|p| view.matches_text_or_referrer(&p.matcher))
        .fold(None, |best: Option<&CompiledPattern>, p| match best {
            Some(b) if b.specificity >= p.specificity => Some(b),
            _ => Some(p),
        })
}
