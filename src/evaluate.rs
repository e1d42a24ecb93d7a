//! Evaluation pipeline.
//!
//! One traversal per page:
//!
//! ```text
//! exclusion ─┬─ excluded ──────────────────────────────→ legitimate
//!            └─ fingerprint ─┬─ not a login surface ───→ legitimate
//!                            └─ scoring → classify ────→ legitimate | suspicious | phishing
//! ```
//!
//! Evaluation never fails from the host's point of view. Any error or panic
//! raised while evaluating (including inside the host's [`PageSignals`]
//! implementation) is caught here and reported as a `suspicious` verdict with
//! reason [`ReasonCode::EvaluationFailed`].

use crate::activate::ActiveRules;
use crate::classify::{Overrides, classification_reason, classify};
use crate::enums::{Band, Channel, ReasonCode};
use crate::error::{EvaluationError, EvaluationErrorKind};
use crate::exclusion::{Exclusion, ExclusionDecision};
use crate::fingerprint::FingerprintResult;
use crate::scoring::{MAX_SCORE, clamp_score};
use crate::signals::{PageSignals, SignalView};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Per-call evaluation switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// When false, every page is scored as if it were a login surface.
    pub fingerprint_gate: bool,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        EvaluateOptions {
            fingerprint_gate: true,
        }
    }
}

/// The verdict for one page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub band: Band,
    pub score: f64,
    pub reason_codes: Vec<ReasonCode>,
    pub matched_rule_ids: Vec<String>,
    /// Number of scoring, blocking and allow rules tested. Zero whenever the
    /// page was excluded or is not a login surface.
    pub indicators_evaluated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusion: Option<Exclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<FingerprintResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable_signals: Vec<Channel>,
    pub rules_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
}

impl Classification {
    fn legitimate(rules: &ActiveRules, reason_codes: Vec<ReasonCode>) -> Self {
        Classification {
            band: Band::Legitimate,
            score: MAX_SCORE,
            reason_codes,
            matched_rule_ids: Vec::new(),
            indicators_evaluated: 0,
            exclusion: None,
            fingerprint: None,
            unavailable_signals: Vec::new(),
            rules_version: rules.version.clone(),
            error: None,
        }
    }

    fn failed(rules: &ActiveRules, error: EvaluationError) -> Self {
        Classification {
            band: Band::Suspicious,
            score: clamp_score(rules.thresholds.suspicious as f64),
            reason_codes: vec![ReasonCode::EvaluationFailed],
            matched_rule_ids: Vec::new(),
            indicators_evaluated: 0,
            exclusion: None,
            fingerprint: None,
            unavailable_signals: Vec::new(),
            rules_version: rules.version.clone(),
            error: Some(error),
        }
    }

    pub fn is_short_circuit(&self) -> bool {
        self.exclusion.is_some()
            || self.reason_codes.contains(&ReasonCode::NotIdentityProviderSurface)
    }
}

impl ActiveRules {
    /// Classifies a page with the fingerprint gate enabled.
    pub fn evaluate(&self, signals: &dyn PageSignals) -> Classification {
        self.evaluate_with(signals, EvaluateOptions::default())
    }

    /// Classifies a page. Never panics and never returns an error; failures
    /// become a `suspicious` verdict carrying the error.
    pub fn evaluate_with(
        &self,
        signals: &dyn PageSignals,
        options: EvaluateOptions,
    ) -> Classification {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run(signals, options)))
            .unwrap_or_else(|payload| {
                Err(EvaluationError {
                    kind: EvaluationErrorKind::Panicked,
                    message: panic_message(payload.as_ref()),
                    rule_id: None,
                })
            });

        match outcome {
            Ok(verdict) => {
                log::debug!(
                    "verdict {} score {} ({} rules evaluated, {} matched)",
                    verdict.band,
                    verdict.score,
                    verdict.indicators_evaluated,
                    verdict.matched_rule_ids.len()
                );
                verdict
            }
            Err(e) => {
                log::error!("evaluation failed: {}", e);
                Classification::failed(self, e)
            }
        }
    }

    fn run(
        &self,
        signals: &dyn PageSignals,
        options: EvaluateOptions,
    ) -> Result<Classification, EvaluationError> {
        let view = SignalView::new(signals);
        let mut reasons = Vec::new();

        match self.exclusion_decision(&view) {
            ExclusionDecision::Excluded(exclusion) => {
                let mut verdict = Classification::legitimate(self, vec![exclusion.reason]);
                verdict.exclusion = Some(exclusion);
                return Ok(finish(verdict, &view));
            }
            ExclusionDecision::Overridden {
                legitimate,
                suspicious,
            } => {
                log::debug!(
                    "legitimate context '{}' overridden by suspicious context '{}'",
                    legitimate,
                    suspicious
                );
                reasons.push(ReasonCode::SuspiciousContextOverride);
            }
            ExclusionDecision::NotExcluded => {}
        }

        let fingerprint = if options.fingerprint_gate {
            let fp = self.fingerprint_view(&view);
            if !fp.configured {
                reasons.push(ReasonCode::FingerprintNotConfigured);
            } else if !fp.is_login_surface {
                reasons.push(ReasonCode::NotIdentityProviderSurface);
                let mut verdict = Classification::legitimate(self, reasons);
                verdict.fingerprint = Some(fp);
                return Ok(finish(verdict, &view));
            } else {
                reasons.push(ReasonCode::LoginSurfaceDetected);
            }
            Some(fp)
        } else {
            reasons.push(ReasonCode::FingerprintGateDisabled);
            None
        };

        let outcome = self.score_view(&view)?;
        let overrides = Overrides::from(&outcome);
        let band = classify(outcome.score, &overrides, &self.thresholds);
        reasons.push(classification_reason(band, &overrides));

        let verdict = Classification {
            band,
            score: outcome.score,
            reason_codes: reasons,
            matched_rule_ids: outcome.matched_rule_ids(),
            indicators_evaluated: outcome.indicators_evaluated,
            exclusion: None,
            fingerprint,
            unavailable_signals: Vec::new(),
            rules_version: self.version.clone(),
            error: None,
        };
        Ok(finish(verdict, &view))
    }
}

/// Attaches the channels that could not be read.
fn finish(mut verdict: Classification, view: &SignalView<'_>) -> Classification {
    let unavailable = view.unavailable_channels();
    if !unavailable.is_empty() {
        verdict.reason_codes.push(ReasonCode::SignalUnavailable);
        verdict.unavailable_signals = unavailable;
    }
    verdict
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic during evaluation: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic during evaluation: {}", s)
    } else {
        "panic during evaluation".to_string()
    }
}
