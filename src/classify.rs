//! Classifier: maps a score and the rule overrides to a band.

use crate::enums::{Band, ReasonCode};
use crate::scoring::ScoreOutcome;
use crate::types::DetectionThresholds;

/// Overrides raised during scoring.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub critical_block: bool,
    pub allow: bool,
}

impl From<&ScoreOutcome> for Overrides {
    fn from(outcome: &ScoreOutcome) -> Self {
        Overrides {
            critical_block: outcome.critical_block.is_some(),
            allow: outcome.allow_override.is_some(),
        }
    }
}

/// Maps a score to a band.
///
/// A critical block wins over everything, an allow override over the score.
/// Otherwise the lower bound of each band is inclusive; anything below the
/// suspicious threshold is phishing.
pub fn classify(score: f64, overrides: &Overrides, thresholds: &DetectionThresholds) -> Band {
    if overrides.critical_block {
        return Band::Phishing;
    }
    if overrides.allow {
        return Band::Legitimate;
    }
    if score >= thresholds.legitimate as f64 {
        Band::Legitimate
    } else if score >= thresholds.suspicious as f64 {
        Band::Suspicious
    } else {
        Band::Phishing
    }
}

/// The reason code that explains a band reached through [`classify`].
pub fn classification_reason(band: Band, overrides: &Overrides) -> ReasonCode {
    if overrides.critical_block {
        ReasonCode::CriticalBlockingRule
    } else if overrides.allow {
        ReasonCode::AllowRule
    } else {
        match band {
            Band::Legitimate => ReasonCode::ScoreLegitimate,
            Band::Suspicious => ReasonCode::ScoreSuspicious,
            Band::Phishing => ReasonCode::ScorePhishing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> DetectionThresholds {
        DetectionThresholds::default()
    }

    #[test]
    fn lower_bounds_are_inclusive() {
        let none = Overrides::default();
        assert_eq!(classify(85.0, &none, &t()), Band::Legitimate);
        assert_eq!(classify(84.9, &none, &t()), Band::Suspicious);
        assert_eq!(classify(55.0, &none, &t()), Band::Suspicious);
        assert_eq!(classify(54.9, &none, &t()), Band::Phishing);
        assert_eq!(classify(0.0, &none, &t()), Band::Phishing);
    }

    #[test]
    fn critical_block_beats_allow() {
        let both = Overrides {
            critical_block: true,
            allow: true,
        };
        assert_eq!(classify(100.0, &both, &t()), Band::Phishing);
        assert_eq!(
            classification_reason(Band::Phishing, &both),
            ReasonCode::CriticalBlockingRule
        );
    }

    #[test]
    fn allow_beats_score() {
        let allow = Overrides {
            critical_block: false,
            allow: true,
        };
        assert_eq!(classify(0.0, &allow, &t()), Band::Legitimate);
    }
}
