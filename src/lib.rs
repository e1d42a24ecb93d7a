//! Content-based phishing classification for identity-provider login pages.
//!
//! Given a page's observable signals and a versioned, remotely updatable rule
//! document, the engine decides whether the page is a genuine login page, a
//! suspicious one, or a phishing clone:
//!
//! ```text
//! parse(json) → RuleDocument → validate(doc) → ValidationResult
//!                            → activate(doc) → ActiveRules → evaluate(signals) → Classification
//! ```
//!
//! Rule documents are data, not code. Every pattern is compiled once at
//! activation; a pattern that does not compile disables only its own rule.
//! [`store::RuleStore`] keeps the active snapshot and swaps in refreshed
//! documents atomically.
//!
//! # Quick Start
//!
//! ```rust
//! use phishcheck::{Band, StaticSignals};
//!
//! let json = r#"{
//!   "version": "2025.01",
//!   "exclusion_system": { "domain_patterns": ["login.microsoftonline.com"] },
//!   "thresholds": { "legitimate": 85, "suspicious": 55, "phishing": 25 }
//! }"#;
//!
//! let loaded = phishcheck::load(json).expect("valid document");
//! let page = StaticSignals::new("https://login.microsoftonline.com/common/oauth2/authorize");
//! let verdict = loaded.rules.evaluate(&page);
//! assert_eq!(verdict.band, Band::Legitimate);
//! ```
//!
//! # Logging
//!
//! The crate logs through the [`log`] facade: disabled rules and rejected
//! documents at `warn`, published snapshots at `info`, per-page verdicts and
//! unreadable signals at `debug`, caught evaluation failures at `error`.

pub mod activate;
pub mod classify;
pub mod compile;
pub mod config;
pub mod enums;
pub mod error;
pub mod evaluate;
pub mod exclusion;
pub mod fingerprint;
pub mod parse;
pub mod scoring;
pub mod signals;
pub mod store;
pub mod types;
pub mod validate;

pub use activate::{ActiveRules, activate};
pub use classify::{Overrides, classify};
pub use config::EngineConfig;
pub use enums::*;
pub use error::*;
pub use evaluate::{Classification, EvaluateOptions};
pub use exclusion::Exclusion;
pub use fingerprint::FingerprintResult;
pub use parse::{parse, parse_yaml};
pub use scoring::ScoreOutcome;
pub use signals::{PageSignals, StaticSignals};
pub use store::{RuleSource, RuleStore};
pub use types::*;
pub use validate::validate;

/// Result of the [`load`] convenience entry point.
pub struct LoadResult {
    /// The compiled snapshot, ready to evaluate.
    pub rules: ActiveRules,
    /// Rules left out because a pattern failed to compile.
    pub report: ActivationReport,
    /// Non-fatal warnings produced during validation.
    pub warnings: Vec<Diagnostic>,
}

/// Convenience entry point composing parse → validate → activate.
///
/// # Errors
///
/// Returns [`LoadError::Parse`] if the input is not a rule document and
/// [`LoadError::Invalid`] with every validation error if it fails
/// validation. Rules that fail to compile are reported in
/// [`LoadResult::report`], not as an error.
pub fn load(input: &str) -> Result<LoadResult, LoadError> {
    let doc = parse::parse(input)?;

    let result = validate::validate(&doc);
    if !result.is_valid() {
        return Err(LoadError::Invalid(result.errors));
    }

    let (rules, report) = activate::activate(&doc);

    Ok(LoadResult {
        rules,
        report,
        warnings: result.warnings,
    })
}
