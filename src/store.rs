//! The currently active rule snapshot and its refresh path.
//!
//! Evaluations clone the `Arc` of the current snapshot and run against it
//! without holding any lock, so a refresh never blocks or tears an
//! evaluation in progress: each one sees either the old or the new document
//! in its entirety. A document is fully parsed, validated and compiled
//! before the swap; any failure leaves the previous snapshot in place.

use crate::activate::{ActiveRules, activate};
use crate::config::EngineConfig;
use crate::error::{ActivationReport, LoadError, SourceError};
use crate::evaluate::Classification;
use crate::parse::parse;
use crate::signals::PageSignals;
use crate::types::RuleDocument;
use crate::validate::validate;
use parking_lot::RwLock;
use std::sync::Arc;

/// Where rule documents come from. Implementations do their own I/O
/// (HTTP fetch, file read, bundled fallback) and hand back the raw JSON.
pub trait RuleSource {
    fn fetch(&self) -> Result<String, SourceError>;
}

impl<F> RuleSource for F
where
    F: Fn() -> Result<String, SourceError>,
{
    fn fetch(&self) -> Result<String, SourceError> {
        self()
    }
}

pub struct RuleStore {
    active: RwLock<Arc<ActiveRules>>,
    config: EngineConfig,
}

impl RuleStore {
    /// Creates a store serving `initial` until the first successful publish.
    pub fn new(initial: ActiveRules, config: EngineConfig) -> Self {
        RuleStore {
            active: RwLock::new(Arc::new(initial)),
            config,
        }
    }

    /// Creates a store from a document, applying the same checks as
    /// [`RuleStore::publish`] except staleness.
    pub fn from_document(doc: &RuleDocument, config: EngineConfig) -> Result<Self, LoadError> {
        let rules = prepare(doc, &config)?;
        log_published(&rules);
        Ok(RuleStore::new(rules, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The snapshot new evaluations will use.
    pub fn snapshot(&self) -> Arc<ActiveRules> {
        self.active.read().clone()
    }

    /// Validates, compiles and atomically publishes a document.
    ///
    /// Rejects documents whose `last_updated` is older than the active one.
    /// Documents without a timestamp are always accepted.
    pub fn publish(&self, doc: &RuleDocument) -> Result<ActivationReport, LoadError> {
        let rules = prepare(doc, &self.config)?;

        let mut active = self.active.write();
        if let (Some(current), Some(incoming)) = (active.last_updated(), rules.last_updated())
            && incoming < current
        {
            log::warn!(
                "rejected stale rule document {} ({} < {})",
                rules.version(),
                incoming,
                current
            );
            return Err(LoadError::Stale {
                active: current.to_rfc3339(),
                rejected: incoming.to_rfc3339(),
            });
        }

        let report = rules.activation_report().clone();
        log_published(&rules);
        *active = Arc::new(rules);
        Ok(report)
    }

    /// Parses a JSON document and publishes it.
    pub fn load_str(&self, input: &str) -> Result<ActivationReport, LoadError> {
        let doc = parse(input).inspect_err(|e| log::warn!("rejected rule document: {}", e))?;
        self.publish(&doc)
    }

    /// Fetches from `source` and publishes the result. The active snapshot is
    /// untouched if any step fails.
    pub fn refresh(&self, source: &dyn RuleSource) -> Result<ActivationReport, LoadError> {
        let body = source
            .fetch()
            .inspect_err(|e| log::warn!("rule source fetch failed: {}", e))?;
        self.load_str(&body)
    }

    /// Classifies a page against the current snapshot using the configured
    /// evaluation options.
    pub fn evaluate(&self, signals: &dyn PageSignals) -> Classification {
        self.snapshot()
            .evaluate_with(signals, self.config.evaluate_options())
    }
}

fn prepare(doc: &RuleDocument, config: &EngineConfig) -> Result<ActiveRules, LoadError> {
    let validation = validate(doc);
    for w in &validation.warnings {
        log::debug!("rule document {}: {} {}", doc.version, w.code, w.message);
    }
    if !validation.is_valid() {
        log::warn!(
            "rejected invalid rule document {}: {} errors",
            doc.version,
            validation.errors.len()
        );
        return Err(LoadError::Invalid(validation.errors));
    }

    let (rules, report) = activate(doc);
    if config.strict_activation && !report.is_clean() {
        log::warn!(
            "rejected rule document {} in strict mode: {} rules failed to compile",
            doc.version,
            report.disabled.len()
        );
        return Err(LoadError::Compile(report.disabled));
    }
    Ok(rules)
}

fn log_published(rules: &ActiveRules) {
    log::info!(
        "published rule document {} ({} rules active, {} disabled)",
        rules.version(),
        rules.activation_report().active_rules,
        rules.activation_report().disabled.len()
    );
}
