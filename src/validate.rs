//! Structural validation of rule documents (V-001 through V-007, W-001
//! through W-007).
//!
//! Returns **all** errors and warnings, not just the first. An error rejects
//! the whole document; a warning never does. Pattern syntax is not checked
//! here: a pattern that fails to compile only disables its own rule at
//! activation.

use crate::compile::MAX_CONDITION_DEPTH;
use crate::enums::{Channel, PrioritySetting};
use crate::error::*;
use crate::types::*;
use std::collections::HashSet;

/// Validate a parsed rule document.
pub fn validate(doc: &RuleDocument) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    v001_threshold_range(doc, &mut errors);
    v002_threshold_order(doc, &mut errors);
    v003_unique_rule_ids(doc, &mut errors);
    v004_ids_present(doc, &mut errors);
    v005_finite_weights(doc, &mut errors);
    v006_fingerprint_thresholds(doc, &mut errors);
    v007_condition_depth(doc, &mut errors);

    w001_rules_without_matchers(doc, &mut warnings);
    w002_elements_without_patterns(doc, &mut warnings);
    w003_fingerprint_configured(doc, &mut warnings);
    w004_element_channel_hints(doc, &mut warnings);
    w005_critical_block_weight(doc, &mut warnings);
    w006_rule_channel_names(doc, &mut warnings);
    w007_allow_priorities(doc, &mut warnings);

    ValidationResult { errors, warnings }
}

fn error(rule: &str, path: String, message: String) -> ValidationError {
    ValidationError {
        rule: rule.to_string(),
        path,
        message,
    }
}

fn warning(code: &str, path: String, message: String) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Warning,
        code: code.to_string(),
        path: Some(path),
        message,
    }
}

/// `(path, id)` of every rule that lands in the scoring pipeline.
fn rule_ids(doc: &RuleDocument) -> Vec<(String, &str)> {
    let mut out = Vec::new();
    let lists: [(&str, Vec<&str>); 7] = [
        (
            "phishing_indicators",
            doc.phishing_indicators.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "suspicious_behaviors",
            doc.suspicious_behaviors.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "blocking_rules",
            doc.blocking_rules.iter().map(|r| r.indicator.id.as_str()).collect(),
        ),
        (
            "allow_rules",
            doc.allow_rules.iter().map(|r| r.id.as_str()).collect(),
        ),
        (
            "legitimate_patterns",
            doc.legitimate_patterns.iter().map(|r| r.id.as_str()).collect(),
        ),
        ("rules", doc.rules.iter().map(|r| r.id.as_str()).collect()),
        (
            "detection_logic.resource_validation_rules",
            doc.detection_logic
                .resource_validation_rules
                .iter()
                .map(|r| r.id.as_str())
                .collect(),
        ),
    ];
    for (list, ids) in lists {
        for (i, id) in ids.into_iter().enumerate() {
            out.push((format!("{}[{}].id", list, i), id));
        }
    }
    out
}

/// `(path, id, weight)` of every fingerprint element.
fn element_entries(doc: &RuleDocument) -> Vec<(String, &str, f64)> {
    let req = &doc.m365_detection_requirements;
    let mut out = Vec::new();
    for (bucket, elements) in [
        ("primary_elements", &req.primary_elements),
        ("secondary_elements", &req.secondary_elements),
    ] {
        for (i, el) in elements.iter().enumerate() {
            out.push((
                format!("m365_detection_requirements.{}[{}]", bucket, i),
                el.id.as_str(),
                el.weight,
            ));
        }
    }
    for (i, el) in doc.aad_detection_elements.iter().enumerate() {
        out.push((
            format!("aad_detection_elements[{}]", i),
            el.id.as_str(),
            el.weight,
        ));
    }
    out
}

// ─── V-001 ──────────────────────────────────────────────────────────────────

fn v001_threshold_range(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let t = &doc.thresholds;
    for (name, value) in [
        ("legitimate", t.legitimate),
        ("suspicious", t.suspicious),
        ("phishing", t.phishing),
    ] {
        if !(0..=100).contains(&value) {
            errors.push(error(
                "V-001",
                format!("thresholds.{}", name),
                format!("threshold must be within 0..=100, got {}", value),
            ));
        }
    }
}

// ─── V-002 ──────────────────────────────────────────────────────────────────

fn v002_threshold_order(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let t = &doc.thresholds;
    if !(t.phishing < t.suspicious && t.suspicious < t.legitimate) {
        errors.push(error(
            "V-002",
            "thresholds".to_string(),
            format!(
                "thresholds must satisfy phishing < suspicious < legitimate, got {} / {} / {}",
                t.phishing, t.suspicious, t.legitimate
            ),
        ));
    }
}

// ─── V-003 ──────────────────────────────────────────────────────────────────

fn v003_unique_rule_ids(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for (path, id) in rule_ids(doc) {
        if !id.is_empty() && !seen.insert(id) {
            errors.push(error("V-003", path, format!("duplicate rule id: {}", id)));
        }
    }

    let mut seen = HashSet::new();
    for (path, id, _) in element_entries(doc) {
        if !id.is_empty() && !seen.insert(id) {
            errors.push(error(
                "V-003",
                format!("{}.id", path),
                format!("duplicate element id: {}", id),
            ));
        }
    }
}

// ─── V-004 ──────────────────────────────────────────────────────────────────

fn v004_ids_present(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    for (path, id) in rule_ids(doc) {
        if id.trim().is_empty() {
            errors.push(error("V-004", path, "rule id must not be empty".to_string()));
        }
    }
    for (path, id, _) in element_entries(doc) {
        if id.trim().is_empty() {
            errors.push(error(
                "V-004",
                format!("{}.id", path),
                "element id must not be empty".to_string(),
            ));
        }
    }
}

// ─── V-005 ──────────────────────────────────────────────────────────────────

fn v005_finite_weights(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let mut weighted: Vec<(String, f64)> = Vec::new();
    for (i, r) in doc.phishing_indicators.iter().enumerate() {
        weighted.push((format!("phishing_indicators[{}].weight", i), r.weight));
    }
    for (i, r) in doc.suspicious_behaviors.iter().enumerate() {
        weighted.push((format!("suspicious_behaviors[{}].weight", i), r.weight));
    }
    for (i, r) in doc.blocking_rules.iter().enumerate() {
        weighted.push((format!("blocking_rules[{}].weight", i), r.indicator.weight));
    }
    for (i, r) in doc.legitimate_patterns.iter().enumerate() {
        weighted.push((format!("legitimate_patterns[{}].weight", i), r.weight));
    }
    for (i, r) in doc.rules.iter().enumerate() {
        weighted.push((format!("rules[{}].weight", i), r.weight));
    }
    for (i, r) in doc.detection_logic.resource_validation_rules.iter().enumerate() {
        weighted.push((
            format!("detection_logic.resource_validation_rules[{}].weight", i),
            r.weight,
        ));
    }
    for (path, _, weight) in element_entries(doc) {
        weighted.push((format!("{}.weight", path), weight));
    }

    for (path, weight) in weighted {
        if !weight.is_finite() {
            errors.push(error(
                "V-005",
                path,
                format!("weight must be a finite number, got {}", weight),
            ));
        }
    }
}

// ─── V-006 ──────────────────────────────────────────────────────────────────

fn v006_fingerprint_thresholds(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let t = &doc.m365_detection_requirements.detection_thresholds;
    for (name, value) in [
        ("minimum_total_weight", t.minimum_total_weight),
        ("minimum_secondary_only_weight", t.minimum_secondary_only_weight),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(error(
                "V-006",
                format!("m365_detection_requirements.detection_thresholds.{}", name),
                format!("must be a finite, non-negative number, got {}", value),
            ));
        }
    }
}

// ─── V-007 ──────────────────────────────────────────────────────────────────

fn condition_depth(condition: &Condition) -> usize {
    match condition {
        Condition::And(items) | Condition::Or(items) => {
            1 + items.iter().map(condition_depth).max().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Conditions that cannot be interpreted are skipped here; activation
/// disables their rules.
fn v007_condition_depth(doc: &RuleDocument, errors: &mut Vec<ValidationError>) {
    let mut conditions: Vec<(String, &RawCondition)> = Vec::new();
    for (i, r) in doc.blocking_rules.iter().enumerate() {
        if let Some(c) = &r.condition {
            conditions.push((format!("blocking_rules[{}].condition", i), c));
        }
    }
    for (i, r) in doc.allow_rules.iter().enumerate() {
        if let Some(c) = &r.condition {
            conditions.push((format!("allow_rules[{}].condition", i), c));
        }
    }
    for (i, r) in doc.rules.iter().enumerate() {
        if let Some(c) = &r.condition {
            conditions.push((format!("rules[{}].condition", i), c));
        }
    }

    for (path, raw) in conditions {
        let Ok(c) = raw.to_condition() else {
            continue;
        };
        let depth = condition_depth(&c);
        if depth > MAX_CONDITION_DEPTH {
            errors.push(error(
                "V-007",
                path,
                format!(
                    "condition nests {} levels deep, maximum is {}",
                    depth, MAX_CONDITION_DEPTH
                ),
            ));
        }
    }
}

// ─── W-001 ──────────────────────────────────────────────────────────────────

fn w001_rules_without_matchers(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    let mut empty: Vec<String> = Vec::new();
    for (list, rules) in [
        ("phishing_indicators", &doc.phishing_indicators),
        ("suspicious_behaviors", &doc.suspicious_behaviors),
    ] {
        for (i, r) in rules.iter().enumerate() {
            if !indicator_has_matcher(r) {
                empty.push(format!("{}[{}]", list, i));
            }
        }
    }
    for (i, r) in doc.blocking_rules.iter().enumerate() {
        if !indicator_has_matcher(&r.indicator) && r.condition.is_none() {
            empty.push(format!("blocking_rules[{}]", i));
        }
    }
    for (i, r) in doc.allow_rules.iter().enumerate() {
        if r.pattern_sources().is_empty() && r.condition.is_none() {
            empty.push(format!("allow_rules[{}]", i));
        }
    }
    for (i, r) in doc.legitimate_patterns.iter().enumerate() {
        if !r.has_facets() {
            empty.push(format!("legitimate_patterns[{}]", i));
        }
    }
    for (i, r) in doc.rules.iter().enumerate() {
        if r.condition.is_none() {
            empty.push(format!("rules[{}]", i));
        }
    }
    for (i, r) in doc.detection_logic.resource_validation_rules.iter().enumerate() {
        if r.pattern.trim().is_empty() || r.required_origins.is_empty() {
            empty.push(format!("detection_logic.resource_validation_rules[{}]", i));
        }
    }

    for path in empty {
        warnings.push(warning(
            "W-001",
            path,
            "rule has no pattern or condition and will never match".to_string(),
        ));
    }
}

fn indicator_has_matcher(r: &Indicator) -> bool {
    !r.pattern_sources().is_empty()
        || !r.context_required.is_empty()
        || !r.additional_checks.is_empty()
}

// ─── W-002 ──────────────────────────────────────────────────────────────────

fn w002_elements_without_patterns(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    let req = &doc.m365_detection_requirements;
    for (bucket, elements) in [
        ("primary_elements", &req.primary_elements),
        ("secondary_elements", &req.secondary_elements),
    ] {
        for (i, el) in elements.iter().enumerate() {
            if el.pattern_sources().is_empty() {
                warnings.push(warning(
                    "W-002",
                    format!("m365_detection_requirements.{}[{}]", bucket, i),
                    format!("element '{}' has no pattern and will never match", el.id),
                ));
            }
        }
    }
    for (i, el) in doc.aad_detection_elements.iter().enumerate() {
        if el.selectors.is_empty() && el.text_patterns.is_empty() {
            warnings.push(warning(
                "W-002",
                format!("aad_detection_elements[{}]", i),
                format!("element '{}' has no selector or text pattern", el.id),
            ));
        }
    }
}

// ─── W-003 ──────────────────────────────────────────────────────────────────

fn w003_fingerprint_configured(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    if !doc.m365_detection_requirements.has_elements() && doc.aad_detection_elements.is_empty() {
        warnings.push(warning(
            "W-003",
            "m365_detection_requirements".to_string(),
            "no fingerprint elements configured; every page will be scored".to_string(),
        ));
    }
}

// ─── W-004 ──────────────────────────────────────────────────────────────────

/// Hints that name the fingerprint bucket rather than a channel.
const BUCKET_HINTS: &[&str] = &["primary", "secondary", ""];

fn w004_element_channel_hints(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    let req = &doc.m365_detection_requirements;
    for (bucket, elements) in [
        ("primary_elements", &req.primary_elements),
        ("secondary_elements", &req.secondary_elements),
    ] {
        for (i, el) in elements.iter().enumerate() {
            let hints = [el.element_type.as_str(), el.category.as_str()];
            if hints.iter().any(|h| Channel::from_hint(h).is_some()) {
                continue;
            }
            let unrecognized = hints
                .iter()
                .any(|h| !BUCKET_HINTS.contains(&h.trim().to_ascii_lowercase().as_str()));
            if unrecognized {
                warnings.push(warning(
                    "W-004",
                    format!("m365_detection_requirements.{}[{}]", bucket, i),
                    format!(
                        "element '{}' has unrecognized type/category '{}'/'{}'; tested as {}",
                        el.id,
                        el.element_type,
                        el.category,
                        el.channel()
                    ),
                ));
            }
        }
    }
}

// ─── W-005 ──────────────────────────────────────────────────────────────────

fn w005_critical_block_weight(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    for (i, r) in doc.blocking_rules.iter().enumerate() {
        if r.is_critical_block() && r.indicator.weight != 0.0 {
            warnings.push(warning(
                "W-005",
                format!("blocking_rules[{}].weight", i),
                format!(
                    "critical blocking rule '{}' overrides the score; its weight is ignored",
                    r.indicator.id
                ),
            ));
        }
    }
}

// ─── W-006 ──────────────────────────────────────────────────────────────────

fn w006_rule_channel_names(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    let mut named: Vec<(String, &str, Channel)> = Vec::new();
    for (list, rules) in [
        ("phishing_indicators", &doc.phishing_indicators),
        ("suspicious_behaviors", &doc.suspicious_behaviors),
    ] {
        for (i, r) in rules.iter().enumerate() {
            if let Some(name) = r.channel.as_deref() {
                named.push((format!("{}[{}].channel", list, i), name, r.channel()));
            }
        }
    }
    for (i, r) in doc.blocking_rules.iter().enumerate() {
        if let Some(name) = r.indicator.channel.as_deref() {
            let path = format!("blocking_rules[{}].channel", i);
            named.push((path, name, r.indicator.channel()));
        }
    }
    for (i, r) in doc.allow_rules.iter().enumerate() {
        if let Some(name) = r.channel.as_deref() {
            named.push((format!("allow_rules[{}].channel", i), name, r.channel()));
        }
    }

    for (path, name, fallback) in named {
        if !name.trim().is_empty() && Channel::from_hint(name).is_none() {
            warnings.push(warning(
                "W-006",
                path,
                format!("unrecognized channel '{}'; tested as {}", name, fallback),
            ));
        }
    }
}

// ─── W-007 ──────────────────────────────────────────────────────────────────

fn w007_allow_priorities(doc: &RuleDocument, warnings: &mut Vec<Diagnostic>) {
    for (i, r) in doc.allow_rules.iter().enumerate() {
        if let PrioritySetting::Unrecognized(raw) = &r.priority {
            warnings.push(warning(
                "W-007",
                format!("allow_rules[{}].priority", i),
                format!(
                    "unrecognized priority '{}'; rule '{}' ranks as priority {}",
                    raw,
                    r.id,
                    r.priority.rank().0
                ),
            ));
        }
    }
}
