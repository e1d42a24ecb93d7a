//! Activation: compiling a rule document into an immutable snapshot.
//!
//! Every pattern in the document is compiled exactly once here. A pattern
//! that fails disables the rule (or exclusion entry, or fingerprint element)
//! that owns it and is recorded in the [`ActivationReport`]; nothing else in
//! the document is affected.

use crate::compile::*;
use crate::enums::*;
use crate::error::{ActivationReport, CompileError};
use crate::types::*;
use chrono::{DateTime, Utc};
use regex::Regex;

/// A compiled, read-only rule set. Cheap to share behind an `Arc`; nothing in
/// it is mutated after activation.
#[derive(Clone, Debug)]
pub struct ActiveRules {
    pub(crate) version: String,
    pub(crate) last_updated: Option<DateTime<Utc>>,
    pub(crate) thresholds: DetectionThresholds,
    pub(crate) exclusions: CompiledExclusions,
    pub(crate) fingerprint: CompiledFingerprint,
    /// Phishing indicators, suspicious behaviors, legitimate patterns and
    /// detection rules, in document order.
    pub(crate) scoring_rules: Vec<CompiledRule>,
    pub(crate) blocking_rules: Vec<CompiledRule>,
    /// Sorted by descending priority; ties keep document order.
    pub(crate) allow_rules: Vec<CompiledRule>,
    pub(crate) report: ActivationReport,
}

impl ActiveRules {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    /// The report produced when this snapshot was activated.
    pub fn activation_report(&self) -> &ActivationReport {
        &self.report
    }

    /// Ids of every live (compiled) rule of the given kind.
    pub fn rule_ids(&self, kind: RuleKind) -> Vec<&str> {
        self.scoring_rules
            .iter()
            .chain(&self.blocking_rules)
            .chain(&self.allow_rules)
            .filter(|r| r.kind == kind)
            .map(|r| r.id.as_str())
            .collect()
    }
}

/// A hostname or URL regex kept with its source text for reporting.
#[derive(Clone, Debug)]
pub(crate) struct NamedRegex {
    pub source: String,
    pub regex: Regex,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct CompiledExclusions {
    pub domain_patterns: Vec<NamedRegex>,
    pub provider_domains: Vec<NamedRegex>,
    pub discussion_domains: Vec<NamedRegex>,
    /// Tested against the full URL.
    pub trusted_login: Vec<NamedRegex>,
    pub legitimate_contexts: Vec<CompiledPattern>,
    pub suspicious_contexts: Vec<CompiledPattern>,
}

#[derive(Clone, Debug)]
pub(crate) struct CompiledElement {
    pub id: String,
    pub weight: f64,
    pub patterns: Vec<CompiledPattern>,
}

#[derive(Clone, Debug)]
pub(crate) enum CompiledFingerprint {
    Requirements {
        primary: Vec<CompiledElement>,
        secondary: Vec<CompiledElement>,
        thresholds: FingerprintThresholds,
    },
    Legacy {
        elements: Vec<CompiledElement>,
        minimum_required: usize,
        all_must_be_present: bool,
    },
    NotConfigured,
}

/// How a rule decides whether it matched.
///
/// A rule matches when at least one `any_of` pattern matches (or there are
/// none), every `all_of` pattern matches, the condition (if any) holds and,
/// for resource validation, some resource comes from outside the allowlist.
/// A rule with nothing to test never matches.
#[derive(Clone, Debug, Default)]
pub(crate) struct RuleMatcher {
    pub any_of: Vec<CompiledPattern>,
    pub all_of: Vec<CompiledPattern>,
    pub condition: Option<CompiledCondition>,
    /// When set, the rule also requires a resource origin whose host matches
    /// none of these patterns.
    pub origin_allowlist: Option<Vec<Regex>>,
}

impl RuleMatcher {
    pub fn is_empty(&self) -> bool {
        self.any_of.is_empty()
            && self.all_of.is_empty()
            && self.condition.is_none()
            && self.origin_allowlist.is_none()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct CompiledRule {
    pub id: String,
    pub kind: RuleKind,
    pub weight: f64,
    /// Blocking rule with `action: block` and `severity: critical`.
    pub critical: bool,
    pub priority: Priority,
    pub matcher: RuleMatcher,
}

/// Compiles a validated document into an [`ActiveRules`] snapshot.
///
/// Never fails: rules whose patterns do not compile are left out and listed
/// in the returned report.
pub fn activate(doc: &RuleDocument) -> (ActiveRules, ActivationReport) {
    let mut act = Activator::default();

    let exclusions = act.exclusions(doc);
    let fingerprint = act.fingerprint(doc);

    let mut scoring_rules = Vec::new();
    for (i, ind) in doc.phishing_indicators.iter().enumerate() {
        let path = format!("phishing_indicators[{}]", i);
        let compiled = indicator_matcher(ind, None, &path);
        if let Some(matcher) = act.keep(&ind.id, compiled) {
            scoring_rules.push(CompiledRule {
                id: ind.id.clone(),
                kind: RuleKind::PhishingIndicator,
                weight: ind.weight,
                critical: false,
                priority: Priority::default(),
                matcher,
            });
        }
    }
    for (i, ind) in doc.suspicious_behaviors.iter().enumerate() {
        let path = format!("suspicious_behaviors[{}]", i);
        let compiled = indicator_matcher(ind, None, &path);
        if let Some(matcher) = act.keep(&ind.id, compiled) {
            scoring_rules.push(CompiledRule {
                id: ind.id.clone(),
                kind: RuleKind::SuspiciousBehavior,
                weight: ind.weight,
                critical: false,
                priority: Priority::default(),
                matcher,
            });
        }
    }
    for (i, lp) in doc.legitimate_patterns.iter().enumerate() {
        let path = format!("legitimate_patterns[{}]", i);
        if let Some(matcher) = act.keep(&lp.id, legitimate_matcher(lp, &path)) {
            scoring_rules.push(CompiledRule {
                id: lp.id.clone(),
                kind: RuleKind::LegitimatePattern,
                weight: lp.weight,
                critical: false,
                priority: Priority::default(),
                matcher,
            });
        }
    }
    for (i, rule) in doc.rules.iter().enumerate() {
        let path = format!("rules[{}].condition", i);
        let compiled = condition_matcher(rule.condition.as_ref(), &path);
        if let Some(matcher) = act.keep(&rule.id, compiled) {
            scoring_rules.push(CompiledRule {
                id: rule.id.clone(),
                kind: RuleKind::DetectionRule,
                weight: rule.weight,
                critical: false,
                priority: Priority::default(),
                matcher,
            });
        }
    }

    let mut blocking_rules = Vec::new();
    for (i, rule) in doc.blocking_rules.iter().enumerate() {
        let path = format!("blocking_rules[{}]", i);
        let compiled = indicator_matcher(&rule.indicator, rule.condition.as_ref(), &path);
        if let Some(matcher) = act.keep(&rule.indicator.id, compiled) {
            blocking_rules.push(CompiledRule {
                id: rule.indicator.id.clone(),
                kind: RuleKind::BlockingRule,
                weight: rule.indicator.weight,
                critical: rule.is_critical_block(),
                priority: Priority::default(),
                matcher,
            });
        }
    }
    for (i, rule) in doc.detection_logic.resource_validation_rules.iter().enumerate() {
        let path = format!("detection_logic.resource_validation_rules[{}]", i);
        if let Some(matcher) = act.keep(&rule.id, resource_matcher(rule, &path)) {
            blocking_rules.push(CompiledRule {
                id: rule.id.clone(),
                kind: RuleKind::ResourceValidation,
                weight: if rule.is_block() { 0.0 } else { rule.weight },
                critical: rule.is_block(),
                priority: Priority::default(),
                matcher,
            });
        }
    }

    let mut allow_rules = Vec::new();
    for (i, rule) in doc.allow_rules.iter().enumerate() {
        let path = format!("allow_rules[{}]", i);
        if let Some(matcher) = act.keep(&rule.id, allow_matcher(rule, &path)) {
            allow_rules.push(CompiledRule {
                id: rule.id.clone(),
                kind: RuleKind::AllowRule,
                weight: 0.0,
                critical: false,
                priority: rule.priority.rank(),
                matcher,
            });
        }
    }
    // Stable sort keeps document order among equal priorities.
    allow_rules.sort_by(|a, b| b.priority.cmp(&a.priority));

    let report = act.report;
    if !report.is_clean() {
        log::warn!(
            "rule document {} activated with {} disabled rules",
            doc.version,
            report.disabled.len()
        );
    }

    let rules = ActiveRules {
        version: doc.version.clone(),
        last_updated: doc.last_updated,
        thresholds: doc.thresholds.clone(),
        exclusions,
        fingerprint,
        scoring_rules,
        blocking_rules,
        allow_rules,
        report: report.clone(),
    };
    (rules, report)
}

type Compiled<T> = Result<T, (String, PatternError)>;

#[derive(Default)]
struct Activator {
    report: ActivationReport,
}

impl Activator {
    /// Records the outcome of compiling one rule; failures are logged and
    /// turned into `None`.
    fn keep<T>(&mut self, rule_id: &str, compiled: Compiled<T>) -> Option<T> {
        match compiled {
            Ok(value) => {
                self.report.active_rules += 1;
                Some(value)
            }
            Err((path, e)) => {
                let err = CompileError {
                    rule_id: rule_id.to_string(),
                    path,
                    pattern: e.pattern,
                    message: e.message,
                };
                log::warn!("{}", err);
                self.report.disabled.push(err);
                None
            }
        }
    }

    fn named_regexes(
        &mut self,
        path: &str,
        sources: &[String],
        compile: impl Fn(&str) -> Result<Regex, PatternError>,
    ) -> Vec<NamedRegex> {
        let mut out = Vec::new();
        for (i, source) in sources.iter().enumerate() {
            let entry_path = format!("{}[{}]", path, i);
            let compiled = compile(source).map_err(|e| (entry_path.clone(), e));
            if let Some(regex) = self.keep(&entry_path, compiled) {
                out.push(NamedRegex {
                    source: source.clone(),
                    regex,
                });
            }
        }
        out
    }

    fn literals(&mut self, path: &str, sources: &[String]) -> Vec<CompiledPattern> {
        let mut out = Vec::new();
        for (i, source) in sources.iter().enumerate() {
            let entry_path = format!("{}[{}]", path, i);
            let compiled =
                compile_literal(source, Channel::PageText).map_err(|e| (entry_path.clone(), e));
            if let Some(p) = self.keep(&entry_path, compiled) {
                out.push(p);
            }
        }
        out
    }

    fn exclusions(&mut self, doc: &RuleDocument) -> CompiledExclusions {
        let ctx = &doc.exclusion_system.context_indicators;
        let mut legitimate_contexts = self.literals(
            "exclusion_system.context_indicators.legitimate_sso_patterns",
            &ctx.legitimate_sso_patterns,
        );
        legitimate_contexts.extend(self.literals(
            "exclusion_system.context_indicators.legitimate_contexts",
            &ctx.legitimate_contexts,
        ));

        CompiledExclusions {
            domain_patterns: self.named_regexes(
                "exclusion_system.domain_patterns",
                &doc.exclusion_system.domain_patterns,
                compile_domain_pattern,
            ),
            provider_domains: self.named_regexes(
                "microsoft_domain_patterns",
                &doc.microsoft_domain_patterns,
                compile_domain_pattern,
            ),
            discussion_domains: self.named_regexes(
                "legitimate_discussion_domains",
                &doc.legitimate_discussion_domains,
                compile_domain_pattern,
            ),
            trusted_login: self.named_regexes(
                "trusted_login_patterns",
                &doc.trusted_login_patterns,
                |s| compile_regex(s, PatternFlags::CASE_INSENSITIVE),
            ),
            legitimate_contexts,
            suspicious_contexts: self.literals(
                "exclusion_system.context_indicators.suspicious_contexts",
                &ctx.suspicious_contexts,
            ),
        }
    }

    fn fingerprint(&mut self, doc: &RuleDocument) -> CompiledFingerprint {
        let req = &doc.m365_detection_requirements;
        if req.has_elements() {
            let primary = self.elements(
                "m365_detection_requirements.primary_elements",
                &req.primary_elements,
            );
            let secondary = self.elements(
                "m365_detection_requirements.secondary_elements",
                &req.secondary_elements,
            );
            return CompiledFingerprint::Requirements {
                primary,
                secondary,
                thresholds: req.detection_thresholds.clone(),
            };
        }

        if !doc.aad_detection_elements.is_empty() {
            let mut elements = Vec::new();
            for (i, el) in doc.aad_detection_elements.iter().enumerate() {
                let path = format!("aad_detection_elements[{}]", i);
                if let Some(patterns) = self.keep(&el.id, legacy_element_patterns(el, &path)) {
                    elements.push(CompiledElement {
                        id: el.id.clone(),
                        weight: el.weight,
                        patterns,
                    });
                }
            }
            return CompiledFingerprint::Legacy {
                elements,
                minimum_required: req.legacy_minimum_required,
                all_must_be_present: req.legacy_all_must_be_present,
            };
        }

        CompiledFingerprint::NotConfigured
    }

    fn elements(&mut self, path: &str, elements: &[DetectionElement]) -> Vec<CompiledElement> {
        let mut out = Vec::new();
        for (i, el) in elements.iter().enumerate() {
            let el_path = format!("{}[{}]", path, i);
            if let Some(patterns) = self.keep(&el.id, element_patterns(el, &el_path)) {
                out.push(CompiledElement {
                    id: el.id.clone(),
                    weight: el.weight,
                    patterns,
                });
            }
        }
        out
    }
}

fn sources_with_paths<'a>(
    path: &str,
    single: Option<&'a str>,
    many: &'a [String],
) -> Vec<(String, &'a str)> {
    let mut out = Vec::new();
    if let Some(p) = single.filter(|p| !p.is_empty()) {
        out.push((format!("{}.pattern", path), p));
    }
    for (i, p) in many.iter().enumerate().filter(|(_, p)| !p.is_empty()) {
        out.push((format!("{}.patterns[{}]", path, i), p.as_str()));
    }
    out
}

fn compile_all(
    sources: Vec<(String, &str)>,
    compile: impl Fn(&str) -> Result<CompiledPattern, PatternError>,
) -> Compiled<Vec<CompiledPattern>> {
    sources
        .into_iter()
        .map(|(path, src)| compile(src).map_err(|e| (path, e)))
        .collect()
}

fn indicator_matcher(
    ind: &Indicator,
    condition: Option<&RawCondition>,
    path: &str,
) -> Compiled<RuleMatcher> {
    let flags = PatternFlags::parse(&ind.flags);
    let channel = ind.channel();

    let any_of = compile_all(
        sources_with_paths(path, ind.pattern.as_deref(), &ind.patterns),
        |src| compile_pattern(src, channel, flags),
    )?;

    let mut all_of = compile_all(
        indexed(path, "context_required", &ind.context_required),
        |src| compile_pattern(src, Channel::PageText, flags),
    )?;
    all_of.extend(compile_all(
        indexed(path, "additional_checks", &ind.additional_checks),
        |src| compile_literal(src, Channel::PageText),
    )?);

    let condition = condition
        .map(|c| compile_raw_condition(c).map_err(|e| (format!("{}.condition", path), e)))
        .transpose()?;

    Ok(RuleMatcher {
        any_of,
        all_of,
        condition,
        origin_allowlist: None,
    })
}

fn allow_matcher(rule: &AllowRule, path: &str) -> Compiled<RuleMatcher> {
    let flags = PatternFlags::parse(&rule.flags);
    let channel = rule.channel();
    let any_of = compile_all(
        sources_with_paths(path, rule.pattern.as_deref(), &rule.patterns),
        |src| compile_pattern(src, channel, flags),
    )?;
    let condition = rule
        .condition
        .as_ref()
        .map(|c| compile_raw_condition(c).map_err(|e| (format!("{}.condition", path), e)))
        .transpose()?;
    Ok(RuleMatcher {
        any_of,
        all_of: Vec::new(),
        condition,
        origin_allowlist: None,
    })
}

fn condition_matcher(condition: Option<&RawCondition>, path: &str) -> Compiled<RuleMatcher> {
    let condition = condition
        .map(|c| compile_raw_condition(c).map_err(|e| (path.to_string(), e)))
        .transpose()?;
    Ok(RuleMatcher {
        condition,
        ..Default::default()
    })
}

fn legitimate_matcher(lp: &LegitimatePattern, path: &str) -> Compiled<RuleMatcher> {
    let ci = PatternFlags::CASE_INSENSITIVE;
    let mut all_of = Vec::new();
    if let Some(url) = lp.pattern.as_deref().filter(|p| !p.is_empty()) {
        all_of.push(
            compile_pattern(url, Channel::Url, ci).map_err(|e| (format!("{}.pattern", path), e))?,
        );
    }
    all_of.extend(compile_all(
        indexed(path, "element_selectors", &lp.element_selectors),
        compile_selector,
    )?);
    all_of.extend(compile_all(
        indexed(path, "content_patterns", &lp.content_patterns),
        |src| compile_literal(src, Channel::PageText),
    )?);
    all_of.extend(compile_all(
        indexed(path, "resource_patterns", &lp.resource_patterns),
        |src| compile_pattern(src, Channel::ResourceOrigin, ci),
    )?);
    let any_of = compile_all(
        indexed(path, "referrer_patterns", &lp.referrer_patterns),
        |src| compile_pattern(src, Channel::Referrer, ci),
    )?;
    Ok(RuleMatcher {
        any_of,
        all_of,
        condition: None,
        origin_allowlist: None,
    })
}

/// A rule without a URL pattern or without any allowed origin is kept but
/// never matches.
fn resource_matcher(rule: &ResourceValidationRule, path: &str) -> Compiled<RuleMatcher> {
    if rule.pattern.trim().is_empty() || rule.required_origins.is_empty() {
        return Ok(RuleMatcher::default());
    }
    let url = compile_pattern(&rule.pattern, Channel::Url, PatternFlags::CASE_INSENSITIVE)
        .map_err(|e| (format!("{}.pattern", path), e))?;
    let allowlist = rule
        .required_origins
        .iter()
        .enumerate()
        .map(|(i, origin)| {
            compile_domain_pattern(origin)
                .map_err(|e| (format!("{}.required_origins[{}]", path, i), e))
        })
        .collect::<Compiled<Vec<_>>>()?;
    Ok(RuleMatcher {
        all_of: vec![url],
        origin_allowlist: Some(allowlist),
        ..Default::default()
    })
}

fn element_patterns(el: &DetectionElement, path: &str) -> Compiled<Vec<CompiledPattern>> {
    let channel = el.channel();
    compile_all(
        sources_with_paths(path, el.pattern.as_deref(), &el.patterns),
        |src| compile_pattern(src, channel, PatternFlags::CASE_INSENSITIVE),
    )
}

fn legacy_element_patterns(el: &AadDetectionElement, path: &str) -> Compiled<Vec<CompiledPattern>> {
    let mut patterns = compile_all(indexed(path, "selectors", &el.selectors), compile_selector)?;
    patterns.extend(compile_all(
        indexed(path, "text_patterns", &el.text_patterns),
        |src| compile_pattern(src, Channel::PageText, PatternFlags::CASE_INSENSITIVE),
    )?);
    Ok(patterns)
}

fn indexed<'a>(path: &str, field: &str, sources: &'a [String]) -> Vec<(String, &'a str)> {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| (format!("{}.{}[{}]", path, field, i), s.as_str()))
        .collect()
}
