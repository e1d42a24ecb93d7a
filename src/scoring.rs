//! Scoring engine.
//!
//! Sums the weights of every matching rule on a confirmed login surface. All
//! rules are evaluated; there is no early exit, so the list of matched rule
//! ids in a verdict is complete.

use crate::activate::{ActiveRules, CompiledRule, RuleMatcher};
use crate::compile::CompiledCondition;
use crate::enums::RuleKind;
use crate::error::{EvaluationError, EvaluationErrorKind};
use crate::signals::{PageSignals, SignalView, hostname_of};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Clamps a raw weight sum onto the 0–100 score axis.
pub fn clamp_score(raw: f64) -> f64 {
    raw.clamp(MIN_SCORE, MAX_SCORE)
}

/// One rule that matched during scoring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleHit {
    pub rule_id: String,
    pub kind: RuleKind,
    /// Weight added to the score; zero for allow rules and critical blocks.
    pub weight: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    /// Clamped to 0–100.
    pub score: f64,
    /// Unclamped sum of matched weights.
    pub raw_score: f64,
    pub hits: Vec<RuleHit>,
    /// First critical blocking rule that matched.
    pub critical_block: Option<String>,
    /// Highest-priority allow rule that matched.
    pub allow_override: Option<String>,
    pub indicators_evaluated: usize,
}

impl ScoreOutcome {
    pub fn matched_rule_ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.rule_id.clone()).collect()
    }
}

impl ActiveRules {
    /// Scores a page against every scoring, blocking and allow rule.
    ///
    /// Fails only if the weight sum is not a finite number.
    pub fn score(&self, signals: &dyn PageSignals) -> Result<ScoreOutcome, EvaluationError> {
        self.score_view(&SignalView::new(signals))
    }

    pub(crate) fn score_view(
        &self,
        view: &SignalView<'_>,
    ) -> Result<ScoreOutcome, EvaluationError> {
        let mut out = ScoreOutcome::default();

        for rule in self.scoring_rules.iter().chain(&self.blocking_rules) {
            out.indicators_evaluated += 1;
            let running = clamp_score(out.raw_score);
            if !rule_matches(view, &rule.matcher, running) {
                continue;
            }
            if rule.critical {
                log::debug!("critical blocking rule {} matched", rule.id);
                out.critical_block.get_or_insert_with(|| rule.id.clone());
                out.hits.push(hit(rule, 0.0));
                continue;
            }
            out.raw_score += rule.weight;
            out.hits.push(hit(rule, rule.weight));
            if !out.raw_score.is_finite() {
                return Err(EvaluationError {
                    kind: EvaluationErrorKind::NonFiniteScore,
                    message: format!("score is not finite after rule {}", rule.id),
                    rule_id: Some(rule.id.clone()),
                });
            }
        }

        let running = clamp_score(out.raw_score);
        for rule in &self.allow_rules {
            out.indicators_evaluated += 1;
            if rule_matches(view, &rule.matcher, running) {
                out.allow_override.get_or_insert_with(|| rule.id.clone());
                out.hits.push(hit(rule, 0.0));
            }
        }

        out.score = clamp_score(out.raw_score);
        Ok(out)
    }
}

fn hit(rule: &CompiledRule, weight: f64) -> RuleHit {
    RuleHit {
        rule_id: rule.id.clone(),
        kind: rule.kind,
        weight,
    }
}

/// Tests a rule matcher. `score` is the running clamped score, read by
/// `weight_threshold` conditions.
pub(crate) fn rule_matches(view: &SignalView<'_>, m: &RuleMatcher, score: f64) -> bool {
    if m.is_empty() {
        return false;
    }
    if !m.any_of.is_empty() && !m.any_of.iter().any(|p| view.matches(p)) {
        return false;
    }
    if !m.all_of.iter().all(|p| view.matches(p)) {
        return false;
    }
    if let Some(allowlist) = &m.origin_allowlist
        && !has_foreign_origin(view, allowlist)
    {
        return false;
    }
    match &m.condition {
        Some(cond) => condition_holds(view, cond, score),
        None => true,
    }
}

/// True when some resource origin's host matches none of the allowed
/// patterns. Origins without a scheme are compared as bare hosts.
fn has_foreign_origin(view: &SignalView<'_>, allowlist: &[Regex]) -> bool {
    view.resource_origins().iter().any(|origin| {
        let host = hostname_of(origin).unwrap_or_else(|_| origin.trim().to_ascii_lowercase());
        !allowlist.iter().any(|re| re.is_match(&host))
    })
}

/// Evaluates a compiled condition tree. Empty `and` holds; empty `or` does not.
pub(crate) fn condition_holds(view: &SignalView<'_>, cond: &CompiledCondition, score: f64) -> bool {
    match cond {
        CompiledCondition::DomainMatch(re) => view.hostname().is_some_and(|h| re.is_match(h)),
        CompiledCondition::SelectorExists(p)
        | CompiledCondition::TextContains(p)
        | CompiledCondition::RegexMatch(p) => view.matches(p),
        CompiledCondition::WeightThreshold(range) => range.contains(score),
        CompiledCondition::And(items) => items.iter().all(|c| condition_holds(view, c, score)),
        CompiledCondition::Or(items) => items.iter().any(|c| condition_holds(view, c, score)),
    }
}
