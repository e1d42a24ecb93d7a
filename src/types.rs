use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::enums::*;

// ─── Rule document ──────────────────────────────────────────────────────────

/// The root of a detection rule set as it appears on the wire.
///
/// Every field is optional on the wire: missing or `null` lists default to
/// empty, missing weights to zero and missing thresholds to the stock cut
/// points. Unknown fields are ignored so older engines can load newer
/// documents.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDocument {
    #[serde(deserialize_with = "nullable")]
    pub version: String,
    #[serde(
        alias = "lastUpdated",
        deserialize_with = "de_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    /// Full-URL patterns of genuine identity-provider login endpoints.
    #[serde(deserialize_with = "nullable")]
    pub trusted_login_patterns: Vec<String>,
    /// Hostname patterns of the identity provider's own properties.
    #[serde(deserialize_with = "nullable")]
    pub microsoft_domain_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub exclusion_system: ExclusionSystem,
    #[serde(deserialize_with = "nullable")]
    pub legitimate_discussion_domains: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub m365_detection_requirements: IdentityProviderRequirements,
    #[serde(deserialize_with = "nullable")]
    pub blocking_rules: Vec<BlockingRule>,
    #[serde(deserialize_with = "nullable")]
    pub allow_rules: Vec<AllowRule>,
    #[serde(deserialize_with = "nullable")]
    pub aad_detection_elements: Vec<AadDetectionElement>,
    #[serde(deserialize_with = "nullable")]
    pub rules: Vec<DetectionRule>,
    pub thresholds: DetectionThresholds,
    #[serde(deserialize_with = "nullable")]
    pub phishing_indicators: Vec<Indicator>,
    #[serde(deserialize_with = "nullable")]
    pub legitimate_patterns: Vec<LegitimatePattern>,
    #[serde(deserialize_with = "nullable")]
    pub suspicious_behaviors: Vec<Indicator>,
    #[serde(deserialize_with = "nullable")]
    pub detection_logic: DetectionLogic,
}

/// Reads `null` as the field's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
fn de_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| {
            serde::de::Error::custom(format!("invalid last_updated timestamp: '{}'", raw))
        })
}

// ─── Exclusions ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionSystem {
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub domain_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub context_indicators: ContextIndicators,
}

/// Literal strings searched (case-insensitively) in page text and referrer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextIndicators {
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub legitimate_contexts: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub legitimate_sso_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub suspicious_contexts: Vec<String>,
}

// ─── Identity-provider fingerprint ──────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderRequirements {
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub primary_elements: Vec<DetectionElement>,
    #[serde(deserialize_with = "nullable")]
    pub secondary_elements: Vec<DetectionElement>,
    pub detection_thresholds: FingerprintThresholds,
    /// Matched legacy elements required when only `aad_detection_elements` exist.
    pub legacy_minimum_required: usize,
    #[serde(deserialize_with = "nullable")]
    pub legacy_all_must_be_present: bool,
}

impl Default for IdentityProviderRequirements {
    fn default() -> Self {
        IdentityProviderRequirements {
            description: String::new(),
            primary_elements: Vec::new(),
            secondary_elements: Vec::new(),
            detection_thresholds: FingerprintThresholds::default(),
            legacy_minimum_required: 4,
            legacy_all_must_be_present: false,
        }
    }
}

impl IdentityProviderRequirements {
    pub fn has_elements(&self) -> bool {
        !self.primary_elements.is_empty() || !self.secondary_elements.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintThresholds {
    pub minimum_primary_elements: usize,
    pub minimum_total_weight: f64,
    pub minimum_elements_overall: usize,
    pub minimum_secondary_only_weight: f64,
    pub minimum_secondary_only_elements: usize,
}

impl Default for FingerprintThresholds {
    fn default() -> Self {
        FingerprintThresholds {
            minimum_primary_elements: 1,
            minimum_total_weight: 4.0,
            minimum_elements_overall: 3,
            minimum_secondary_only_weight: 9.0,
            minimum_secondary_only_elements: 7,
        }
    }
}

/// One weighted piece of evidence that a page is the provider's login surface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionElement {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub element_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
    #[serde(deserialize_with = "nullable")]
    pub category: String,
}

impl DetectionElement {
    pub fn pattern_sources(&self) -> Vec<&str> {
        collect_sources(self.pattern.as_deref(), &self.patterns)
    }

    /// The channel this element is tested on: `type` wins over `category`,
    /// and text content is assumed when neither names a channel.
    pub fn channel(&self) -> Channel {
        Channel::from_hint(&self.element_type)
            .or_else(|| Channel::from_hint(&self.category))
            .unwrap_or(Channel::PageText)
    }
}

/// Older fingerprint element form: CSS selectors and text regexes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AadDetectionElement {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub selectors: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub text_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
}

// ─── Scoring rules ──────────────────────────────────────────────────────────

/// A weighted pattern rule. Used for both `phishing_indicators` and
/// `suspicious_behaviors`, and embedded in [`BlockingRule`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Indicator {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub patterns: Vec<String>,
    /// Regex flags: `i` case-insensitive, `m` multiline, `s` dot-all, `x` verbose.
    #[serde(deserialize_with = "nullable")]
    pub flags: String,
    /// Channel name; unrecognized names fall back to page text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
    pub severity: Severity,
    #[serde(deserialize_with = "nullable")]
    pub category: String,
    pub action: RuleAction,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Regexes that must all match the page text as well.
    #[serde(deserialize_with = "nullable")]
    pub context_required: Vec<String>,
    /// Literal substrings that must all be present in the page text.
    #[serde(deserialize_with = "nullable")]
    pub additional_checks: Vec<String>,
}

impl Indicator {
    pub fn pattern_sources(&self) -> Vec<&str> {
        collect_sources(self.pattern.as_deref(), &self.patterns)
    }

    pub fn channel(&self) -> Channel {
        named_channel(self.channel.as_deref()).unwrap_or(Channel::PageText)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingRule {
    #[serde(flatten)]
    pub indicator: Indicator,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub rule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<RawCondition>,
}

impl BlockingRule {
    /// A critical block overrides the score instead of adding weight.
    pub fn is_critical_block(&self) -> bool {
        self.indicator.action == RuleAction::Block && self.indicator.severity == Severity::Critical
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowRule {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub rule_type: String,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub flags: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<RawCondition>,
    pub action: RuleAction,
    pub priority: PrioritySetting,
}

impl AllowRule {
    pub fn pattern_sources(&self) -> Vec<&str> {
        collect_sources(self.pattern.as_deref(), &self.patterns)
    }

    /// Allow rules test the URL unless they name another channel.
    pub fn channel(&self) -> Channel {
        named_channel(self.channel.as_deref()).unwrap_or(Channel::Url)
    }
}

/// Generic weighted rule driven purely by a typed condition.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRule {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub rule_type: String,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<RawCondition>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
}

/// Evidence of a known-good page. Matches when every configured facet matches.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegitimatePattern {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Regex tested against the full URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub element_selectors: Vec<String>,
    /// Literal strings searched in the page text.
    #[serde(deserialize_with = "nullable")]
    pub content_patterns: Vec<String>,
    /// Regexes tested against resource origins; any origin may satisfy each.
    #[serde(deserialize_with = "nullable")]
    pub resource_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub referrer_patterns: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl LegitimatePattern {
    pub fn has_facets(&self) -> bool {
        self.pattern.as_deref().is_some_and(|p| !p.is_empty())
            || !self.element_selectors.is_empty()
            || !self.content_patterns.is_empty()
            || !self.resource_patterns.is_empty()
            || !self.referrer_patterns.is_empty()
    }
}

// ─── Detection logic ────────────────────────────────────────────────────────

/// Rule families grouped under `detection_logic`. Only resource validation is
/// executable; the free-text expression families are ignored.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionLogic {
    #[serde(deserialize_with = "nullable")]
    pub resource_validation_rules: Vec<ResourceValidationRule>,
}

/// On pages whose URL matches `pattern`, every loaded resource must come from
/// one of `required_origins`. A foreign origin either blocks the page
/// (`action: block`) or adds `weight`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceValidationRule {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    /// Case-insensitive regex tested against the full URL.
    #[serde(deserialize_with = "nullable")]
    pub pattern: String,
    /// Domain patterns (wildcard or regex) for the hosts of resource origins.
    #[serde(deserialize_with = "nullable")]
    pub required_origins: Vec<String>,
    pub action: RuleAction,
    #[serde(deserialize_with = "nullable")]
    pub weight: f64,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
}

impl ResourceValidationRule {
    pub fn is_block(&self) -> bool {
        self.action == RuleAction::Block
    }
}

// ─── Thresholds ─────────────────────────────────────────────────────────────

/// Score cut points on the 0–100 axis. Must satisfy `phishing < suspicious < legitimate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    pub legitimate: i64,
    pub suspicious: i64,
    pub phishing: i64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        DetectionThresholds {
            legitimate: 85,
            suspicious: 55,
            phishing: 25,
        }
    }
}

// ─── Conditions ─────────────────────────────────────────────────────────────

/// A rule condition as written in the document. It is only interpreted at
/// activation, so an unknown or malformed condition disables its own rule
/// instead of failing the parse.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCondition(pub Value);

impl RawCondition {
    pub fn to_condition(&self) -> Result<Condition, serde_json::Error> {
        Condition::deserialize(&self.0)
    }
}

/// A typed rule condition. Externally tagged on the wire:
///
/// ```json
/// { "and": [ { "domain_match": "*.example.net" },
///            { "selector_exists": "input[type=password]" } ] }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Hostname matches a domain pattern (wildcard domain or regex).
    DomainMatch(String),
    SelectorExists(String),
    /// Case-insensitive literal search in the page text.
    TextContains(String),
    RegexMatch(RegexCondition),
    /// The score accumulated so far lies in `[min, max)`.
    WeightThreshold(WeightRange),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegexCondition {
    pub pattern: String,
    #[serde(default = "default_regex_channel")]
    pub channel: Channel,
    #[serde(default)]
    pub flags: String,
}

fn default_regex_channel() -> Channel {
    Channel::PageText
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl WeightRange {
    pub fn contains(&self, score: f64) -> bool {
        self.min.is_none_or(|min| score >= min) && self.max.is_none_or(|max| score < max)
    }
}

/// Maps a channel name; `None` for missing, empty or unrecognized names.
pub(crate) fn named_channel(name: Option<&str>) -> Option<Channel> {
    name.and_then(Channel::from_hint)
}

fn collect_sources<'a>(single: Option<&'a str>, many: &'a [String]) -> Vec<&'a str> {
    single
        .into_iter()
        .chain(many.iter().map(String::as_str))
        .filter(|p| !p.is_empty())
        .collect()
}
