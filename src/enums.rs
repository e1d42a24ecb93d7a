//! Closed enumerations used throughout the rule model and the verdict.
//!
//! Rule documents are authored by hand and fetched from remote sources, so
//! names in them are read leniently: case is ignored, unknown severities and
//! actions map to a catch-all variant, unknown priorities are kept as
//! [`PrioritySetting::Unrecognized`], and rule channel names go through
//! [`Channel::from_hint`]. None of them fails the whole document.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Output classification band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Legitimate,
    Suspicious,
    Phishing,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Band::Legitimate => "legitimate",
            Band::Suspicious => "suspicious",
            Band::Phishing => "phishing",
        })
    }
}

/// A page signal a pattern is tested against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Url,
    Hostname,
    Title,
    PageText,
    Selector,
    ResourceOrigin,
    Referrer,
}

impl Channel {
    /// Maps a free-form element `type` or `category` hint to a channel.
    ///
    /// Returns `None` for hints that carry no channel information (for
    /// example the `primary`/`secondary` bucket names).
    pub fn from_hint(hint: &str) -> Option<Channel> {
        let hint = hint.trim().to_ascii_lowercase();
        match hint.as_str() {
            "url" | "url_pattern" | "location" => Some(Channel::Url),
            "hostname" | "domain" | "host" => Some(Channel::Hostname),
            "title" | "page_title" => Some(Channel::Title),
            "text" | "text_content" | "source_content" | "content" | "page_text" | "branding"
            | "form" | "form_content" => Some(Channel::PageText),
            "selector" | "css_selector" | "dom" | "element" | "dom_element" => {
                Some(Channel::Selector)
            }
            "resource" | "resources" | "resource_origin" | "script_source" | "stylesheet" => {
                Some(Channel::ResourceOrigin)
            }
            "referrer" | "referer" => Some(Channel::Referrer),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Url => "url",
            Channel::Hostname => "hostname",
            Channel::Title => "title",
            Channel::PageText => "page_text",
            Channel::Selector => "selector",
            Channel::ResourceOrigin => "resource_origin",
            Channel::Referrer => "referrer",
        })
    }
}

/// Rule severity tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    Unspecified,
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_name(name: &str) -> Severity {
        match name.trim().to_ascii_lowercase().as_str() {
            "info" | "informational" => Severity::Informational,
            "low" => Severity::Low,
            "medium" | "moderate" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unspecified => "unspecified",
            Severity::Informational => "informational",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(Severity::from_name).unwrap_or_default())
    }
}

/// What a rule asks the host to do when it matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RuleAction {
    #[default]
    Unspecified,
    Block,
    Warn,
    Allow,
    Monitor,
}

impl RuleAction {
    pub fn from_name(name: &str) -> RuleAction {
        match name.trim().to_ascii_lowercase().as_str() {
            "block" => RuleAction::Block,
            "warn" | "warning" => RuleAction::Warn,
            "allow" => RuleAction::Allow,
            "monitor" | "log" => RuleAction::Monitor,
            _ => RuleAction::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleAction::Unspecified => "unspecified",
            RuleAction::Block => "block",
            RuleAction::Warn => "warn",
            RuleAction::Allow => "allow",
            RuleAction::Monitor => "monitor",
        }
    }
}

impl Serialize for RuleAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RuleAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(RuleAction::from_name).unwrap_or_default())
    }
}

/// Allow-rule priority rank. Written either as a number or as one of the
/// names `critical`, `high`, `medium`, `low`. Higher ranks win.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u32);

impl Priority {
    pub const LOW: Priority = Priority(25);
    pub const MEDIUM: Priority = Priority(50);
    pub const HIGH: Priority = Priority(75);
    pub const CRITICAL: Priority = Priority(100);

    pub fn from_name(name: &str) -> Option<Priority> {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "low" => Some(Priority::LOW),
            "medium" | "normal" => Some(Priority::MEDIUM),
            "high" => Some(Priority::HIGH),
            "critical" | "highest" => Some(Priority::CRITICAL),
            other => other.parse::<u32>().ok().map(Priority),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

/// An allow rule's `priority` as written. Values that are neither a
/// non-negative integer nor a known name are kept for reporting and rank as
/// the default priority.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum PrioritySetting {
    #[default]
    Unset,
    Rank(Priority),
    Unrecognized(String),
}

impl PrioritySetting {
    pub fn rank(&self) -> Priority {
        match self {
            PrioritySetting::Rank(p) => *p,
            _ => Priority::default(),
        }
    }
}

impl From<Value> for PrioritySetting {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => PrioritySetting::Unset,
            Value::Number(n) => match n.as_u64() {
                Some(n) => PrioritySetting::Rank(Priority(n.min(u32::MAX as u64) as u32)),
                None => PrioritySetting::Unrecognized(n.to_string()),
            },
            Value::String(s) if s.trim().is_empty() => PrioritySetting::Unset,
            Value::String(s) => match Priority::from_name(&s) {
                Some(p) => PrioritySetting::Rank(p),
                None => PrioritySetting::Unrecognized(s),
            },
            other => PrioritySetting::Unrecognized(other.to_string()),
        }
    }
}

impl Serialize for PrioritySetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PrioritySetting::Unset => serializer.serialize_none(),
            PrioritySetting::Rank(p) => p.serialize(serializer),
            PrioritySetting::Unrecognized(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for PrioritySetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(PrioritySetting::from(Value::deserialize(deserializer)?))
    }
}

/// Which list of the rule document a rule came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    PhishingIndicator,
    SuspiciousBehavior,
    BlockingRule,
    AllowRule,
    LegitimatePattern,
    DetectionRule,
    ResourceValidation,
}

/// Machine-readable explanation attached to a verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ExcludedDomain,
    TrustedLoginPattern,
    KnownProviderDomain,
    DiscussionDomain,
    LegitimateContext,
    SuspiciousContextOverride,
    NotIdentityProviderSurface,
    FingerprintNotConfigured,
    FingerprintGateDisabled,
    LoginSurfaceDetected,
    CriticalBlockingRule,
    AllowRule,
    ScoreLegitimate,
    ScoreSuspicious,
    ScorePhishing,
    SignalUnavailable,
    EvaluationFailed,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        f.write_str(value.as_str().unwrap_or_default())
    }
}
