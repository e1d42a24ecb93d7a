//! Engine configuration.
//!
//! Loaded from JSON or YAML:
//!
//! ```yaml
//! rules_url: https://rules.example.net/m365-phishing.json
//! update_interval: 12h
//! strict_activation: false
//! fingerprint_gate: true
//! ```

use crate::error::{ConfigError, ParseError, ParseErrorKind};
use crate::evaluate::EvaluateOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_UPDATE_INTERVAL: &str = "24h";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HTTP(S) location the host fetches rule documents from.
    pub rules_url: Option<String>,
    /// Refresh period, e.g. `30m`, `1d` or `PT6H`.
    pub update_interval: String,
    /// Reject a document when any of its rules fails to compile.
    pub strict_activation: bool,
    pub fingerprint_gate: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            rules_url: None,
            update_interval: DEFAULT_UPDATE_INTERVAL.to_string(),
            strict_activation: false,
            fingerprint_gate: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(input: &str) -> Result<EngineConfig, ParseError> {
        serde_json::from_str(input).map_err(|e| ParseError {
            kind: ParseErrorKind::TypeMismatch,
            message: e.to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
        })
    }

    pub fn from_yaml(input: &str) -> Result<EngineConfig, ParseError> {
        serde_saphyr::from_str(input).map_err(|e| ParseError {
            kind: ParseErrorKind::TypeMismatch,
            message: e.to_string(),
            line: None,
            column: None,
        })
    }

    /// Checks every field, returning all problems found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if let Err(e) = self.rules_url() {
            errors.push(e);
        }
        if let Err(e) = self.update_interval() {
            errors.push(e);
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// The parsed rule source URL. Only `http` and `https` are accepted.
    pub fn rules_url(&self) -> Result<Option<url::Url>, ConfigError> {
        let Some(raw) = self.rules_url.as_deref() else {
            return Ok(None);
        };
        let err = |message: String| ConfigError {
            field: "rules_url".to_string(),
            message,
        };
        let parsed = url::Url::parse(raw).map_err(|e| err(format!("'{}': {}", raw, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Some(parsed)),
            other => Err(err(format!("unsupported scheme '{}'", other))),
        }
    }

    /// The refresh period. Zero is rejected.
    pub fn update_interval(&self) -> Result<Duration, ConfigError> {
        let err = |message: String| ConfigError {
            field: "update_interval".to_string(),
            message,
        };
        let interval = parse_duration(&self.update_interval).map_err(&err)?;
        if interval.is_zero() {
            return Err(err("interval must be greater than zero".to_string()));
        }
        Ok(interval)
    }

    pub fn evaluate_options(&self) -> EvaluateOptions {
        EvaluateOptions {
            fingerprint_gate: self.fingerprint_gate,
        }
    }
}

/// Parses a duration in shorthand (`30s`, `5m`, `1h`, `2d`) or ISO 8601
/// (`PT30S`, `P1D`, `P1DT12H30M`) form.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    let secs = match input.strip_prefix('P') {
        Some(rest) => iso_seconds(rest),
        None => shorthand_seconds(input),
    }
    .ok_or_else(|| format!("invalid duration '{}'", input))?;
    Ok(Duration::from_secs(secs))
}

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        's' | 'S' => Some(1),
        'm' | 'M' => Some(60),
        'h' | 'H' => Some(3_600),
        'd' | 'D' => Some(86_400),
        _ => None,
    }
}

fn shorthand_seconds(input: &str) -> Option<u64> {
    let unit = input.chars().next_back()?;
    let n: u64 = input[..input.len() - unit.len_utf8()].parse().ok()?;
    n.checked_mul(unit_seconds(unit)?)
}

/// Sums `<n><unit>` components. Days are only allowed before `T`; hours,
/// minutes and seconds only after it, in that order.
fn iso_seconds(rest: &str) -> Option<u64> {
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return None,
        None => (rest, None),
    };
    if date.is_empty() && time.is_none() {
        return None;
    }

    let mut total = 0u64;
    if !date.is_empty() {
        total = sum_components(date, &['D'])?;
    }
    if let Some(time) = time {
        total = total.checked_add(sum_components(time, &['H', 'M', 'S'])?)?;
    }
    Some(total)
}

fn sum_components(part: &str, allowed: &[char]) -> Option<u64> {
    let mut total = 0u64;
    let mut digits = String::new();
    let mut next_unit = 0;
    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let pos = allowed[next_unit..].iter().position(|u| *u == c)? + next_unit;
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(unit_seconds(c)?)?)?;
        digits.clear();
        next_unit = pos + 1;
    }
    digits.is_empty().then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
    }

    #[test]
    fn iso_durations() {
        assert_eq!(parse_duration("PT1H").unwrap(), Duration::from_secs(3_600));
        assert_eq!(parse_duration("P1D").unwrap(), Duration::from_secs(86_400));
        assert_eq!(
            parse_duration("P1DT12H30M15S").unwrap(),
            Duration::from_secs(86_400 + 12 * 3_600 + 30 * 60 + 15)
        );
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "h", "10", "10x", "P", "PT", "PT1D", "PT1S1H", "P1H", "-5m", "1.5h"] {
            assert!(parse_duration(bad).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_duration("18446744073709551615d").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.update_interval().unwrap(), Duration::from_secs(86_400));
        assert!(config.evaluate_options().fingerprint_gate);
    }

    #[test]
    fn rules_url_must_be_http() {
        let config = EngineConfig {
            rules_url: Some("ftp://rules.example.net/rules.json".to_string()),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rules_url");
    }

    #[test]
    fn loads_yaml() {
        let config = EngineConfig::from_yaml(
            "rules_url: https://rules.example.net/r.json\nupdate_interval: PT6H\nstrict_activation: true\n",
        )
        .unwrap();
        assert!(config.strict_activation);
        assert!(config.fingerprint_gate);
        assert_eq!(config.update_interval().unwrap(), Duration::from_secs(21_600));
        assert_eq!(
            config.rules_url().unwrap().unwrap().host_str(),
            Some("rules.example.net")
        );
    }

    #[test]
    fn zero_interval_rejected() {
        let config = EngineConfig {
            update_interval: "0s".to_string(),
            ..Default::default()
        };
        assert!(config.update_interval().is_err());
    }
}
