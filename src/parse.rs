use crate::error::{ParseError, ParseErrorKind};
use crate::types::RuleDocument;
use serde_json::Value;

/// Parse a JSON rule document into an unvalidated [`RuleDocument`].
///
/// Performs deserialization and type mapping only. Unknown fields are
/// ignored and missing optional fields take their defaults. Does NOT
/// validate thresholds or compile patterns.
pub fn parse(input: &str) -> Result<RuleDocument, ParseError> {
    check_non_empty(input)?;

    let value: Value = serde_json::from_str(input).map_err(|e| ParseError {
        kind: classify_json_error(&e.to_string()),
        message: e.to_string(),
        line: Some(e.line()),
        column: Some(e.column()),
    })?;

    parse_value(value)
}

/// Parse a YAML-authored rule document. The schema is identical to the JSON
/// wire format; the YAML is first read into a JSON value tree.
pub fn parse_yaml(input: &str) -> Result<RuleDocument, ParseError> {
    check_non_empty(input)?;

    let value: Value = serde_saphyr::from_str(input).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_saphyr_error(&msg),
            message: msg,
            line: None,
            column: None,
        }
    })?;

    parse_value(value)
}

/// Convert an already-parsed value tree into a [`RuleDocument`].
pub fn parse_value(value: Value) -> Result<RuleDocument, ParseError> {
    if !value.is_object() {
        return Err(ParseError {
            kind: ParseErrorKind::TypeMismatch,
            message: "rule document root must be an object".to_string(),
            line: None,
            column: None,
        });
    }

    serde_json::from_value(value).map_err(|e| {
        let msg = e.to_string();
        ParseError {
            kind: classify_json_error(&msg),
            message: msg,
            line: None,
            column: None,
        }
    })
}

fn check_non_empty(input: &str) -> Result<(), ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError {
            kind: ParseErrorKind::Syntax,
            message: "empty input".to_string(),
            line: None,
            column: None,
        });
    }
    Ok(())
}

fn classify_saphyr_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("unknown") || lower.contains("variant") {
        ParseErrorKind::UnknownVariant
    } else if lower.contains("type") || lower.contains("invalid") || lower.contains("expected") {
        ParseErrorKind::TypeMismatch
    } else {
        ParseErrorKind::Syntax
    }
}

fn classify_json_error(msg: &str) -> ParseErrorKind {
    let lower = msg.to_lowercase();
    if lower.contains("unknown variant") {
        ParseErrorKind::UnknownVariant
    } else if lower.contains("missing field")
        || lower.contains("invalid type")
        || lower.contains("invalid value")
    {
        ParseErrorKind::TypeMismatch
    } else {
        ParseErrorKind::Syntax
    }
}
