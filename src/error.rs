use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A structured diagnostic message produced during validation or activation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

/// Error kind for parse failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    Syntax,
    TypeMismatch,
    UnknownVariant,
}

/// Produced by `parse` when deserialization of a rule document fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "{}:{}: {}", line, col, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ParseError {}

/// Produced by `validate` when a document violates a structural rule.
/// Any validation error rejects the whole document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub rule: String,
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.rule, self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Result of validation: errors and warnings.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single rule whose patterns could not be compiled. The rule is disabled;
/// the rest of the document still activates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub rule_id: String,
    /// Document path of the offending pattern, e.g. `phishing_indicators[3].pattern`.
    pub path: String,
    pub pattern: String,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rule '{}' disabled: pattern at {} failed to compile: {}",
            self.rule_id, self.path, self.message
        )
    }
}

impl std::error::Error for CompileError {}

/// Summary of one activation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationReport {
    /// Rules (and exclusion/fingerprint entries) that compiled and are live.
    pub active_rules: usize,
    pub disabled: Vec<CompileError>,
}

impl ActivationReport {
    pub fn is_clean(&self) -> bool {
        self.disabled.is_empty()
    }

    pub fn is_disabled(&self, rule_id: &str) -> bool {
        self.disabled.iter().any(|e| e.rule_id == rule_id)
    }
}

/// Error kind for a page signal that could not be read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalErrorKind {
    Unavailable,
    InvalidSelector,
    InvalidUrl,
}

/// Produced by a [`crate::signals::PageSignals`] implementation. Never fatal:
/// rules depending on the failed channel simply do not match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalError {
    pub kind: SignalErrorKind,
    pub message: String,
}

impl SignalError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        SignalError {
            kind: SignalErrorKind::Unavailable,
            message: message.into(),
        }
    }
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SignalError {}

/// Error kind for evaluation failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationErrorKind {
    NonFiniteScore,
    Panicked,
}

/// An unexpected failure while evaluating one page. Reported to the host as a
/// `suspicious` verdict, never as a fault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvaluationError {}

/// Error returned by a [`crate::store::RuleSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceError {
    pub message: String,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SourceError {}

/// Why a rule document was not published. The previously active document
/// stays in place whenever one of these is returned.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadError {
    Source(SourceError),
    Parse(ParseError),
    Invalid(Vec<ValidationError>),
    /// The document is older than the one currently active.
    Stale {
        active: String,
        rejected: String,
    },
    /// Strict activation was requested and at least one rule failed to compile.
    Compile(Vec<CompileError>),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Source(e) => write!(f, "rule source error: {}", e),
            LoadError::Parse(e) => write!(f, "parse error: {}", e),
            LoadError::Invalid(errors) => {
                write!(f, "rule document invalid ({} errors)", errors.len())?;
                if let Some(first) = errors.first() {
                    write!(f, ": {}", first)?;
                }
                Ok(())
            }
            LoadError::Stale { active, rejected } => write!(
                f,
                "rule document last updated {} is older than active document {}",
                rejected, active
            ),
            LoadError::Compile(errors) => {
                write!(f, "{} rules failed to compile in strict mode", errors.len())
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl From<ParseError> for LoadError {
    fn from(e: ParseError) -> Self {
        LoadError::Parse(e)
    }
}

impl From<SourceError> for LoadError {
    fn from(e: SourceError) -> Self {
        LoadError::Source(e)
    }
}

/// An invalid [`crate::config::EngineConfig`] value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}
