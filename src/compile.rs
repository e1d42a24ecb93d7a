//! Pattern compiler.
//!
//! Turns the textual patterns of a rule document into executable matchers.
//! Every function here returns a [`PatternError`] instead of panicking; the
//! activation pass attaches the owning rule and disables it.
//!
//! Patterns use the syntax of the [`regex`] crate. Rule sets written for
//! backtracking engines occasionally use look-around or back-references;
//! those patterns fail here and only their rule is lost.

use crate::enums::Channel;
use crate::types::{Condition, RawCondition, WeightRange};
use regex::{Regex, RegexBuilder};
use std::fmt;
use std::sync::LazyLock;

/// Upper bound on the compiled size of a single remote-supplied regex.
pub const MAX_REGEX_SIZE: usize = 1 << 20;

/// Maximum nesting of `and`/`or` condition groups.
pub const MAX_CONDITION_DEPTH: usize = 16;

static WILDCARD_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*\.)?[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)+$")
        .unwrap()
});

/// A pattern that failed to compile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.pattern, self.message)
    }
}

impl std::error::Error for PatternError {}

/// Regex flags parsed from a rule's `flags` string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
    pub verbose: bool,
}

impl PatternFlags {
    pub const CASE_INSENSITIVE: PatternFlags = PatternFlags {
        case_insensitive: true,
        multi_line: false,
        dot_all: false,
        verbose: false,
    };

    /// Parses a flag string such as `"gi"` or `"im"`. Unknown letters
    /// (`g`, `u`, ...) are ignored.
    pub fn parse(flags: &str) -> PatternFlags {
        let mut out = PatternFlags::default();
        for c in flags.chars() {
            match c.to_ascii_lowercase() {
                'i' => out.case_insensitive = true,
                'm' => out.multi_line = true,
                's' => out.dot_all = true,
                'x' => out.verbose = true,
                _ => {}
            }
        }
        out
    }
}

/// An executable matcher.
#[derive(Clone, Debug)]
pub enum CompiledMatcher {
    Regex(Regex),
    /// Case-insensitive substring; the needle is stored lowercased.
    Literal(String),
    /// A CSS selector handed to the signal extractor as-is.
    Selector(String),
}

impl CompiledMatcher {
    /// Tests a text haystack. Selectors never match text.
    pub fn is_match(&self, haystack: &str) -> bool {
        match self {
            CompiledMatcher::Regex(re) => re.is_match(haystack),
            CompiledMatcher::Literal(needle) => contains_ignore_case(haystack, needle),
            CompiledMatcher::Selector(_) => false,
        }
    }

    /// The pattern text this matcher was built from (literals lowercased).
    pub fn as_str(&self) -> &str {
        match self {
            CompiledMatcher::Regex(re) => re.as_str(),
            CompiledMatcher::Literal(needle) => needle,
            CompiledMatcher::Selector(selector) => selector,
        }
    }
}

/// A matcher bound to the signal channel it reads.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    pub channel: Channel,
    pub matcher: CompiledMatcher,
    /// Length in characters of the source pattern, used as its specificity.
    pub specificity: usize,
}

/// Compiles a regex with the given flags.
pub fn compile_regex(source: &str, flags: PatternFlags) -> Result<Regex, PatternError> {
    RegexBuilder::new(source)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .ignore_whitespace(flags.verbose)
        .size_limit(MAX_REGEX_SIZE)
        .build()
        .map_err(|e| PatternError {
            pattern: source.to_string(),
            message: e.to_string(),
        })
}

/// Compiles a case-insensitive literal matcher. An empty literal would match
/// everything and is rejected.
pub fn compile_literal(source: &str, channel: Channel) -> Result<CompiledPattern, PatternError> {
    if source.trim().is_empty() {
        return Err(PatternError {
            pattern: source.to_string(),
            message: "empty literal".to_string(),
        });
    }
    Ok(CompiledPattern {
        channel,
        matcher: CompiledMatcher::Literal(source.to_lowercase()),
        specificity: source.chars().count(),
    })
}

/// Checks that a selector is non-empty and has balanced brackets and quotes.
/// Full selector parsing is the extractor's job; this catches the malformed
/// input that would otherwise make every query on the page fail.
pub fn compile_selector(source: &str) -> Result<CompiledPattern, PatternError> {
    let err = |message: &str| PatternError {
        pattern: source.to_string(),
        message: message.to_string(),
    };
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(err("empty selector"));
    }

    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if c == '\\' {
                chars.next();
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => stack.push(c),
            ']' => {
                if stack.pop() != Some('[') {
                    return Err(err("unbalanced ']'"));
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return Err(err("unbalanced ')'"));
                }
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(err("unterminated string"));
    }
    if !stack.is_empty() {
        return Err(err("unclosed bracket"));
    }

    Ok(CompiledPattern {
        channel: Channel::Selector,
        matcher: CompiledMatcher::Selector(trimmed.to_string()),
        specificity: trimmed.chars().count(),
    })
}

/// Compiles a pattern for a channel: a selector on the selector channel,
/// a regex everywhere else.
pub fn compile_pattern(
    source: &str,
    channel: Channel,
    flags: PatternFlags,
) -> Result<CompiledPattern, PatternError> {
    if channel == Channel::Selector {
        return compile_selector(source);
    }
    let re = compile_regex(source, flags)?;
    Ok(CompiledPattern {
        channel,
        matcher: CompiledMatcher::Regex(re),
        specificity: source.chars().count(),
    })
}

/// Compiles a hostname pattern.
///
/// A bare domain (`example.com`) or wildcard (`*.example.com`) matches the
/// domain itself and any subdomain. Anything else is a case-insensitive regex.
pub fn compile_domain_pattern(source: &str) -> Result<Regex, PatternError> {
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(PatternError {
            pattern: source.to_string(),
            message: "empty domain pattern".to_string(),
        });
    }
    if WILDCARD_DOMAIN_RE.is_match(trimmed) {
        let domain = trimmed.trim_start_matches("*.");
        let anchored = format!(r"^(?:[a-z0-9-]+\.)*{}\.?$", regex::escape(domain));
        return compile_regex(&anchored, PatternFlags::CASE_INSENSITIVE);
    }
    compile_regex(trimmed, PatternFlags::CASE_INSENSITIVE)
}

/// A condition with every pattern compiled.
#[derive(Clone, Debug)]
pub enum CompiledCondition {
    DomainMatch(Regex),
    SelectorExists(CompiledPattern),
    TextContains(CompiledPattern),
    RegexMatch(CompiledPattern),
    WeightThreshold(WeightRange),
    And(Vec<CompiledCondition>),
    Or(Vec<CompiledCondition>),
}

/// Interprets a condition as written in a rule document and compiles it.
/// Unknown condition kinds and missing fields fail like a bad pattern.
pub fn compile_raw_condition(raw: &RawCondition) -> Result<CompiledCondition, PatternError> {
    let condition = raw.to_condition().map_err(|e| PatternError {
        pattern: raw.0.to_string(),
        message: format!("unrecognized condition: {}", e),
    })?;
    compile_condition(&condition)
}

/// Compiles a condition tree, failing on the first bad pattern or when the
/// tree nests deeper than [`MAX_CONDITION_DEPTH`].
pub fn compile_condition(condition: &Condition) -> Result<CompiledCondition, PatternError> {
    compile_condition_at(condition, 0)
}

fn compile_condition_at(
    condition: &Condition,
    depth: usize,
) -> Result<CompiledCondition, PatternError> {
    if depth > MAX_CONDITION_DEPTH {
        return Err(PatternError {
            pattern: String::new(),
            message: format!("condition nesting exceeds {} levels", MAX_CONDITION_DEPTH),
        });
    }
    Ok(match condition {
        Condition::DomainMatch(p) => CompiledCondition::DomainMatch(compile_domain_pattern(p)?),
        Condition::SelectorExists(s) => CompiledCondition::SelectorExists(compile_selector(s)?),
        Condition::TextContains(s) => {
            CompiledCondition::TextContains(compile_literal(s, Channel::PageText)?)
        }
        Condition::RegexMatch(rc) => CompiledCondition::RegexMatch(compile_pattern(
            &rc.pattern,
            rc.channel,
            PatternFlags::parse(&rc.flags),
        )?),
        Condition::WeightThreshold(range) => CompiledCondition::WeightThreshold(range.clone()),
        Condition::And(items) => CompiledCondition::And(
            items
                .iter()
                .map(|c| compile_condition_at(c, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Condition::Or(items) => CompiledCondition::Or(
            items
                .iter()
                .map(|c| compile_condition_at(c, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
    })
}

/// Case-insensitive substring test; `needle` must already be lowercase.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|w| w.eq_ignore_ascii_case(needle.as_bytes()));
    }
    haystack.to_lowercase().contains(needle)
}
