//! Grey conditions
//!
//! A condition is a single predicate over one dimension value:
//! - `in`: the value equals one of the configured arguments
//! - `pattern`: the value matches one of the configured regular expressions
//!
//! Unknown condition types and empty argument lists never match.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of test a condition performs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionKind {
    /// Exact membership in `args`
    In,
    /// Regex match against any expression in `args`
    Pattern,
    /// Any type this build does not understand (always false)
    Unknown(String),
}

impl From<String> for ConditionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "in" => ConditionKind::In,
            "pattern" => ConditionKind::Pattern,
            _ => ConditionKind::Unknown(value),
        }
    }
}

impl From<ConditionKind> for String {
    fn from(kind: ConditionKind) -> Self {
        match kind {
            ConditionKind::In => "in".to_string(),
            ConditionKind::Pattern => "pattern".to_string(),
            ConditionKind::Unknown(other) => other,
        }
    }
}

impl Default for ConditionKind {
    fn default() -> Self {
        ConditionKind::Unknown(String::new())
    }
}

/// A single grey condition over one dimension
#[derive(Debug, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type", default, deserialize_with = "crate::strategy::nullable")]
    pub kind: ConditionKind,
    #[serde(default, deserialize_with = "crate::strategy::nullable")]
    pub args: Vec<String>,
    /// Compiled `pattern` expressions (lazily initialized, not serialized).
    /// Malformed expressions are kept as `None` so they never match.
    #[serde(skip)]
    compiled: OnceCell<Vec<Option<Regex>>>,
}

// Implement Clone manually so every copy owns its regex cache
impl Clone for Condition {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            args: self.args.clone(),
            compiled: OnceCell::new(),
        }
    }
}

impl Condition {
    pub fn new(kind: ConditionKind, args: Vec<String>) -> Self {
        Self {
            kind,
            args,
            compiled: OnceCell::new(),
        }
    }

    /// Membership condition over the given values
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ConditionKind::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    /// Pattern condition over the given regular expressions
    pub fn pattern<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            ConditionKind::Pattern,
            patterns.into_iter().map(Into::into).collect(),
        )
    }

    /// Check whether `value` satisfies this condition
    pub fn matches(&self, value: &str) -> bool {
        if self.args.is_empty() {
            return false;
        }

        match &self.kind {
            ConditionKind::In => self.args.iter().any(|arg| arg == value),
            ConditionKind::Pattern => self
                .compiled_patterns()
                .iter()
                .flatten()
                .any(|regex| regex.is_match(value)),
            ConditionKind::Unknown(kind) => {
                tracing::debug!("Unknown grey condition type '{}' never matches", kind);
                false
            }
        }
    }

    fn compiled_patterns(&self) -> &[Option<Regex>] {
        self.compiled.get_or_init(|| {
            self.args
                .iter()
                .map(|pattern| match Regex::new(pattern) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::warn!(
                            "Invalid regex pattern '{}' in grey condition: {}",
                            pattern,
                            e
                        );
                        None
                    }
                })
                .collect()
        })
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.args == other.args
    }
}
