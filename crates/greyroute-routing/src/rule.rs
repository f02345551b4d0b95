//! Grey rules
//!
//! A rule is a conjunction of conditions keyed by dimension. Every configured
//! dimension must be present (and non-empty) in the request and satisfy its
//! condition for the rule to match.

use greyroute_core::{Dimension, Dimensions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::condition::Condition;

/// Conjunction of per-dimension conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rule {
    conditions: BTreeMap<Dimension, Condition>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition for `dimension`, replacing any previous one
    pub fn with_condition(mut self, dimension: impl Into<Dimension>, condition: Condition) -> Self {
        self.conditions.insert(dimension.into(), condition);
        self
    }

    pub fn conditions(&self) -> &BTreeMap<Dimension, Condition> {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check whether the observed dimensions satisfy every condition
    ///
    /// A rule without conditions matches nothing.
    pub fn matches(&self, dimensions: &Dimensions) -> bool {
        if self.conditions.is_empty() {
            return false;
        }

        self.conditions.iter().all(|(dimension, condition)| {
            match dimensions.get(dimension) {
                Some(value) if !value.is_empty() => condition.matches(value),
                _ => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, &str)]) -> Dimensions {
        pairs
            .iter()
            .map(|(k, v)| (Dimension::from(*k), v.to_string()))
            .collect()
    }

    fn version_and_store() -> Rule {
        Rule::new()
            .with_condition(Dimension::VERSION, Condition::one_of(["v1"]))
            .with_condition(
                Dimension::STORE_ID,
                Condition::one_of(["SID000001", "SID000002"]),
            )
    }

    #[test]
    fn test_all_conditions_must_match() {
        let rule = version_and_store();

        assert!(rule.matches(&dims(&[("version", "v1"), ("storeId", "SID000002")])));
        assert!(!rule.matches(&dims(&[("version", "v2"), ("storeId", "SID000002")])));
        assert!(!rule.matches(&dims(&[("version", "v1"), ("storeId", "SID000009")])));
    }

    #[test]
    fn test_missing_dimension_fails() {
        let rule = version_and_store();
        assert!(!rule.matches(&dims(&[("version", "v1")])));
        assert!(!rule.matches(&Dimensions::new()));
    }

    #[test]
    fn test_empty_value_fails_for_any_condition() {
        // A pattern that would accept the empty string still fails
        let rule = Rule::new().with_condition(Dimension::INS_CODE, Condition::pattern([".*"]));

        assert!(!rule.matches(&dims(&[("insCode", "")])));
        assert!(rule.matches(&dims(&[("insCode", "INS")])));

        let rule = Rule::new().with_condition(Dimension::INS_CODE, Condition::one_of([""]));
        assert!(!rule.matches(&dims(&[("insCode", "")])));
    }

    #[test]
    fn test_empty_rule_matches_nothing() {
        let rule = Rule::new();
        assert!(rule.is_empty());
        assert!(!rule.matches(&dims(&[("version", "v1")])));
        assert!(!rule.matches(&Dimensions::new()));
    }

    #[test]
    fn test_extra_dimensions_are_ignored() {
        let rule = Rule::new().with_condition(Dimension::VERSION, Condition::one_of(["v1"]));
        assert!(rule.matches(&dims(&[
            ("version", "v1"),
            ("storeId", "SID000002"),
            ("terminalId", "T1"),
        ])));
    }

    #[test]
    fn test_deserialize_rule() {
        let json = r#"{
            "version": {"type": "in", "args": ["v1"]},
            "storeId": {"type": "in", "args": ["SID000001", "SID000002"]}
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.len(), 2);
        assert_eq!(rule, version_and_store());
    }

    #[test]
    fn test_open_dimension_names() {
        let rule = Rule::new().with_condition("channel", Condition::one_of(["pos"]));
        assert!(rule.matches(&dims(&[("channel", "pos")])));
    }
}
