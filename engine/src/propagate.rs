//! Conditional field propagation.
//!
//! A rule set names one parent field and N dependent child fields, each with
//! a trigger condition and a substitution value. Propagation scans a record
//! collection, keeps the records carrying the parent field, and recomputes
//! every child field: the substitution value on an exact match of the
//! trigger condition, the empty string otherwise. Clearing instead of
//! leaving stale values makes a re-run idempotent.
//!
//! Rule application order cannot affect the result because child field
//! identifiers are unique within a rule set; [`RuleSet::validate`] enforces
//! that before any record is touched.

use crate::error::{Error, Result};
use crate::record::Record;
use crate::{FieldId, Id};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// One condition/substitution pair deriving a child field from the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    /// Field this rule writes
    pub child_field: FieldId,
    /// Parent value that triggers the substitution (exact string equality)
    pub trigger_condition: String,
    /// Value written when the condition matches
    pub substitution_value: String,
}

/// A full propagation rule set: one parent field, N child rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Field every rule conditions on
    pub parent_field: FieldId,
    /// Whether the parent field definition should be retired from the
    /// stage schema once propagation has been committed
    #[serde(default)]
    pub remove_parent: bool,
    /// Child rules; child fields must be unique
    pub rules: Vec<FieldRule>,
}

impl RuleSet {
    /// Reject rule sets where two rules write the same child field.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.child_field.as_str()) {
                return Err(Error::RuleSet(format!(
                    "duplicate child field: {}",
                    rule.child_field
                )));
            }
        }
        Ok(())
    }

    /// Reject a rule set whose parent field appears in none of the given
    /// records. An empty collection is fine; a populated collection where
    /// the parent is universally absent means the rule set targets the
    /// wrong collection.
    pub fn validate_against(&self, records: &[Record]) -> Result<()> {
        if !records.is_empty() && !records.iter().any(|r| r.has_field(&self.parent_field)) {
            return Err(Error::RuleSet(format!(
                "parent field {} absent from every record",
                self.parent_field
            )));
        }
        Ok(())
    }
}

/// Apply a rule set to a record collection.
///
/// Returns only the records carrying the parent field, each with every
/// child field recomputed and merged over the original fields. Records
/// without the parent field are dropped from the result, not passed
/// through.
pub fn propagate(records: &[Record], rule_set: &RuleSet) -> Result<Vec<Record>> {
    rule_set.validate()?;

    Ok(records
        .iter()
        .filter_map(|record| {
            let parent = record.get(&rule_set.parent_field)?;
            let parent = parent.as_str().unwrap_or("");

            let mut updated = record.clone();
            for rule in &rule_set.rules {
                let value = if parent == rule.trigger_condition {
                    rule.substitution_value.clone()
                } else {
                    String::new()
                };
                updated
                    .fields
                    .insert(rule.child_field.clone(), Value::String(value));
            }
            Some(updated)
        })
        .collect())
}

/// Reference to a field definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub id: Id,
}

/// One field entry of a stage schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageField {
    /// Identifier of the entry itself
    pub id: Id,
    /// The field definition it points at
    pub field: FieldRef,
}

/// A schema-like record listing the fields a stage carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSchema {
    pub id: Id,
    pub fields: Vec<StageField>,
}

/// Remove the entry matching `parent_field` from a stage schema.
///
/// A structural edit used to retire the parent field definition after
/// propagation; every other field entry is left untouched.
pub fn strip_parent_field(stage: &StageSchema, parent_field: &str) -> StageSchema {
    StageSchema {
        id: stage.id.clone(),
        fields: stage
            .fields
            .iter()
            .filter(|entry| entry.field.id != parent_field)
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(child: &str, condition: &str, value: &str) -> FieldRule {
        FieldRule {
            child_field: child.into(),
            trigger_condition: condition.into(),
            substitution_value: value.into(),
        }
    }

    fn rule_set(rules: Vec<FieldRule>) -> RuleSet {
        RuleSet {
            parent_field: "P".into(),
            remove_parent: false,
            rules,
        }
    }

    #[test]
    fn matching_condition_substitutes() {
        let rs = rule_set(vec![rule("C1", "yes", "X")]);
        let records = vec![Record::new("e1").with_field("P", "yes")];

        let out = propagate(&records, &rs).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_str("P"), Some("yes"));
        assert_eq!(out[0].get_str("C1"), Some("X"));
    }

    #[test]
    fn non_matching_condition_clears_child() {
        let rs = rule_set(vec![rule("C1", "yes", "X")]);
        let records = vec![Record::new("e2")
            .with_field("P", "no")
            .with_field("C1", "stale")];

        let out = propagate(&records, &rs).unwrap();

        assert_eq!(out[0].get_str("C1"), Some(""));
    }

    #[test]
    fn records_without_parent_are_dropped() {
        let rs = rule_set(vec![rule("C1", "yes", "X")]);
        let records = vec![
            Record::new("e1").with_field("P", "yes"),
            Record::new("e3").with_field("other", "value"),
        ];

        let out = propagate(&records, &rs).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "e1");
    }

    #[test]
    fn unrelated_fields_survive() {
        let rs = rule_set(vec![rule("C1", "yes", "X")]);
        let records = vec![Record::new("e1")
            .with_field("P", "yes")
            .with_field("note", "keep")];

        let out = propagate(&records, &rs).unwrap();

        assert_eq!(out[0].get_str("note"), Some("keep"));
    }

    #[test]
    fn reapplication_is_idempotent() {
        let rs = rule_set(vec![rule("C1", "yes", "X"), rule("C2", "no", "Y")]);
        let records = vec![
            Record::new("e1").with_field("P", "yes"),
            Record::new("e2").with_field("P", "no"),
        ];

        let once = propagate(&records, &rs).unwrap();
        let twice = propagate(&once, &rs).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_child_fields_rejected() {
        let rs = rule_set(vec![rule("C1", "yes", "X"), rule("C1", "no", "Y")]);

        let err = propagate(&[], &rs).unwrap_err();
        assert!(matches!(err, Error::RuleSet(_)));
    }

    #[test]
    fn parent_absent_everywhere_fails_pre_validation() {
        let rs = rule_set(vec![rule("C1", "yes", "X")]);
        let records = vec![Record::new("e1").with_field("other", "v")];

        assert!(rs.validate_against(&records).is_err());
        assert!(rs.validate_against(&[]).is_ok());
        let with_parent = vec![Record::new("e2").with_field("P", "no")];
        assert!(rs.validate_against(&with_parent).is_ok());
    }

    #[test]
    fn strip_removes_only_the_parent_entry() {
        let stage = StageSchema {
            id: "st1".into(),
            fields: vec![
                StageField {
                    id: "ps1".into(),
                    field: FieldRef { id: "P".into() },
                },
                StageField {
                    id: "ps2".into(),
                    field: FieldRef { id: "C1".into() },
                },
            ],
        };

        let stripped = strip_parent_field(&stage, "P");

        assert_eq!(stripped.id, "st1");
        assert_eq!(stripped.fields.len(), 1);
        assert_eq!(stripped.fields[0].field.id, "C1");
    }
}
