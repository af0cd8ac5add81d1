//! Rule-set settings file.
//!
//! The derive-values command reads its rules from a JSON settings file
//! rather than the command line, keeping a run reproducible. The file names
//! the parent field, whether to retire it afterwards, and the child rules.

use metasync_engine::error::{Error, Result};
use metasync_engine::{FieldRule, RuleSet};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    data_element: ParentSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentSettings {
    id: String,
    #[serde(default)]
    remove: bool,
    data_elements_to_update: Vec<ChildSettings>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChildSettings {
    id: String,
    condition: String,
    value: String,
}

impl From<SettingsFile> for RuleSet {
    fn from(file: SettingsFile) -> Self {
        RuleSet {
            parent_field: file.data_element.id,
            remove_parent: file.data_element.remove,
            rules: file
                .data_element
                .data_elements_to_update
                .into_iter()
                .map(|child| FieldRule {
                    child_field: child.id,
                    trigger_condition: child.condition,
                    substitution_value: child.value,
                })
                .collect(),
        }
    }
}

/// Parse and validate a rule set from settings-file JSON.
pub fn parse_rule_set(json: &str) -> Result<RuleSet> {
    let file: SettingsFile =
        serde_json::from_str(json).map_err(|e| Error::RuleSet(e.to_string()))?;
    let rule_set = RuleSet::from(file);
    rule_set.validate()?;
    Ok(rule_set)
}

/// Load a rule set from a settings file on disk.
pub fn load_rule_set(path: &Path) -> Result<RuleSet> {
    let json = fs::read_to_string(path)
        .map_err(|e| Error::RuleSet(format!("{}: {e}", path.display())))?;
    parse_rule_set(&json)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "dataElement": {
            "id": "P",
            "remove": true,
            "dataElementsToUpdate": [
                {"id": "C1", "condition": "yes", "value": "X"},
                {"id": "C2", "condition": "no", "value": "Y"}
            ]
        }
    }"#;

    #[test]
    fn valid_file_parses() {
        let rule_set = parse_rule_set(VALID).unwrap();

        assert_eq!(rule_set.parent_field, "P");
        assert!(rule_set.remove_parent);
        assert_eq!(rule_set.rules.len(), 2);
        assert_eq!(rule_set.rules[0].child_field, "C1");
        assert_eq!(rule_set.rules[0].trigger_condition, "yes");
        assert_eq!(rule_set.rules[1].substitution_value, "Y");
    }

    #[test]
    fn remove_defaults_to_false() {
        let json = r#"{"dataElement": {"id": "P", "dataElementsToUpdate": []}}"#;
        let rule_set = parse_rule_set(json).unwrap();
        assert!(!rule_set.remove_parent);
    }

    #[test]
    fn duplicate_children_rejected() {
        let json = r#"{
            "dataElement": {
                "id": "P",
                "dataElementsToUpdate": [
                    {"id": "C1", "condition": "yes", "value": "X"},
                    {"id": "C1", "condition": "no", "value": "Y"}
                ]
            }
        }"#;
        assert!(matches!(parse_rule_set(json), Err(Error::RuleSet(_))));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(parse_rule_set("{"), Err(Error::RuleSet(_))));
    }
}
