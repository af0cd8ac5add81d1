//! The record type exchanged with the remote store.
//!
//! A record is a stable identifier plus a flat field map. The open map is
//! deliberate: records cross the wire with shapes the engine does not own,
//! and the merge step must preserve fields it has never heard of. Everything
//! above this boundary works with explicit, closed types.

use crate::{FieldId, Id};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record held by the remote store or produced by rule application.
///
/// Records are never mutated in place; every transformation produces a new
/// value (see [`Record::overlay`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable unique identifier
    pub id: Id,
    /// All remaining fields, exactly as the wire carries them
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record with the given identifier.
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field assignment.
    pub fn with_field(mut self, field: impl Into<FieldId>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field value as a string slice, if it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Whether the record carries the given field.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Overlay `desired` onto this record.
    ///
    /// Fields mentioned by `desired` replace the current value; fields not
    /// mentioned are preserved. This is the merge step of a chunked commit:
    /// `self` is the remote's current representation, `desired` the local
    /// intent.
    pub fn overlay(&self, desired: &Record) -> Record {
        let mut fields = self.fields.clone();
        for (key, value) in &desired.fields {
            fields.insert(key.clone(), value.clone());
        }
        Record {
            id: desired.id.clone(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_and_accessors() {
        let record = Record::new("r1")
            .with_field("name", "Alice")
            .with_field("count", 3);

        assert_eq!(record.id, "r1");
        assert_eq!(record.get_str("name"), Some("Alice"));
        assert_eq!(record.get("count"), Some(&json!(3)));
        assert!(record.has_field("count"));
        assert!(!record.has_field("missing"));
        assert_eq!(record.get_str("count"), None);
    }

    #[test]
    fn overlay_replaces_mentioned_fields_only() {
        let remote = Record::new("r1")
            .with_field("name", "old")
            .with_field("sharing", json!({"public": "r-------"}));
        let desired = Record::new("r1").with_field("name", "new");

        let merged = remote.overlay(&desired);

        assert_eq!(merged.get_str("name"), Some("new"));
        // Unmentioned remote fields survive the merge
        assert_eq!(merged.get("sharing"), Some(&json!({"public": "r-------"})));
    }

    #[test]
    fn overlay_of_unknown_remote_keeps_desired() {
        let remote = Record::new("r1");
        let desired = Record::new("r1").with_field("name", "new");

        assert_eq!(remote.overlay(&desired), desired);
    }

    #[test]
    fn serialization_flattens_fields() {
        let record = Record::new("r1").with_field("name", "Alice");
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json, json!({"id": "r1", "name": "Alice"}));

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
