//! Remote-store capability traits and wire types.
//!
//! The engine never talks to a network itself. Callers hand it an
//! implementation of these traits; tests hand it an in-memory fake. All
//! methods are synchronous because the whole core is strictly sequential:
//! one outstanding request at a time, each awaited to completion before the
//! next is issued.

use crate::error::Result;
use crate::record::Record;
use crate::{CategoryKey, Id, PageNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Org-unit scoping for collection queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgUnitMode {
    /// Only the named org units
    Selected,
    /// The named org units and everything below them
    Descendants,
    /// No org-unit filtering at all
    All,
}

impl OrgUnitMode {
    /// Wire value for query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgUnitMode::Selected => "SELECTED",
            OrgUnitMode::Descendants => "DESCENDANTS",
            OrgUnitMode::All => "ALL",
        }
    }
}

/// Description of a remote collection endpoint and its query scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    /// Path of the collection under the API root, e.g. `categoryOptions`
    pub endpoint: String,
    /// Key holding the record array in page responses and write payloads
    pub payload_key: String,
    /// Field selection expression
    pub fields: String,
    /// Additional `property:op:value` filters
    pub filters: Vec<String>,
    /// Container (program-like) scope, if any
    pub program: Option<Id>,
    /// Stage scope within the container, if any
    pub stage: Option<Id>,
    /// Root org unit, if the query is org-unit scoped
    pub org_unit: Option<Id>,
    /// How the org unit scope is interpreted
    pub org_unit_mode: Option<OrgUnitMode>,
}

impl CollectionSpec {
    /// Spec for a metadata-style collection (owner fields, no scoping).
    pub fn metadata(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            payload_key: endpoint.clone(),
            endpoint,
            fields: ":owner".into(),
            filters: Vec::new(),
            program: None,
            stage: None,
            org_unit: None,
            org_unit_mode: None,
        }
    }

    /// Spec for a tracker data category scoped to one container, unfiltered
    /// by org unit.
    pub fn tracker(category: &str, program: &Id) -> Self {
        Self {
            endpoint: format!("tracker/{category}"),
            payload_key: "instances".into(),
            fields: "*".into(),
            filters: Vec::new(),
            program: Some(program.clone()),
            stage: None,
            org_unit: None,
            org_unit_mode: Some(OrgUnitMode::All),
        }
    }

    /// Spec for the events of one container stage below a root org unit.
    pub fn stage_events(program: &Id, stage: &Id, root_org_unit: &Id) -> Self {
        Self {
            endpoint: "tracker/events".into(),
            payload_key: "instances".into(),
            fields: "*".into(),
            filters: Vec::new(),
            program: Some(program.clone()),
            stage: Some(stage.clone()),
            org_unit: Some(root_org_unit.clone()),
            org_unit_mode: Some(OrgUnitMode::Descendants),
        }
    }

    /// The tracker data category this spec addresses, if its endpoint is a
    /// tracker data endpoint. Tracker data travels through a different API
    /// surface than metadata collections, so transports dispatch on this.
    pub fn tracker_category(&self) -> Option<&str> {
        self.endpoint.strip_prefix("tracker/")
    }

    /// Builder-style filter addition.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Builder-style field selection.
    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = fields.into();
        self
    }
}

/// Position of a page within a paginated collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    /// 1-based page number of the page just fetched
    pub page: PageNumber,
    /// Total number of pages the remote reports
    pub page_count: PageNumber,
}

impl PageCursor {
    /// Pagination is complete exactly when `page >= page_count`.
    ///
    /// A reported page count of 0 or 1 therefore terminates after the first
    /// fetch.
    pub fn is_last(&self) -> bool {
        self.page >= self.page_count
    }
}

/// One fetched page of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Records decoded from the page, in remote order
    pub records: Vec<Record>,
    /// Cursor of this page
    pub cursor: PageCursor,
}

/// Remote status of a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteStatus {
    Ok,
    Warning,
    Error,
}

/// Per-request outcome of a bulk write, as the remote reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub status: WriteStatus,
    pub created: u64,
    pub updated: u64,
    pub ignored: u64,
    /// Structured error messages extracted from the response
    pub error_details: Vec<String>,
}

impl WriteReport {
    /// A clean report with zero counters.
    pub fn ok() -> Self {
        Self {
            status: WriteStatus::Ok,
            created: 0,
            updated: 0,
            ignored: 0,
            error_details: Vec::new(),
        }
    }

    /// Whether the remote accepted the whole batch.
    pub fn is_ok(&self) -> bool {
        self.status == WriteStatus::Ok
    }

    /// All error details joined into one message.
    pub fn error_message(&self) -> String {
        self.error_details.join("\n")
    }
}

/// Metadata categories of one container, keyed by category name.
///
/// The map is ordered so exports serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataBundle {
    #[serde(flatten)]
    pub categories: BTreeMap<CategoryKey, Vec<Record>>,
}

impl MetadataBundle {
    /// Total record count across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Whether the bundle holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Payload for a tracker data write. Empty categories are left off the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Record>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrollments: Vec<Record>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracked_entities: Vec<Record>,
}

/// The paginated, bulk-writable remote collection capability.
pub trait RemoteStore {
    /// Fetch one page of a collection.
    fn get_page(&self, spec: &CollectionSpec, page: PageNumber, page_size: u32) -> Result<Page>;

    /// Fetch the current full representation of the given identifiers.
    fn get_by_ids(&self, spec: &CollectionSpec, ids: &[Id]) -> Result<Vec<Record>>;

    /// Submit one bulk write and report the per-batch outcome.
    fn bulk_write(&self, spec: &CollectionSpec, records: &[Record]) -> Result<WriteReport>;
}

/// Tracker-side capability: container bundles and tracker data writes.
pub trait TrackerStore {
    /// Fetch the metadata bundle of one container.
    fn get_bundle(&self, container: &Id) -> Result<MetadataBundle>;

    /// Submit a metadata bundle as one bulk write.
    fn post_metadata(&self, bundle: &MetadataBundle) -> Result<WriteReport>;

    /// Submit tracker data as one bulk write.
    fn post_tracker(&self, payload: &TrackerPayload) -> Result<WriteReport>;
}

/// Stage-schema capability used by the derived-values use case.
pub trait StageStore {
    /// Fetch a stage schema by id.
    fn get_stage(&self, id: &Id) -> Result<crate::propagate::StageSchema>;

    /// Persist a stage schema, merging against the remote's owner
    /// representation.
    fn save_stage(&self, stage: &crate::propagate::StageSchema) -> Result<WriteReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_completion() {
        assert!(PageCursor { page: 1, page_count: 0 }.is_last());
        assert!(PageCursor { page: 1, page_count: 1 }.is_last());
        assert!(!PageCursor { page: 1, page_count: 2 }.is_last());
        assert!(PageCursor { page: 3, page_count: 3 }.is_last());
    }

    #[test]
    fn report_error_message_joins_details() {
        let mut report = WriteReport::ok();
        report.error_details = vec!["first".into(), "second".into()];
        assert_eq!(report.error_message(), "first\nsecond");

        assert_eq!(WriteReport::ok().error_message(), "");
    }

    #[test]
    fn metadata_spec_defaults() {
        let spec = CollectionSpec::metadata("categoryOptions");
        assert_eq!(spec.endpoint, "categoryOptions");
        assert_eq!(spec.payload_key, "categoryOptions");
        assert_eq!(spec.fields, ":owner");
        assert!(spec.program.is_none());
    }

    #[test]
    fn tracker_spec_is_unscoped_by_org_unit() {
        let spec = CollectionSpec::tracker("enrollments", &"p1".to_string());
        assert_eq!(spec.endpoint, "tracker/enrollments");
        assert_eq!(spec.payload_key, "instances");
        assert_eq!(spec.org_unit_mode, Some(OrgUnitMode::All));
        assert_eq!(spec.program.as_deref(), Some("p1"));
    }

    #[test]
    fn tracker_category_identifies_data_specs() {
        let program = "p1".to_string();
        assert_eq!(
            CollectionSpec::tracker("events", &program).tracker_category(),
            Some("events")
        );
        assert_eq!(
            CollectionSpec::stage_events(&program, &"st1".to_string(), &"root".to_string())
                .tracker_category(),
            Some("events")
        );
        assert_eq!(CollectionSpec::metadata("categoryOptions").tracker_category(), None);
    }

    #[test]
    fn org_unit_mode_wire_values() {
        assert_eq!(OrgUnitMode::All.as_str(), "ALL");
        assert_eq!(OrgUnitMode::Descendants.as_str(), "DESCENDANTS");
        assert_eq!(
            serde_json::to_string(&OrgUnitMode::All).unwrap(),
            "\"ALL\""
        );
    }

    #[test]
    fn tracker_payload_drops_empty_categories() {
        let payload = TrackerPayload {
            events: vec![Record::new("e1")],
            ..Default::default()
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("events").is_some());
        assert!(json.get("enrollments").is_none());
        assert!(json.get("trackedEntities").is_none());
    }
}
