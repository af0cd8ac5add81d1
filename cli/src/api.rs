//! HTTP implementation of the engine's store capabilities.
//!
//! One blocking client per process; the engine drives it strictly
//! sequentially, so there is nothing to pool. Remote write rejections that
//! arrive as HTTP error statuses still carry a structured body, which is
//! decoded into a normal [`WriteReport`] so the committer can fold it into
//! the aggregate outcome instead of aborting.

use crate::config::Config;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use metasync_engine::error::{Error, Result};
use metasync_engine::{
    CollectionSpec, FieldRef, Id, MetadataBundle, Page, PageCursor, PageNumber, Record,
    RemoteStore, StageField, StageSchema, StageStore, TrackerPayload, TrackerStore, WriteReport,
    WriteStatus,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Blocking HTTP client for a remote metadata store.
pub struct ApiClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl ApiClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Self {
        let auth = format!("{}:{}", config.username, config.password);
        let auth_header = format!("Basic {}", STANDARD.encode(auth));
        let agent = ureq::builder().timeout(Duration::from_secs(120)).build();

        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_header,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> ureq::Request {
        self.agent
            .get(&self.url(path))
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
    }

    fn post(&self, path: &str) -> ureq::Request {
        self.agent
            .post(&self.url(path))
            .set("Authorization", &self.auth_header)
            .set("Accept", "application/json")
    }

    /// Decode a write response. An HTTP error status with a decodable body
    /// is a remote rejection, not a transport failure.
    fn decode_write<T: DeserializeOwned>(
        result: std::result::Result<ureq::Response, ureq::Error>,
    ) -> Result<T> {
        match result {
            Ok(response) => response.into_json().map_err(|e| Error::Write(e.to_string())),
            Err(ureq::Error::Status(_, response)) => {
                response.into_json().map_err(|e| Error::Write(e.to_string()))
            }
            Err(err) => Err(Error::Write(err.to_string())),
        }
    }

    fn fetch_owner_stage(&self, id: &Id) -> Result<Map<String, Value>> {
        let body: Value = self
            .get("programStages")
            .query("filter", &format!("id:eq:{id}"))
            .query("fields", ":owner")
            .query("paging", "false")
            .call()
            .map_err(|e| Error::retrieval("programStages", e.to_string()))?
            .into_json()
            .map_err(|e| Error::retrieval("programStages", e.to_string()))?;

        body.get("programStages")
            .and_then(Value::as_array)
            .and_then(|stages| stages.first())
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| Error::StageNotFound(id.clone()))
    }
}

impl RemoteStore for ApiClient {
    fn get_page(&self, spec: &CollectionSpec, page: PageNumber, page_size: u32) -> Result<Page> {
        let mut request = self
            .get(&spec.endpoint)
            .query("page", &page.to_string())
            .query("pageSize", &page_size.to_string())
            .query("totalPages", "true")
            .query("fields", &spec.fields);
        for filter in &spec.filters {
            request = request.query("filter", filter);
        }
        if let Some(program) = &spec.program {
            request = request.query("program", program);
        }
        if let Some(stage) = &spec.stage {
            request = request.query("programStage", stage);
        }
        if let Some(org_unit) = &spec.org_unit {
            request = request.query("orgUnit", org_unit);
        }
        if let Some(mode) = spec.org_unit_mode {
            request = request.query("ouMode", mode.as_str());
        }

        let body: Value = request
            .call()
            .map_err(|e| Error::retrieval(&spec.endpoint, e.to_string()))?
            .into_json()
            .map_err(|e| Error::retrieval(&spec.endpoint, e.to_string()))?;

        let records = decode_records(&body, &spec.payload_key)
            .map_err(|msg| Error::retrieval(&spec.endpoint, msg))?;
        let cursor = match body.get("pager") {
            Some(pager) => serde_json::from_value(pager.clone())
                .map_err(|e| Error::retrieval(&spec.endpoint, e.to_string()))?,
            // Tracker endpoints report no pager; a short or empty page is
            // the last one
            None => synthesized_cursor(page, records.len(), page_size),
        };

        Ok(Page { records, cursor })
    }

    fn get_by_ids(&self, spec: &CollectionSpec, ids: &[Id]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let (param, value) = id_selection(spec, ids);
        let body: Value = self
            .get(&spec.endpoint)
            .query(&param, &value)
            .query("fields", &spec.fields)
            .query("paging", "false")
            .call()
            .map_err(|e| Error::retrieval(&spec.endpoint, e.to_string()))?
            .into_json()
            .map_err(|e| Error::retrieval(&spec.endpoint, e.to_string()))?;

        decode_records(&body, &spec.payload_key).map_err(|msg| Error::retrieval(&spec.endpoint, msg))
    }

    fn bulk_write(&self, spec: &CollectionSpec, records: &[Record]) -> Result<WriteReport> {
        let body = write_body(spec, records)?;
        // Tracker data and metadata collections go through different
        // importers; the metadata importer silently ignores tracker payloads
        match spec.tracker_category() {
            Some(_) => {
                let result = self.post("tracker").query("async", "false").send_json(body);
                Self::decode_write::<TrackerResponse>(result).map(TrackerResponse::into_report)
            }
            None => {
                let result = self.post("metadata").send_json(body);
                Self::decode_write::<MetadataResponse>(result).map(MetadataResponse::into_report)
            }
        }
    }
}

impl TrackerStore for ApiClient {
    fn get_bundle(&self, container: &Id) -> Result<MetadataBundle> {
        let endpoint = format!("programs/{container}/metadata.json");
        let body: Value = self
            .get(&endpoint)
            .call()
            .map_err(|e| Error::retrieval(&endpoint, e.to_string()))?
            .into_json()
            .map_err(|e| Error::retrieval(&endpoint, e.to_string()))?;

        let object = body
            .as_object()
            .ok_or_else(|| Error::retrieval(&endpoint, "bundle is not an object".to_string()))?;

        let mut bundle = MetadataBundle::default();
        for (category, value) in object {
            // Non-array entries (the provenance timestamp) are not categories
            if value.is_array() {
                let records = serde_json::from_value(value.clone())
                    .map_err(|e| Error::retrieval(&endpoint, e.to_string()))?;
                bundle.categories.insert(category.clone(), records);
            }
        }
        Ok(bundle)
    }

    fn post_metadata(&self, bundle: &MetadataBundle) -> Result<WriteReport> {
        let payload = serde_json::to_value(bundle).map_err(|e| Error::Write(e.to_string()))?;
        let result = self.post("metadata").send_json(payload);
        Self::decode_write::<MetadataResponse>(result).map(MetadataResponse::into_report)
    }

    fn post_tracker(&self, payload: &TrackerPayload) -> Result<WriteReport> {
        let body = serde_json::to_value(payload).map_err(|e| Error::Write(e.to_string()))?;
        let result = self.post("tracker").query("async", "false").send_json(body);
        Self::decode_write::<TrackerResponse>(result).map(TrackerResponse::into_report)
    }
}

impl StageStore for ApiClient {
    fn get_stage(&self, id: &Id) -> Result<StageSchema> {
        let body: StagePage = self
            .get("programStages")
            .query("filter", &format!("id:eq:{id}"))
            .query("fields", "id,programStageDataElements[id,dataElement[id]]")
            .query("paging", "false")
            .call()
            .map_err(|e| Error::retrieval("programStages", e.to_string()))?
            .into_json()
            .map_err(|e| Error::retrieval("programStages", e.to_string()))?;

        let stage = body
            .program_stages
            .into_iter()
            .next()
            .ok_or_else(|| Error::StageNotFound(id.clone()))?;

        Ok(StageSchema {
            id: stage.id,
            fields: stage
                .program_stage_data_elements
                .into_iter()
                .map(|entry| StageField {
                    id: entry.id,
                    field: FieldRef {
                        id: entry.data_element.id,
                    },
                })
                .collect(),
        })
    }

    fn save_stage(&self, stage: &StageSchema) -> Result<WriteReport> {
        let owner = self.fetch_owner_stage(&stage.id)?;
        let merged = merge_stage_entries(owner, stage);

        let mut payload = Map::new();
        payload.insert("programStages".into(), Value::Array(vec![Value::Object(merged)]));
        let result = self.post("metadata").send_json(Value::Object(payload));
        Self::decode_write::<MetadataResponse>(result).map(MetadataResponse::into_report)
    }
}

/// Overwrite the owner representation's field entries with the kept ones,
/// preserving whatever the remote stored per entry.
fn merge_stage_entries(mut owner: Map<String, Value>, stage: &StageSchema) -> Map<String, Value> {
    let existing: Vec<Value> = owner
        .get("programStageDataElements")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let entries: Vec<Value> = stage
        .fields
        .iter()
        .map(|field| {
            let mut entry = existing
                .iter()
                .find(|candidate| candidate.get("id").and_then(Value::as_str) == Some(&field.id))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            entry.insert("dataElement".into(), serde_json::json!({ "id": field.field.id }));
            Value::Object(entry)
        })
        .collect();

    owner.insert("programStageDataElements".into(), Value::Array(entries));
    owner
}

/// Bulk-write body for a spec: tracker data is keyed by its category name,
/// metadata collections by their payload key.
fn write_body(spec: &CollectionSpec, records: &[Record]) -> Result<Value> {
    let key = spec
        .tracker_category()
        .map(str::to_string)
        .unwrap_or_else(|| spec.payload_key.clone());
    let mut payload = Map::new();
    payload.insert(
        key,
        serde_json::to_value(records).map_err(|e| Error::Write(e.to_string()))?,
    );
    Ok(Value::Object(payload))
}

/// Identifier-selection query parameter for a re-read. Metadata collections
/// take a `filter` expression; tracker endpoints take a category-named
/// parameter with semicolon-separated identifiers.
fn id_selection(spec: &CollectionSpec, ids: &[Id]) -> (String, String) {
    match spec.tracker_category() {
        Some(category) => (category.to_string(), ids.join(";")),
        None => ("filter".to_string(), format!("id:in:[{}]", ids.join(","))),
    }
}

fn decode_records(body: &Value, payload_key: &str) -> std::result::Result<Vec<Record>, String> {
    match body.get(payload_key) {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
    }
}

/// Cursor for endpoints that report no page count.
fn synthesized_cursor(page: PageNumber, records: usize, page_size: u32) -> PageCursor {
    let page_count = if records < page_size as usize { page } else { page + 1 };
    PageCursor { page, page_count }
}

// Wire shapes of write responses.

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireStats {
    created: u64,
    updated: u64,
    ignored: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ObjectReport {
    error_reports: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TypeReport {
    object_reports: Vec<ObjectReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    status: WriteStatus,
    #[serde(default)]
    stats: WireStats,
    #[serde(default)]
    type_reports: Vec<TypeReport>,
}

impl MetadataResponse {
    fn into_report(self) -> WriteReport {
        WriteReport {
            status: self.status,
            created: self.stats.created,
            updated: self.stats.updated,
            ignored: self.stats.ignored,
            error_details: self
                .type_reports
                .into_iter()
                .flat_map(|t| t.object_reports)
                .flat_map(|o| o.error_reports)
                .map(|e| e.message)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ValidationReport {
    error_reports: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerResponse {
    status: WriteStatus,
    #[serde(default)]
    stats: WireStats,
    #[serde(default)]
    validation_report: ValidationReport,
}

impl TrackerResponse {
    fn into_report(self) -> WriteReport {
        WriteReport {
            status: self.status,
            created: self.stats.created,
            updated: self.stats.updated,
            ignored: self.stats.ignored,
            error_details: self
                .validation_report
                .error_reports
                .into_iter()
                .map(|e| e.message)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StagePage {
    program_stages: Vec<WireStage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStage {
    id: String,
    #[serde(default)]
    program_stage_data_elements: Vec<WireStageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStageEntry {
    id: String,
    data_element: WireRef,
}

#[derive(Debug, Deserialize)]
struct WireRef {
    id: String,
}
