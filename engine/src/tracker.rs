//! Multi-entity tracker export and import.
//!
//! An export gathers, per container id, the container's metadata bundle and
//! its three data categories (events, enrollments, tracked entities). The
//! import path is deliberately stricter than the metadata committer: tracker
//! records reference each other, so a partially applied batch risks
//! orphaned references and the run halts on the first rejected write.

use crate::error::{Error, Result};
use crate::paginate::fetch_all;
use crate::record::Record;
use crate::store::{CollectionSpec, MetadataBundle, RemoteStore, TrackerPayload, TrackerStore, WriteReport};
use crate::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Page size for tracker data category fetches.
pub const TRACKER_PAGE_SIZE: u32 = 10_000;

/// Fixed chunk bound for event imports.
pub const EVENT_IMPORT_CHUNK_SIZE: usize = 1000;

/// Provenance timestamp key excluded from merged metadata categories.
const PROVENANCE_KEY: &str = "date";

/// The three tracker data categories of an export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerData {
    pub events: Vec<Record>,
    pub enrollments: Vec<Record>,
    pub tracked_entities: Vec<Record>,
}

/// Terminal artifact of an export run: merged metadata plus tracker data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerExport {
    pub metadata: MetadataBundle,
    pub data: TrackerData,
}

/// Union bundles per category, deduplicating by record id.
///
/// First occurrence wins, in bundle order then record order. The
/// provenance timestamp entry is not a category and is dropped.
pub fn merge_bundles(bundles: &[MetadataBundle]) -> MetadataBundle {
    let mut merged = MetadataBundle::default();
    let mut seen: HashSet<(String, Id)> = HashSet::new();

    for bundle in bundles {
        for (category, records) in &bundle.categories {
            if category == PROVENANCE_KEY {
                continue;
            }
            let target = merged.categories.entry(category.clone()).or_default();
            for record in records {
                if seen.insert((category.clone(), record.id.clone())) {
                    target.push(record.clone());
                }
            }
        }
    }
    merged
}

/// Export/import pipeline over one remote store.
pub struct TrackerPipeline<'a, S: RemoteStore + TrackerStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RemoteStore + TrackerStore + ?Sized> TrackerPipeline<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Export the metadata and tracker data of the given containers.
    ///
    /// Data categories concatenate in container-id order, then page order,
    /// fetched one container at a time.
    pub fn export(&self, container_ids: &[Id]) -> Result<TrackerExport> {
        let mut bundles = Vec::with_capacity(container_ids.len());
        for container in container_ids {
            tracing::debug!(%container, "fetching metadata bundle");
            bundles.push(self.store.get_bundle(container)?);
        }
        let metadata = merge_bundles(&bundles);

        let events = self.fetch_category("events", container_ids)?;
        let enrollments = self.fetch_category("enrollments", container_ids)?;
        let tracked_entities = self.fetch_category("trackedEntities", container_ids)?;

        tracing::info!(
            metadata = metadata.len(),
            events = events.len(),
            enrollments = enrollments.len(),
            tracked_entities = tracked_entities.len(),
            "export assembled"
        );

        Ok(TrackerExport {
            metadata,
            data: TrackerData {
                events,
                enrollments,
                tracked_entities,
            },
        })
    }

    /// Import a previously assembled export.
    ///
    /// Metadata goes first as one bulk write, then enrollments and tracked
    /// entities together, then events in fixed chunks. Events are
    /// append/replace-only and are never merged against a remote read. The
    /// first non-OK report aborts the whole import.
    pub fn import(&self, export: &TrackerExport) -> Result<()> {
        tracing::info!("importing metadata");
        ensure_accepted(self.store.post_metadata(&export.metadata)?)?;

        tracing::info!("importing enrollments and tracked entities");
        ensure_accepted(self.store.post_tracker(&TrackerPayload {
            enrollments: export.data.enrollments.clone(),
            tracked_entities: export.data.tracked_entities.clone(),
            ..Default::default()
        })?)?;

        for chunk in export.data.events.chunks(EVENT_IMPORT_CHUNK_SIZE) {
            tracing::info!(count = chunk.len(), "importing events");
            ensure_accepted(self.store.post_tracker(&TrackerPayload {
                events: chunk.to_vec(),
                ..Default::default()
            })?)?;
        }
        Ok(())
    }

    fn fetch_category(&self, category: &str, container_ids: &[Id]) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for container in container_ids {
            let spec = CollectionSpec::tracker(category, container);
            records.extend(fetch_all(self.store, &spec, TRACKER_PAGE_SIZE)?);
        }
        tracing::debug!(category, total = records.len(), "category fetched");
        Ok(records)
    }
}

fn ensure_accepted(report: WriteReport) -> Result<()> {
    if report.is_ok() {
        Ok(())
    } else {
        Err(Error::ImportFailed(report.error_message()))
    }
}
