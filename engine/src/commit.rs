//! Chunked bulk commit with read-modify-merge semantics.
//!
//! Bulk write endpoints here have undocumented practical size limits, and a
//! failure in one oversized batch would make it impossible to tell which
//! records failed. Bounded chunks keep the blast radius of one failure at
//! most `chunk_size` records and keep the merge step to one remote read per
//! chunk instead of one per record.
//!
//! Chunks are processed strictly in order: chunk N's read must observe the
//! remote state as it stands after chunk N-1's write.

use crate::error::Result;
use crate::record::Record;
use crate::store::{CollectionSpec, RemoteStore, WriteReport};
use crate::Id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chunk bound for metadata-style collections.
pub const METADATA_CHUNK_SIZE: usize = 300;

/// Chunk bound for bulk data-value collections.
pub const DATA_CHUNK_SIZE: usize = 1000;

/// Aggregate outcome of a chunked commit.
///
/// Counters are the sums of the per-chunk counters; `records_skipped` and
/// `error_message` concatenate in chunk order. A non-empty skip list or
/// error message signals partial failure even though the call itself did
/// not raise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub created: u64,
    pub updated: u64,
    pub ignored: u64,
    /// Every identifier of every chunk whose remote status was not OK
    pub records_skipped: Vec<Id>,
    /// Concatenation of all non-empty per-chunk error messages
    pub error_message: String,
}

impl CommitOutcome {
    /// Outcome for a chunk that failed outright: every identifier skipped,
    /// the failure as the message.
    pub fn skipped_chunk(ids: &[Id], message: impl Into<String>) -> Self {
        Self {
            records_skipped: ids.to_vec(),
            error_message: message.into(),
            ..Self::default()
        }
    }

    /// Outcome of one chunk, derived from the remote's write report.
    ///
    /// A non-OK status skips the whole chunk, not merely the records the
    /// remote explicitly reported: the remote does not guarantee partial
    /// application within a failed batch.
    pub fn from_report(chunk: &[Id], report: &WriteReport) -> Self {
        Self {
            created: report.created,
            updated: report.updated,
            ignored: report.ignored,
            records_skipped: if report.is_ok() { Vec::new() } else { chunk.to_vec() },
            error_message: report.error_message(),
        }
    }

    /// Fold another chunk's outcome into this one.
    pub fn combine(mut self, other: CommitOutcome) -> Self {
        self.created += other.created;
        self.updated += other.updated;
        self.ignored += other.ignored;
        self.records_skipped.extend(other.records_skipped);
        self.error_message.push_str(&other.error_message);
        self
    }

    /// Whether every chunk was applied without error.
    pub fn is_clean(&self) -> bool {
        self.records_skipped.is_empty() && self.error_message.is_empty()
    }
}

/// Commits a set of desired records in bounded chunks.
pub struct ChunkedCommitter<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    spec: &'a CollectionSpec,
}

impl<'a, S: RemoteStore + ?Sized> ChunkedCommitter<'a, S> {
    /// Create a committer for one collection.
    pub fn new(store: &'a S, spec: &'a CollectionSpec) -> Self {
        Self { store, spec }
    }

    /// Commit all desired records in chunks of at most `chunk_size`.
    ///
    /// Chunks partition the identifiers exactly, preserving encounter
    /// order. A chunk whose read or write step fails is folded into the
    /// aggregate as fully skipped with the failure's message; remaining
    /// chunks still run.
    pub fn commit_all(&self, desired: &[Record], chunk_size: usize) -> CommitOutcome {
        let ids: Vec<Id> = desired.iter().map(|record| record.id.clone()).collect();
        let by_id: HashMap<&str, &Record> =
            desired.iter().map(|record| (record.id.as_str(), record)).collect();

        let mut aggregate = CommitOutcome::default();
        for chunk in ids.chunks(chunk_size.max(1)) {
            let outcome = match self.commit_chunk(chunk, &by_id) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(size = chunk.len(), error = %err, "chunk commit failed");
                    CommitOutcome::skipped_chunk(chunk, err.to_string())
                }
            };
            aggregate = aggregate.combine(outcome);
        }
        aggregate
    }

    /// Read the chunk's current remote state, overlay the desired fields,
    /// and submit the merged batch as one bulk write.
    fn commit_chunk(&self, chunk: &[Id], desired: &HashMap<&str, &Record>) -> Result<CommitOutcome> {
        let remote = self.store.get_by_ids(self.spec, chunk)?;
        let remote_by_id: HashMap<&str, &Record> =
            remote.iter().map(|record| (record.id.as_str(), record)).collect();

        let merged: Vec<Record> = chunk
            .iter()
            .filter_map(|id| desired.get(id.as_str()))
            .map(|want| match remote_by_id.get(want.id.as_str()) {
                Some(have) => have.overlay(want),
                None => (*want).clone(),
            })
            .collect();

        let report = self.store.bulk_write(self.spec, &merged)?;
        Ok(CommitOutcome::from_report(chunk, &report))
    }
}
