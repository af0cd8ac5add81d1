//! # Metasync Engine
//!
//! The synchronization core for bulk record exchange with a paginated,
//! rate-sensitive remote metadata store.
//!
//! This crate contains the orchestration logic only. The remote store is a
//! capability expressed as traits ([`RemoteStore`], [`TrackerStore`],
//! [`StageStore`]); transports, files and credentials live in the caller.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine has no knowledge of HTTP, files, or platform
//! - **Sequential**: one outstanding remote request at a time, so every
//!   read-modify-merge step observes the previous write
//! - **Deterministic**: reductions and merges are pure folds over snapshots
//! - **Testable**: a fake store implementing the traits is all a test needs
//!
//! ## Core Concepts
//!
//! ### Pagination
//!
//! [`fetch_all`] drives page requests against a collection endpoint until
//! the reported cursor says the last page has been fetched, and returns the
//! concatenation of all pages. [`Pages`] exposes the same traversal as a
//! lazy iterator.
//!
//! ### Chunked commits
//!
//! [`ChunkedCommitter`] partitions the desired records into bounded chunks
//! and, per chunk, reads the remote's current representation, overlays the
//! desired fields onto it, and submits the merged batch as one bulk write.
//! Per-chunk reports are reduced into a single [`CommitOutcome`]; a failed
//! chunk is recorded as fully skipped and does not stop its siblings.
//!
//! ### Field propagation
//!
//! [`propagate`] derives dependent child fields from a parent field
//! according to a [`RuleSet`] of condition/substitution pairs. Records
//! without the parent field are excluded; non-matching conditions clear the
//! child to the empty string so a re-run never accumulates stale values.
//!
//! ### Tracker pipeline
//!
//! [`TrackerPipeline`] exports and imports a multi-entity bundle (metadata
//! categories plus events, enrollments and tracked entities) keyed by
//! container ids. Imports are fail-fast: tracker data carries referential
//! dependencies, so a rejected chunk halts the run.

pub mod commit;
pub mod derive;
pub mod error;
pub mod paginate;
pub mod propagate;
pub mod record;
pub mod store;
pub mod tracker;

// Re-export main types at crate root
pub use commit::{ChunkedCommitter, CommitOutcome, DATA_CHUNK_SIZE, METADATA_CHUNK_SIZE};
pub use derive::{DeriveOptions, DeriveRun, DeriveSummary, ReportSink};
pub use error::Error;
pub use paginate::{fetch_all, Pages};
pub use propagate::{
    propagate, strip_parent_field, FieldRef, FieldRule, RuleSet, StageField, StageSchema,
};
pub use record::Record;
pub use store::{
    CollectionSpec, MetadataBundle, OrgUnitMode, Page, PageCursor, RemoteStore, StageStore,
    TrackerPayload, TrackerStore, WriteReport, WriteStatus,
};
pub use tracker::{
    merge_bundles, TrackerData, TrackerExport, TrackerPipeline, EVENT_IMPORT_CHUNK_SIZE,
    TRACKER_PAGE_SIZE,
};

/// Type aliases for clarity
pub type Id = String;
pub type FieldId = String;
pub type CategoryKey = String;
pub type PageNumber = u32;
