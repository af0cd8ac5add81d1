//! The derived-values use case.
//!
//! Ties the core pieces together for one container stage: fetch every event
//! below a root org unit, run rule propagation over them, hand the changed
//! records to a report sink, and — when posting is enabled — commit them in
//! chunks and optionally retire the parent field from the stage schema.

use crate::commit::{ChunkedCommitter, CommitOutcome, DATA_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::paginate::fetch_all;
use crate::propagate::{propagate, strip_parent_field, RuleSet};
use crate::record::Record;
use crate::store::{CollectionSpec, RemoteStore, StageStore};
use crate::tracker::TRACKER_PAGE_SIZE;
use crate::Id;
use serde::Serialize;

/// Sink for the pre-commit change report.
///
/// The report is written before any post happens, so a dry run leaves an
/// inspectable artifact behind.
pub trait ReportSink {
    fn save_report(&self, records: &[Record], rule_set: &RuleSet) -> Result<()>;
}

/// Scope and mode of one derived-values run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriveOptions {
    /// Container (program) holding the events
    pub container: Id,
    /// Stage whose schema defines the parent field
    pub stage: Id,
    /// Root org unit; events of all descendants are in scope
    pub root_org_unit: Id,
    /// When false, compute and report only — write nothing
    pub post: bool,
}

/// Summary handed back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveSummary {
    /// Events fetched and scanned
    pub scanned: usize,
    /// Records the rule set selected and recomputed
    pub changed: usize,
    /// Commit outcome, present only when posting was enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitOutcome>,
    /// Whether the parent field was stripped from the stage schema
    pub stage_stripped: bool,
}

/// One derived-values run over a store and a report sink.
pub struct DeriveRun<'a, S, R>
where
    S: RemoteStore + StageStore + ?Sized,
    R: ReportSink + ?Sized,
{
    store: &'a S,
    report: &'a R,
}

impl<'a, S, R> DeriveRun<'a, S, R>
where
    S: RemoteStore + StageStore + ?Sized,
    R: ReportSink + ?Sized,
{
    pub fn new(store: &'a S, report: &'a R) -> Self {
        Self { store, report }
    }

    /// Execute the run.
    ///
    /// The rule set is validated up front — duplicate child fields, and a
    /// parent field no fetched record carries, fail here rather than
    /// record-by-record.
    pub fn execute(&self, options: &DeriveOptions, rule_set: &RuleSet) -> Result<DeriveSummary> {
        rule_set.validate()?;

        let stage = self.store.get_stage(&options.stage)?;
        let spec = CollectionSpec::stage_events(&options.container, &stage.id, &options.root_org_unit);

        let events = fetch_all(self.store, &spec, TRACKER_PAGE_SIZE)?;
        tracing::debug!(total = events.len(), "events fetched");
        rule_set.validate_against(&events)?;

        let changed = propagate(&events, rule_set)?;
        tracing::debug!(count = changed.len(), "events to update");

        self.report.save_report(&changed, rule_set)?;

        let mut summary = DeriveSummary {
            scanned: events.len(),
            changed: changed.len(),
            commit: None,
            stage_stripped: false,
        };
        if !options.post {
            return Ok(summary);
        }

        tracing::debug!("updating events");
        let committer = ChunkedCommitter::new(self.store, &spec);
        summary.commit = Some(committer.commit_all(&changed, DATA_CHUNK_SIZE));

        if rule_set.remove_parent {
            tracing::debug!(
                field = %rule_set.parent_field,
                stage = %stage.id,
                "removing parent field from stage schema"
            );
            let stripped = strip_parent_field(&stage, &rule_set.parent_field);
            let report = self.store.save_stage(&stripped)?;
            if !report.is_ok() {
                return Err(Error::Write(report.error_message()));
            }
            summary.stage_stripped = true;
        }

        Ok(summary)
    }
}
