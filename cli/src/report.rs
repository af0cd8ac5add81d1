//! CSV change report.
//!
//! Before anything is posted, every record the rule set selected is written
//! to a CSV file: one row per record with its identifier, the parent value,
//! and each recomputed child value. The report is the audit trail of a dry
//! run and the pre-image of a posted one.

use metasync_engine::derive::ReportSink;
use metasync_engine::error::{Error, Result};
use metasync_engine::{Record, RuleSet};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Report sink writing one CSV file per run.
pub struct CsvReport {
    path: PathBuf,
}

impl CsvReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for CsvReport {
    fn save_report(&self, records: &[Record], rule_set: &RuleSet) -> Result<()> {
        write_csv(&self.path, records, rule_set)
            .map_err(|e| Error::Report(format!("{}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), rows = records.len(), "report written");
        Ok(())
    }
}

fn write_csv(path: &Path, records: &[Record], rule_set: &RuleSet) -> std::io::Result<()> {
    let mut file = File::create(path)?;

    let mut header = vec!["id".to_string(), rule_set.parent_field.clone()];
    header.extend(rule_set.rules.iter().map(|r| r.child_field.clone()));
    writeln!(file, "{}", to_csv_row(&header))?;

    for record in records {
        let mut row = vec![record.id.clone(), field_text(record, &rule_set.parent_field)];
        row.extend(
            rule_set
                .rules
                .iter()
                .map(|rule| field_text(record, &rule.child_field)),
        );
        writeln!(file, "{}", to_csv_row(&row))?;
    }
    Ok(())
}

/// Render a field value as report text. Absent fields render empty;
/// non-string values fall back to their JSON form.
fn field_text(record: &Record, field: &str) -> String {
    match record.get(field) {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_csv_row(values: &[String]) -> String {
    values
        .iter()
        .map(|v| csv_escape(v))
        .collect::<Vec<_>>()
        .join(",")
}

fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
