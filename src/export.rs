//! Export the ledger as JSON.
//!
//! Produces `{ "records": [...], "negatives": [...] }` with every field in
//! its snapshot form, for spreadsheets and static dashboards that would
//! rather not parse TSV.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use timeline_sync_core::ledger::Ledger;
use timeline_sync_core::models::TimelineRecord;

use crate::config::Config;
use crate::snapshot;

#[derive(Debug, Serialize)]
pub struct ExportData {
    pub records: Vec<ExportRecord>,
    pub negatives: Vec<ExportNegative>,
}

#[derive(Debug, Serialize)]
pub struct ExportRecord {
    pub id: String,
    pub category: String,
    pub method: String,
    pub application_date: String,
    pub biometric_date: String,
    pub approval_date: String,
    pub ceremony_date: String,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportNegative {
    pub id: String,
    pub fingerprint: String,
}

impl From<&TimelineRecord> for ExportRecord {
    fn from(r: &TimelineRecord) -> Self {
        Self {
            id: r.id.clone(),
            category: r.category.to_string(),
            method: r.method.to_string(),
            application_date: r.application_date.to_string(),
            biometric_date: r.biometric_date.to_string(),
            approval_date: r.approval_date.to_string(),
            ceremony_date: r.ceremony_date.to_string(),
            fingerprint: r.fingerprint.as_ref().map(|f| f.to_string()),
        }
    }
}

pub fn export_data(ledger: &Ledger) -> ExportData {
    ExportData {
        records: ledger.records().map(ExportRecord::from).collect(),
        negatives: ledger
            .negatives()
            .iter()
            .map(|(id, fp)| ExportNegative {
                id: id.to_string(),
                fingerprint: fp.to_string(),
            })
            .collect(),
    }
}

/// Export records and negatives as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let ledger = snapshot::load_ledger(&config.ledger)?;
    let data = export_data(&ledger);
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "Exported {} records, {} negatives to {}",
                data.records.len(),
                data.negatives.len(),
                path.display()
            );
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(())
}
