//! Curated edits.
//!
//! A curated file is a snapshot (v1 or v2) that somebody corrected by hand,
//! typically after exporting to a spreadsheet. `tsync apply-edits` lays it
//! over the stored ledger: for every id present in both, the curated
//! category and method win, and curated dates win where known. Stored
//! fingerprints are kept, so curated rows are not re-extracted until their
//! comment changes again. Ids that only exist in the curated file are
//! ignored.

use anyhow::{Context, Result};
use std::path::Path;

use timeline_sync_core::ledger::Ledger;
use timeline_sync_core::models::TimelineRecord;

use crate::config::Config;
use crate::journal;
use crate::snapshot;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EditsSummary {
    pub curated: usize,
    pub matched: usize,
    pub changed: usize,
    pub unknown: usize,
}

pub fn apply_curated(ledger: &mut Ledger, curated: &[TimelineRecord]) -> EditsSummary {
    let mut summary = EditsSummary {
        curated: curated.len(),
        ..Default::default()
    };
    for row in curated {
        let Some(current) = ledger.record(&row.id) else {
            summary.unknown += 1;
            continue;
        };
        summary.matched += 1;
        let updated = current.overlay(row);
        if &updated != current {
            ledger.replace(updated);
            summary.changed += 1;
        }
    }
    summary
}

pub fn run_apply_edits(config: &Config, curated_path: &Path) -> Result<()> {
    journal::ensure_no_leftover(&config.ledger.journal_path())?;

    let text = std::fs::read_to_string(curated_path)
        .with_context(|| format!("Failed to read curated file: {}", curated_path.display()))?;
    let (_, curated) = snapshot::parse_snapshot(&text, &curated_path.display().to_string())?;

    let mut ledger = snapshot::load_ledger(&config.ledger)?;
    let summary = apply_curated(&mut ledger, &curated);

    let backup = if summary.changed > 0 {
        snapshot::save_ledger(&ledger, &config.ledger)?
    } else {
        None
    };

    println!("apply-edits {}", curated_path.display());
    println!("  curated rows: {}", summary.curated);
    println!("  matched: {}", summary.matched);
    println!("  changed: {}", summary.changed);
    println!("  not in ledger: {}", summary.unknown);
    if let Some(backup) = backup {
        println!("  backup: {}", backup.display());
    }
    println!("ok");
    Ok(())
}
