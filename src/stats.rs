//! Ledger statistics.
//!
//! `tsync stats` summarises the stored snapshot: record totals, a
//! per-category and per-method breakdown, how many rows know each date,
//! and the size of the negative cache.

use anyhow::Result;
use std::collections::BTreeMap;
use std::time::SystemTime;

use timeline_sync_core::ledger::Ledger;
use timeline_sync_core::models::Method;

use crate::config::Config;
use crate::snapshot;

pub const DATE_FIELDS: [&str; 4] = ["application", "biometric", "approval", "ceremony"];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub records: usize,
    pub negatives: usize,
    /// Rows without a fingerprint (legacy rows awaiting re-extraction).
    pub unfingerprinted: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_method: BTreeMap<&'static str, usize>,
    /// Known-date count per entry of [`DATE_FIELDS`].
    pub known_dates: [usize; 4],
}

impl LedgerStats {
    pub fn compute(ledger: &Ledger) -> Self {
        let mut stats = LedgerStats {
            records: ledger.len(),
            negatives: ledger.negatives().len(),
            ..Default::default()
        };
        for method in Method::ALL {
            stats.by_method.insert(method.as_str(), 0);
        }
        for record in ledger.records() {
            *stats
                .by_category
                .entry(record.category.to_string())
                .or_insert(0) += 1;
            *stats.by_method.entry(record.method.as_str()).or_insert(0) += 1;
            for (slot, date) in stats.known_dates.iter_mut().zip(record.dates()) {
                if date.is_known() {
                    *slot += 1;
                }
            }
            if record.fingerprint.is_none() {
                stats.unfingerprinted += 1;
            }
        }
        stats
    }
}

pub fn run_stats(config: &Config) -> Result<()> {
    let ledger = snapshot::load_ledger(&config.ledger)?;
    let stats = LedgerStats::compute(&ledger);

    let meta = std::fs::metadata(&config.ledger.snapshot).ok();
    let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
    let modified = meta
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| format_ts_relative(d.as_secs() as i64))
        .unwrap_or_else(|| "never".to_string());

    println!("Timeline Sync — Ledger Stats");
    println!("============================");
    println!();
    println!("  Snapshot:    {}", config.ledger.snapshot.display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Written:     {}", modified);
    println!();
    println!("  Records:     {}", stats.records);
    println!("  Negatives:   {}", stats.negatives);
    if stats.unfingerprinted > 0 {
        println!("  Legacy rows: {} (re-extracted on next sync)", stats.unfingerprinted);
    }

    if !stats.by_category.is_empty() {
        println!();
        println!("  By category:");
        println!("  {:<36} {:>6}", "CATEGORY", "ROWS");
        println!("  {}", "-".repeat(43));
        let mut rows: Vec<_> = stats.by_category.iter().collect();
        rows.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in rows {
            println!("  {:<36} {:>6}", category, count);
        }
    }

    println!();
    println!("  By method:");
    for (method, count) in &stats.by_method {
        println!("  {:<36} {:>6}", method, count);
    }

    println!();
    println!("  Known dates:");
    for (name, count) in DATE_FIELDS.iter().zip(stats.known_dates) {
        println!(
            "  {:<36} {:>6}   {}%",
            name,
            count,
            if stats.records > 0 {
                count * 100 / stats.records
            } else {
                0
            }
        );
    }
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
