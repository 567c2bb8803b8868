//! Durable TSV snapshot and negative-cache files.
//!
//! The snapshot is one header line plus one row per [`TimelineRecord`],
//! sorted by id. Two schema versions are recognised by their header:
//!
//! | Version | Columns |
//! |---------|---------|
//! | v1 (legacy) | `Comment ID` + six timeline fields |
//! | v2 (current) | v1 + `Body Hash` |
//!
//! v1 rows are upgraded on load with no fingerprint, so the next pass
//! re-extracts and merges them. Any other header is rejected. Writes always
//! produce v2.
//!
//! The negative cache is `id<TAB>fingerprint` per line, no header.
//!
//! Both files are replaced atomically: written to `<path>.tmp`, synced,
//! then renamed over the target.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use timeline_sync_core::ledger::{Ledger, NegativeCache};
use timeline_sync_core::models::{Fingerprint, TimelineRecord};

use crate::config::{with_suffix, LedgerConfig};

pub const SNAPSHOT_COLUMNS: [&str; 8] = [
    "Comment ID",
    "Eligibility",
    "Application Method",
    "Application Date",
    "Biometric Date",
    "Approval Date",
    "Ceremony Date",
    "Body Hash",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    pub fn columns(self) -> usize {
        match self {
            SchemaVersion::V1 => 7,
            SchemaVersion::V2 => 8,
        }
    }

    pub fn detect(header: &str) -> Result<Self> {
        let names: Vec<&str> = header.split('\t').collect();
        let version = match names.len() {
            7 => SchemaVersion::V1,
            8 => SchemaVersion::V2,
            n => bail!(
                "unsupported snapshot header: {} columns (expected 7 for v1 or 8 for v2)",
                n
            ),
        };
        for (got, want) in names.iter().zip(SNAPSHOT_COLUMNS.iter()) {
            if got != want {
                bail!(
                    "unsupported snapshot header: column '{}' where '{}' was expected",
                    got,
                    want
                );
            }
        }
        Ok(version)
    }
}

pub fn snapshot_header() -> String {
    SNAPSHOT_COLUMNS.join("\t")
}

/// One snapshot row (no trailing newline). Also used by the journal.
pub fn format_row(record: &TimelineRecord) -> String {
    let fingerprint = record
        .fingerprint
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_default();
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        record.id,
        record.category,
        record.method,
        record.application_date,
        record.biometric_date,
        record.approval_date,
        record.ceremony_date,
        fingerprint
    )
}

/// Parse the fields of one row under `version`.
pub fn parse_row(fields: &[&str], version: SchemaVersion) -> Result<TimelineRecord> {
    if fields.len() != version.columns() {
        bail!(
            "expected {} columns, found {}",
            version.columns(),
            fields.len()
        );
    }
    let id = fields[0];
    if id.is_empty() {
        bail!("empty Comment ID");
    }
    let fingerprint = match version {
        SchemaVersion::V1 => None,
        SchemaVersion::V2 if fields[7].is_empty() => None,
        SchemaVersion::V2 => Some(fields[7].parse::<Fingerprint>()?),
    };
    Ok(TimelineRecord {
        id: id.to_string(),
        category: fields[1].parse()?,
        method: fields[2].parse()?,
        application_date: fields[3].parse()?,
        biometric_date: fields[4].parse()?,
        approval_date: fields[5].parse()?,
        ceremony_date: fields[6].parse()?,
        fingerprint,
    })
}

/// Parse snapshot text. `origin` is used in error messages.
///
/// An empty file is an empty snapshot.
pub fn parse_snapshot(text: &str, origin: &str) -> Result<(SchemaVersion, Vec<TimelineRecord>)> {
    let mut lines = text.lines().enumerate();
    let Some((_, header)) = lines.next() else {
        return Ok((SchemaVersion::V2, Vec::new()));
    };
    let version =
        SchemaVersion::detect(header.trim_end_matches('\r')).with_context(|| origin.to_string())?;

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let record = parse_row(&fields, version)
            .with_context(|| format!("{}: line {}", origin, idx + 1))?;
        records.push(record);
    }
    Ok((version, records))
}

pub fn render_snapshot<'a>(records: impl IntoIterator<Item = &'a TimelineRecord>) -> String {
    let mut out = snapshot_header();
    out.push('\n');
    for record in records {
        out.push_str(&format_row(record));
        out.push('\n');
    }
    out
}

pub fn parse_negative_cache(text: &str, origin: &str) -> Result<NegativeCache> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some((id, fp)) = line.split_once('\t') else {
            bail!("{}: line {}: expected id<TAB>fingerprint", origin, idx + 1);
        };
        if id.is_empty() {
            bail!("{}: line {}: empty id", origin, idx + 1);
        }
        let fp: Fingerprint = fp
            .parse()
            .with_context(|| format!("{}: line {}", origin, idx + 1))?;
        entries.push((id.to_string(), fp));
    }
    Ok(entries.into_iter().collect())
}

pub fn render_negative_cache(cache: &NegativeCache) -> String {
    let mut out = String::new();
    for (id, fp) in cache.iter() {
        out.push_str(id);
        out.push('\t');
        out.push_str(fp.as_str());
        out.push('\n');
    }
    out
}

/// Read a snapshot file. A missing file is an empty snapshot.
pub fn read_snapshot(path: &Path) -> Result<Vec<TimelineRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let (version, records) = parse_snapshot(&text, &path.display().to_string())?;
    if version == SchemaVersion::V1 && !records.is_empty() {
        eprintln!(
            "Warning: {} uses the legacy v1 schema; {} rows will be re-extracted on the next sync",
            path.display(),
            records.len()
        );
    }
    Ok(records)
}

/// Load the snapshot and negative cache into a [`Ledger`].
pub fn load_ledger(config: &LedgerConfig) -> Result<Ledger> {
    let records = read_snapshot(&config.snapshot)?;

    let neg_path = config.negative_cache_path();
    let negatives = if neg_path.exists() {
        let text = fs::read_to_string(&neg_path)
            .with_context(|| format!("Failed to read negative cache: {}", neg_path.display()))?;
        parse_negative_cache(&text, &neg_path.display().to_string())?
    } else {
        NegativeCache::new()
    };

    Ledger::from_parts(records, negatives)
        .with_context(|| format!("Invalid snapshot: {}", config.snapshot.display()))
}

/// Atomically replace the snapshot and negative cache with the ledger's
/// state, keeping a timestamped backup of the prior snapshot if configured.
///
/// Returns the backup path, if one was written.
pub fn save_ledger(ledger: &Ledger, config: &LedgerConfig) -> Result<Option<PathBuf>> {
    let backup = if config.keep_backups {
        let backup = backup_file(&config.snapshot)?;
        prune_backups(&config.snapshot, config.max_backups)?;
        backup
    } else {
        None
    };
    write_atomic(&config.snapshot, &render_snapshot(ledger.records()))?;
    write_atomic(
        &config.negative_cache_path(),
        &render_negative_cache(ledger.negatives()),
    )?;
    Ok(backup)
}

/// Write `contents` to `<path>.tmp`, fsync it, then rename over `path`.
///
/// If anything fails before the rename, `path` is left untouched.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let tmp = with_suffix(path, ".tmp");
    {
        let mut file = fs::File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Copy `path` to `<path>.backup.<YYYYmmdd_HHMMSS>` if it exists.
pub fn backup_file(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let backup = with_suffix(path, &format!(".backup.{}", stamp));
    fs::copy(path, &backup).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    Ok(Some(backup))
}

/// Delete the oldest `<path>.backup.*` files so at most `keep` remain.
/// `keep == 0` disables pruning. Returns the deleted paths.
pub fn prune_backups(path: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
        return Ok(Vec::new());
    };
    let prefix = format!("{}.backup.", name);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut backups = Vec::new();
    for entry in
        fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            backups.push(entry.path());
        }
    }
    // Timestamps are zero-padded, so name order is age order.
    backups.sort();

    let excess = backups.len().saturating_sub(keep);
    let removed: Vec<PathBuf> = backups.into_iter().take(excess).collect();
    for old in &removed {
        fs::remove_file(old)
            .with_context(|| format!("Failed to remove old backup: {}", old.display()))?;
    }
    Ok(removed)
}

/// `tsync init`: create an empty snapshot and negative cache. Existing
/// files are validated and left alone.
pub fn run_init(config: &LedgerConfig) -> Result<()> {
    if config.snapshot.exists() {
        let ledger = load_ledger(config)?;
        println!(
            "Snapshot already exists at {} ({} records).",
            config.snapshot.display(),
            ledger.len()
        );
        return Ok(());
    }

    write_atomic(&config.snapshot, &render_snapshot(std::iter::empty::<&TimelineRecord>()))?;
    let neg_path = config.negative_cache_path();
    if !neg_path.exists() {
        write_atomic(&neg_path, "")?;
    }
    println!("Snapshot initialized at {}.", config.snapshot.display());
    Ok(())
}
