//! Append-only decision journal for a pass in progress.
//!
//! Every decision the driver takes is appended (and flushed) as one line
//! before the next comment is processed. A completed pass deletes the
//! journal after the snapshot swap; an interrupted one leaves it behind for
//! `tsync recover`.
//!
//! Line format (tab-separated, after a `# tsync journal v1` header):
//!
//! ```text
//! <kind>  <id>  <fingerprint>                       carried / deferred / rejected
//! <kind>  <snapshot row (8 columns)>                inserted / merged
//! ```
//!
//! Each line is written with a single `write_all`, so a crash can only
//! leave the final line incomplete (no trailing newline). Readers ignore
//! such a line.

use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use timeline_sync_core::ledger::Outcome;
use timeline_sync_core::models::Fingerprint;

use crate::config::Config;
use crate::snapshot::{self, SchemaVersion};

pub const JOURNAL_HEADER: &str = "# tsync journal v1";

/// One journaled decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: String,
    /// Fingerprint of the comment content the decision was taken for.
    pub fingerprint: Fingerprint,
    pub outcome: Outcome,
}

impl JournalEntry {
    pub fn to_line(&self) -> String {
        match &self.outcome {
            Outcome::Inserted(record) | Outcome::Merged(record) => {
                format!("{}\t{}", self.outcome.kind(), snapshot::format_row(record))
            }
            Outcome::Rejected(fp) => format!("{}\t{}\t{}", self.outcome.kind(), self.id, fp),
            Outcome::Carried | Outcome::Deferred => {
                format!("{}\t{}\t{}", self.outcome.kind(), self.id, self.fingerprint)
            }
        }
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        let Some((kind, rest)) = fields.split_first() else {
            bail!("empty journal line");
        };
        match *kind {
            "inserted" | "merged" => {
                let record = snapshot::parse_row(rest, SchemaVersion::V2)?;
                let Some(fingerprint) = record.fingerprint.clone() else {
                    bail!("journal row for '{}' has no fingerprint", record.id);
                };
                let id = record.id.clone();
                let outcome = if *kind == "inserted" {
                    Outcome::Inserted(record)
                } else {
                    Outcome::Merged(record)
                };
                Ok(Self {
                    id,
                    fingerprint,
                    outcome,
                })
            }
            "carried" | "deferred" | "rejected" => {
                let [id, fp] = rest else {
                    bail!("expected <kind> <id> <fingerprint>");
                };
                let fingerprint: Fingerprint = fp.parse()?;
                let outcome = match *kind {
                    "carried" => Outcome::Carried,
                    "deferred" => Outcome::Deferred,
                    _ => Outcome::Rejected(fingerprint.clone()),
                };
                Ok(Self {
                    id: id.to_string(),
                    fingerprint,
                    outcome,
                })
            }
            other => bail!("unknown journal entry kind: '{}'", other),
        }
    }
}

/// Destination for the driver's decisions.
pub trait DecisionLog {
    fn append(&mut self, entry: &JournalEntry) -> Result<()>;
}

/// In-memory log, used for dry runs and tests.
impl DecisionLog for Vec<JournalEntry> {
    fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}

/// The on-disk journal of the current pass.
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    /// Create a fresh journal. Fails if one already exists, since that
    /// means an earlier pass did not finish.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        ensure_no_leftover(path)?;
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to create journal: {}", path.display()))?;
        file.write_all(format!("{}\n", JOURNAL_HEADER).as_bytes())
            .with_context(|| format!("Failed to write journal: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Called after the snapshot swap succeeded.
    pub fn finish(self) -> Result<()> {
        drop(self.file);
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove journal: {}", self.path.display()))
    }
}

impl DecisionLog for Journal {
    fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let line = format!("{}\n", entry.to_line());
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("Failed to append to journal: {}", self.path.display()))
    }
}

/// Fail if an earlier pass left its journal behind.
pub fn ensure_no_leftover(path: &Path) -> Result<()> {
    if path.exists() {
        bail!(
            "An unfinished journal exists at {}. Run `tsync recover` to apply it, or delete it to discard it.",
            path.display()
        );
    }
    Ok(())
}

/// Parsed journal contents.
#[derive(Debug)]
pub struct JournalReplay {
    pub entries: Vec<JournalEntry>,
    /// True when an incomplete final line was dropped.
    pub truncated: bool,
}

pub fn parse_journal(text: &str, origin: &str) -> Result<JournalReplay> {
    let mut entries = Vec::new();
    let mut truncated = false;

    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        let Some(line) = raw.strip_suffix('\n') else {
            truncated = true;
            break;
        };
        if idx == 0 {
            if line != JOURNAL_HEADER {
                bail!("{}: not a tsync journal", origin);
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let entry = JournalEntry::parse_line(line)
            .with_context(|| format!("{}: line {}", origin, idx + 1))?;
        entries.push(entry);
    }

    Ok(JournalReplay { entries, truncated })
}

pub fn read_journal(path: &Path) -> Result<JournalReplay> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read journal: {}", path.display()))?;
    parse_journal(&text, &path.display().to_string())
}

/// `tsync recover`: replay a leftover journal over the stored ledger.
pub fn run_recover(config: &Config) -> Result<()> {
    let journal_path = config.ledger.journal_path();
    if !journal_path.exists() {
        println!("recover");
        println!("  no unfinished journal at {}", journal_path.display());
        println!("ok");
        return Ok(());
    }

    let mut ledger = snapshot::load_ledger(&config.ledger)?;
    let replay = read_journal(&journal_path)?;

    let mut applied = 0u64;
    for entry in &replay.entries {
        if matches!(entry.outcome, Outcome::Carried | Outcome::Deferred) {
            continue;
        }
        ledger.apply(&entry.id, &entry.outcome);
        applied += 1;
    }

    snapshot::save_ledger(&ledger, &config.ledger).with_context(|| {
        format!(
            "Failed to write snapshot; the journal is kept at {}",
            journal_path.display()
        )
    })?;
    fs::remove_file(&journal_path)
        .with_context(|| format!("Failed to remove journal: {}", journal_path.display()))?;

    println!("recover");
    println!("  journal entries: {}", replay.entries.len());
    println!("  applied: {}", applied);
    if replay.truncated {
        println!("  dropped incomplete final line");
    }
    println!("  records: {}", ledger.len());
    println!("ok");
    Ok(())
}
