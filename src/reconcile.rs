//! Reconciliation driver.
//!
//! One pass visits the feed in order. For each comment it classifies the
//! content against the [`Ledger`], calls the extraction gateway only for new
//! and edited comments, journals the decision, and applies it to the
//! in-memory ledger. At the end the snapshot and negative cache are swapped
//! atomically and the journal is deleted.
//!
//! Ids that are in the ledger but not in the feed are never touched, so a
//! partial feed (or `--limit`) can't drop rows.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use timeline_sync_core::gateway::ExtractionGateway;
use timeline_sync_core::ledger::{Classification, Ledger, Outcome};
use timeline_sync_core::models::SourceItem;

use crate::config::Config;
use crate::feed;
use crate::gateway::create_gateway;
use crate::journal::{self, DecisionLog, Journal, JournalEntry};
use crate::progress::{PassProgressEvent, ProgressMode, ProgressReporter};
use crate::snapshot;

/// Counts for one pass. Every visited comment lands in exactly one of the
/// seven outcome buckets, so they add up to `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub retracted: u64,
    pub cached_negative: u64,
    pub confirmed_negative: u64,
    pub deferred: u64,
    /// Stopped early on request.
    pub interrupted: bool,
    /// Comments left unvisited because of the interruption.
    pub unvisited: u64,
}

impl PassSummary {
    fn count(&mut self, classification: Classification, outcome: &Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Inserted(_) => self.new += 1,
            Outcome::Merged(_) => self.updated += 1,
            Outcome::Rejected(_) => self.confirmed_negative += 1,
            Outcome::Deferred => self.deferred += 1,
            Outcome::Carried => match classification {
                Classification::Retracted => self.retracted += 1,
                Classification::CachedNegative => self.cached_negative += 1,
                _ => self.unchanged += 1,
            },
        }
    }
}

/// Run the per-comment loop over `items`, mutating `ledger` in place.
///
/// Gateway errors are logged as warnings and the comment is deferred. Only
/// a failure to write the decision log aborts the loop. `throttle` is the
/// minimum pause between consecutive gateway calls. `stop` is checked
/// before each comment.
pub async fn reconcile_items(
    ledger: &mut Ledger,
    items: &[SourceItem],
    gateway: &dyn ExtractionGateway,
    log: &mut dyn DecisionLog,
    reporter: &dyn ProgressReporter,
    throttle: Duration,
    stop: &AtomicBool,
) -> Result<PassSummary> {
    let mut summary = PassSummary::default();
    let total = items.len() as u64;
    let mut called = false;

    for (idx, item) in items.iter().enumerate() {
        if stop.load(Ordering::SeqCst) {
            summary.interrupted = true;
            summary.unvisited = total - idx as u64;
            break;
        }

        let fingerprint = item.fingerprint();
        let classification = ledger.classify(&item.external_id, &item.content, &fingerprint);

        let outcome = if classification.needs_extraction() {
            if called && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            called = true;
            match gateway.extract(&item.content).await {
                Ok(extraction) => ledger.resolve(item, &fingerprint, extraction),
                Err(e) => {
                    eprintln!(
                        "Warning: extraction failed for {} (deferred): {:#}",
                        item.external_id, e
                    );
                    Outcome::Deferred
                }
            }
        } else {
            Outcome::Carried
        };

        let entry = JournalEntry {
            id: item.external_id.clone(),
            fingerprint,
            outcome,
        };
        log.append(&entry)?;
        ledger.apply(&entry.id, &entry.outcome);
        summary.count(classification, &entry.outcome);

        reporter.report(PassProgressEvent::Item {
            n: idx as u64 + 1,
            total,
            id: entry.id,
            classification,
            outcome: entry.outcome.kind(),
        });
    }

    Ok(summary)
}

/// Classification of every item against the ledger, with no gateway calls.
pub fn classify_items(ledger: &Ledger, items: &[SourceItem]) -> Vec<Classification> {
    items
        .iter()
        .map(|item| ledger.classify(&item.external_id, &item.content, &item.fingerprint()))
        .collect()
}

/// Result of a finalized pass.
#[derive(Debug)]
pub struct PassReport {
    pub summary: PassSummary,
    pub records: usize,
    pub negatives: usize,
    pub backup: Option<PathBuf>,
}

/// A full journaled pass: load, reconcile, swap, delete the journal.
///
/// Refuses to start while a journal from an earlier pass exists. If the
/// snapshot swap fails the journal is kept and named in the error.
pub async fn run_pass(
    config: &Config,
    items: &[SourceItem],
    gateway: &dyn ExtractionGateway,
    reporter: &dyn ProgressReporter,
    stop: &AtomicBool,
) -> Result<PassReport> {
    let journal_path = config.ledger.journal_path();
    journal::ensure_no_leftover(&journal_path)?;

    let mut ledger = snapshot::load_ledger(&config.ledger)?;
    let mut journal = Journal::create(&journal_path)?;

    let throttle = Duration::from_millis(config.extraction.rate_limit_delay_ms);
    let summary = reconcile_items(
        &mut ledger,
        items,
        gateway,
        &mut journal,
        reporter,
        throttle,
        stop,
    )
    .await
    .with_context(|| {
        format!(
            "Pass aborted; run `tsync recover` to apply {}",
            journal_path.display()
        )
    })?;

    let backup = snapshot::save_ledger(&ledger, &config.ledger).with_context(|| {
        format!(
            "Failed to write snapshot; the journal is kept at {} for `tsync recover`",
            journal.path().display()
        )
    })?;
    journal.finish()?;

    Ok(PassReport {
        summary,
        records: ledger.len(),
        negatives: ledger.negatives().len(),
        backup,
    })
}

/// Response to a Ctrl-C during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Stop before the next comment, then save normally.
    Stop,
    /// Already stopping; exit now and leave the journal for `tsync recover`.
    Quit,
}

pub fn on_interrupt(stop: &AtomicBool) -> Interrupt {
    if stop.swap(true, Ordering::SeqCst) {
        Interrupt::Quit
    } else {
        Interrupt::Stop
    }
}

/// Options for `tsync sync`.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub progress: ProgressMode,
}

pub async fn run_sync(config: &Config, feed_path: &Path, opts: &SyncOptions) -> Result<()> {
    let mut items = feed::load_feed(feed_path)?;
    if let Some(limit) = opts.limit {
        items.truncate(limit);
    }
    let feed_name = feed_path.display().to_string();

    if opts.dry_run {
        if config.ledger.journal_path().exists() {
            eprintln!(
                "Warning: unfinished journal at {}; counts ignore it",
                config.ledger.journal_path().display()
            );
        }
        let ledger = snapshot::load_ledger(&config.ledger)?;
        let classes = classify_items(&ledger, &items);
        let count = |c: Classification| classes.iter().filter(|x| **x == c).count();

        println!("sync {} (dry-run)", feed_name);
        println!("  items: {}", items.len());
        for c in Classification::ALL {
            println!("  {}: {}", c, count(c));
        }
        println!(
            "  extraction calls: {}",
            classes.iter().filter(|c| c.needs_extraction()).count()
        );
        println!("ok");
        return Ok(());
    }

    let gateway = create_gateway(&config.extraction)?;
    if !config.extraction.is_enabled() {
        eprintln!("Warning: extraction is disabled; new and edited comments will be deferred");
    }

    let reporter = opts.progress.reporter();
    reporter.report(PassProgressEvent::Started {
        feed: feed_name.clone(),
        total: items.len() as u64,
    });

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let journal_path = config.ledger.journal_path();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                match on_interrupt(&stop) {
                    Interrupt::Stop => eprintln!(
                        "Interrupted; finishing the current comment and saving (Ctrl-C again to quit now)"
                    ),
                    Interrupt::Quit => {
                        eprintln!(
                            "Quitting; run `tsync recover` to apply {}",
                            journal_path.display()
                        );
                        std::process::exit(130);
                    }
                }
            }
        });
    }

    let report = run_pass(config, &items, gateway.as_ref(), reporter.as_ref(), &stop).await?;
    let s = &report.summary;

    println!("sync {}", feed_name);
    println!("  extractor: {}", gateway.name());
    println!("  total: {}", s.total);
    println!("  new: {}", s.new);
    println!("  updated: {}", s.updated);
    println!("  unchanged: {}", s.unchanged);
    println!("  retracted: {}", s.retracted);
    println!("  cached-negative: {}", s.cached_negative);
    println!("  confirmed-negative: {}", s.confirmed_negative);
    println!("  deferred: {}", s.deferred);
    println!("  records: {}", report.records);
    println!("  negative cache: {}", report.negatives);
    if let Some(backup) = &report.backup {
        println!("  backup: {}", backup.display());
    }
    if s.interrupted {
        println!("  interrupted: {} comments not visited", s.unvisited);
    }
    println!("ok");
    Ok(())
}
