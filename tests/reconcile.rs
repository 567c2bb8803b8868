//! Library-level tests for the reconciliation driver, using a scripted
//! in-memory gateway and a real snapshot in a temp directory.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use timeline_sync::config::{self, Config};
use timeline_sync::journal::{self, Journal};
use timeline_sync::progress::NoProgress;
use timeline_sync::reconcile::{reconcile_items, run_pass, PassReport};
use timeline_sync::snapshot;
use timeline_sync_core::gateway::{Candidate, Extraction, ExtractionGateway};
use timeline_sync_core::models::SourceItem;

/// Answers by exact content; unknown content fails like a transient error.
#[derive(Default)]
struct ScriptedGateway {
    responses: HashMap<String, Extraction>,
    calls: Mutex<Vec<String>>,
    stop_after_call: Option<Arc<AtomicBool>>,
}

impl ScriptedGateway {
    fn answer(mut self, content: &str, extraction: Extraction) -> Self {
        self.responses.insert(content.to_string(), extraction);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, content: &str) -> Result<Extraction> {
        self.calls.lock().unwrap().push(content.to_string());
        if let Some(stop) = &self.stop_after_call {
            stop.store(true, Ordering::SeqCst);
        }
        match self.responses.get(content) {
            Some(extraction) => Ok(extraction.clone()),
            None => bail!("scripted failure"),
        }
    }
}

fn timeline(dates: [&str; 4]) -> Extraction {
    Extraction::Timeline(Candidate {
        category: Some("ILR".to_string()),
        method: Some("Online".to_string()),
        application_date: Some(dates[0].to_string()),
        biometric_date: Some(dates[1].to_string()),
        approval_date: Some(dates[2].to_string()),
        ceremony_date: Some(dates[3].to_string()),
        skip: false,
    })
}

fn config_in(tmp: &TempDir) -> Config {
    let mut cfg = Config::minimal();
    cfg.ledger.snapshot = tmp.path().join("timelines.tsv");
    cfg.ledger.keep_backups = false;
    cfg.extraction.rate_limit_delay_ms = 0;
    cfg
}

async fn pass(cfg: &Config, items: &[SourceItem], gateway: &ScriptedGateway) -> PassReport {
    run_pass(cfg, items, gateway, &NoProgress, &AtomicBool::new(false))
        .await
        .unwrap()
}

fn snapshot_text(cfg: &Config) -> String {
    fs::read_to_string(&cfg.ledger.snapshot).unwrap()
}

const C1_FIRST: &str = "Got ILR, applied 01/02/2025, biometrics TBC";
const C1_EDITED: &str = "Got ILR, applied 01/02/2025, biometrics done 10/02/2025";

#[tokio::test]
async fn test_first_extraction_writes_row() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let item = SourceItem::new("c1", C1_FIRST);
    let gateway =
        ScriptedGateway::default().answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]));

    let report = pass(&cfg, &[item.clone()], &gateway).await;
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.summary.total, 1);

    let text = snapshot_text(&cfg);
    let rows: Vec<&str> = text.lines().collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1],
        format!(
            "c1\tILR\tOnline\t2025-02-01\tN/A\tN/A\tN/A\t{}",
            item.fingerprint()
        )
    );
    assert!(!cfg.ledger.journal_path().exists());
}

#[tokio::test]
async fn test_edit_keeps_known_dates_and_fills_gaps() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer(C1_EDITED, timeline(["N/A", "2025-02-10", "N/A", "N/A"]));

    pass(&cfg, &[SourceItem::new("c1", C1_FIRST)], &gateway).await;
    let edited = SourceItem::new("c1", C1_EDITED);
    let report = pass(&cfg, &[edited.clone()], &gateway).await;
    assert_eq!(report.summary.updated, 1);

    let ledger = snapshot::load_ledger(&cfg.ledger).unwrap();
    let record = ledger.record("c1").unwrap();
    assert_eq!(record.application_date.to_string(), "2025-02-01");
    assert_eq!(record.biometric_date.to_string(), "2025-02-10");
    assert_eq!(record.fingerprint, Some(edited.fingerprint()));
}

#[tokio::test]
async fn test_deleted_comment_is_carried_without_a_call() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let first =
        ScriptedGateway::default().answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]));
    pass(&cfg, &[SourceItem::new("c1", C1_FIRST)], &first).await;
    let before = snapshot_text(&cfg);

    let gateway = ScriptedGateway::default();
    let report = pass(&cfg, &[SourceItem::new("c1", "[deleted]")], &gateway).await;
    assert_eq!(report.summary.retracted, 1);
    assert!(gateway.calls().is_empty());
    assert_eq!(snapshot_text(&cfg), before);
}

#[tokio::test]
async fn test_second_pass_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let items = vec![
        SourceItem::new("t1_b", "EUSS, applied 2024-11-02"),
        SourceItem::new("t1_a", C1_FIRST),
        SourceItem::new("t1_q", "how long did yours take?"),
    ];
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer(
            "EUSS, applied 2024-11-02",
            timeline(["2024-11-02", "N/A", "N/A", "N/A"]),
        )
        .answer("how long did yours take?", Extraction::NotTimeline);

    pass(&cfg, &items, &gateway).await;
    let first = snapshot_text(&cfg);
    let first_neg = fs::read_to_string(cfg.ledger.negative_cache_path()).unwrap();

    let again = ScriptedGateway::default();
    let report = pass(&cfg, &items, &again).await;
    assert!(again.calls().is_empty());
    assert_eq!(report.summary.unchanged, 2);
    assert_eq!(report.summary.cached_negative, 1);
    assert_eq!(snapshot_text(&cfg), first);
    assert_eq!(
        fs::read_to_string(cfg.ledger.negative_cache_path()).unwrap(),
        first_neg
    );

    // Rows are sorted by id regardless of feed order.
    let ids: Vec<String> = first
        .lines()
        .skip(1)
        .map(|l| l.split('\t').next().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["t1_a", "t1_b"]);
}

#[tokio::test]
async fn test_negative_cache_short_circuits() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let question = SourceItem::new("c2", "anyone heard back yet?");
    let gateway =
        ScriptedGateway::default().answer(&question.content, Extraction::NotTimeline);

    let report = pass(&cfg, &[question.clone()], &gateway).await;
    assert_eq!(report.summary.confirmed_negative, 1);
    assert_eq!(report.records, 0);
    assert_eq!(report.negatives, 1);

    let again = ScriptedGateway::default();
    let report = pass(&cfg, &[question], &again).await;
    assert!(again.calls().is_empty());
    assert_eq!(report.summary.cached_negative, 1);
    assert!(!snapshot_text(&cfg).contains("c2"));
}

#[tokio::test]
async fn test_rejected_edit_drops_the_row() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer("wrong thread, sorry", Extraction::NotTimeline);

    pass(&cfg, &[SourceItem::new("c1", C1_FIRST)], &gateway).await;
    let report = pass(&cfg, &[SourceItem::new("c1", "wrong thread, sorry")], &gateway).await;
    assert_eq!(report.summary.confirmed_negative, 1);

    let ledger = snapshot::load_ledger(&cfg.ledger).unwrap();
    assert!(ledger.record("c1").is_none());
    assert!(ledger.negatives().get("c1").is_some());
}

#[tokio::test]
async fn test_unseen_ids_are_retained() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer("BNO route, applied 2025-03-01", timeline(["2025-03-01", "N/A", "N/A", "N/A"]));

    pass(
        &cfg,
        &[
            SourceItem::new("a", C1_FIRST),
            SourceItem::new("b", "BNO route, applied 2025-03-01"),
        ],
        &gateway,
    )
    .await;
    let before = snapshot::load_ledger(&cfg.ledger).unwrap();

    pass(&cfg, &[SourceItem::new("a", C1_FIRST)], &gateway).await;
    let after = snapshot::load_ledger(&cfg.ledger).unwrap();
    assert_eq!(after.record("b"), before.record("b"));
    assert_eq!(after.record("b").unwrap().category.to_string(), "BNO");
}

#[tokio::test]
async fn test_failures_are_deferred_and_retried() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let first =
        ScriptedGateway::default().answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]));
    pass(&cfg, &[SourceItem::new("c1", C1_FIRST)], &first).await;
    let before = snapshot_text(&cfg);

    // Every call fails: the edited row and a brand-new comment are deferred.
    let failing = ScriptedGateway::default();
    let items = vec![
        SourceItem::new("c1", C1_EDITED),
        SourceItem::new("c3", "Form T, applied 2025-04-01"),
    ];
    let report = pass(&cfg, &items, &failing).await;
    assert_eq!(report.summary.deferred, 2);
    assert_eq!(failing.calls().len(), 2);
    assert_eq!(snapshot_text(&cfg), before);
    assert_eq!(report.negatives, 0);

    // The next pass retries both.
    let working = ScriptedGateway::default()
        .answer(C1_EDITED, timeline(["N/A", "2025-02-10", "N/A", "N/A"]))
        .answer("Form T, applied 2025-04-01", timeline(["2025-04-01", "N/A", "N/A", "N/A"]));
    let report = pass(&cfg, &items, &working).await;
    assert_eq!(report.summary.updated, 1);
    assert_eq!(report.summary.new, 1);
    assert_eq!(report.records, 2);
}

#[tokio::test]
async fn test_summary_counts_add_up() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer("not mine", Extraction::NotTimeline);
    let items = vec![
        SourceItem::new("a", C1_FIRST),
        SourceItem::new("b", "not mine"),
        SourceItem::new("c", "[removed]"),
        SourceItem::new("d", "   "),
        SourceItem::new("e", "unscripted, fails"),
    ];
    let report = pass(&cfg, &items, &gateway).await;
    let s = &report.summary;
    assert_eq!(s.total, 5);
    assert_eq!(
        s.new
            + s.updated
            + s.unchanged
            + s.retracted
            + s.cached_negative
            + s.confirmed_negative
            + s.deferred,
        s.total
    );
    assert_eq!(s.retracted, 2);
    assert_eq!(s.deferred, 1);
}

#[tokio::test]
async fn test_interrupted_pass_saves_decided_items() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let stop = Arc::new(AtomicBool::new(false));
    let gateway = ScriptedGateway {
        stop_after_call: Some(stop.clone()),
        ..Default::default()
    }
    .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]));

    let items = vec![
        SourceItem::new("a", C1_FIRST),
        SourceItem::new("b", "second"),
        SourceItem::new("c", "third"),
    ];
    let report = run_pass(&cfg, &items, &gateway, &NoProgress, &stop)
        .await
        .unwrap();
    assert!(report.summary.interrupted);
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.unvisited, 2);
    assert_eq!(report.records, 1);
    assert_eq!(gateway.calls().len(), 1);
    assert!(!cfg.ledger.journal_path().exists());
}

#[tokio::test]
async fn test_leftover_journal_blocks_sync() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    fs::write(cfg.ledger.journal_path(), "# tsync journal v1\n").unwrap();

    let gateway = ScriptedGateway::default();
    let err = run_pass(
        &cfg,
        &[SourceItem::new("a", C1_FIRST)],
        &gateway,
        &NoProgress,
        &AtomicBool::new(false),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("tsync recover"));
    assert!(gateway.calls().is_empty());
    assert!(!cfg.ledger.snapshot.exists());
}

#[tokio::test]
async fn test_snapshot_write_failure_keeps_prior_snapshot_and_journal() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer("Got EUSS", timeline(["2024-10-01", "N/A", "N/A", "N/A"]));

    pass(&cfg, &[SourceItem::new("c1", C1_FIRST)], &gateway).await;
    let prior = snapshot_text(&cfg);

    // A directory where the temp file should go makes the swap fail.
    let tmp_file = config::with_suffix(&cfg.ledger.snapshot, ".tmp");
    fs::create_dir(&tmp_file).unwrap();

    let items = [
        SourceItem::new("c1", C1_FIRST),
        SourceItem::new("c2", "Got EUSS"),
    ];
    let err = run_pass(&cfg, &items, &gateway, &NoProgress, &AtomicBool::new(false))
        .await
        .unwrap_err();
    let journal_path = cfg.ledger.journal_path();
    assert!(err
        .to_string()
        .contains(&journal_path.display().to_string()));
    assert_eq!(snapshot_text(&cfg), prior);
    assert!(journal_path.exists());

    fs::remove_dir(&tmp_file).unwrap();
    journal::run_recover(&cfg).unwrap();
    let recovered = snapshot::load_ledger(&cfg.ledger).unwrap();
    assert!(recovered.record("c2").is_some());
    assert!(!journal_path.exists());
}

#[tokio::test]
async fn test_recover_applies_an_abandoned_journal() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_in(&tmp);
    let gateway = ScriptedGateway::default()
        .answer(C1_FIRST, timeline(["2025-02-01", "N/A", "N/A", "N/A"]))
        .answer("just asking", Extraction::NotTimeline);

    // Reconcile into a journal but never swap the snapshot, as if killed.
    let mut ledger = snapshot::load_ledger(&cfg.ledger).unwrap();
    let mut journal = Journal::create(&cfg.ledger.journal_path()).unwrap();
    reconcile_items(
        &mut ledger,
        &[
            SourceItem::new("a", C1_FIRST),
            SourceItem::new("q", "just asking"),
            SourceItem::new("z", "[deleted]"),
        ],
        &gateway,
        &mut journal,
        &NoProgress,
        Duration::ZERO,
        &AtomicBool::new(false),
    )
    .await
    .unwrap();
    drop(journal);
    assert!(!cfg.ledger.snapshot.exists());

    let replay = journal::read_journal(&cfg.ledger.journal_path()).unwrap();
    assert_eq!(replay.entries.len(), 3);

    journal::run_recover(&cfg).unwrap();
    assert!(!cfg.ledger.journal_path().exists());
    let recovered = snapshot::load_ledger(&cfg.ledger).unwrap();
    assert_eq!(recovered, ledger);
    assert!(recovered.record("a").is_some());
    assert!(recovered.negatives().get("q").is_some());
}
