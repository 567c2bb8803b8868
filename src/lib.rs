//! # Timeline Sync
//!
//! Incremental extraction of citizenship-application timelines from a
//! comment thread, reconciled into a durable TSV snapshot across runs.
//!
//! Each run visits the thread's comments in order. Comments whose content
//! is unchanged since the last run, that were deleted, or that the extractor
//! already rejected are carried without an extraction call. New and edited
//! comments are extracted and merged into the stored row, keeping every
//! date that was already known.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Reddit      │──▶│ Ledger       │──▶│ Extraction │──▶│ Journal +    │
//! │ feed (JSON) │   │ classify     │   │ gateway    │   │ atomic TSV   │
//! └─────────────┘   └──────────────┘   └────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tsync init                        # create an empty snapshot
//! tsync fetch -o data/thread.json   # download the thread
//! tsync sync data/thread.json       # extract and reconcile
//! tsync stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`feed`] | Feed JSON loading and synthetic ids |
//! | [`fetch`] | Reddit thread connector |
//! | [`gateway`] | OpenAI and disabled extraction gateways |
//! | [`snapshot`] | Versioned TSV snapshot and negative cache I/O |
//! | [`journal`] | Append-only decision journal and recovery |
//! | [`reconcile`] | The per-comment reconciliation driver |
//! | [`progress`] | Stderr progress reporting |
//! | [`edits`] | Curated-edit overlay |
//! | [`stats`] | Ledger statistics |
//! | [`export`] | JSON export |
//!
//! The record model, category rules, change-detection ledger and gateway
//! trait live in the `timeline-sync-core` crate.

pub mod config;
pub mod edits;
pub mod export;
pub mod feed;
pub mod fetch;
pub mod gateway;
pub mod journal;
pub mod progress;
pub mod reconcile;
pub mod snapshot;
pub mod stats;
