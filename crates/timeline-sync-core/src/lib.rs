//! # Timeline Sync Core
//!
//! Shared, I/O-free logic for Timeline Sync: the timeline record model,
//! category canonicalization, the change-detection ledger with its
//! negative cache, and the extraction gateway trait.
//!
//! This crate contains no tokio, filesystem, or network code. Snapshot
//! files, the run journal, and concrete gateways live in the
//! `timeline-sync` app crate.

pub mod category;
pub mod gateway;
pub mod ledger;
pub mod models;
