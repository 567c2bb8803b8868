//! Change-detection ledger.
//!
//! The [`Ledger`] holds the last known state of every comment id: its
//! positive [`TimelineRecord`] (which carries the fingerprint that produced
//! it) or its [`NegativeCache`] entry. For each incoming comment it decides
//! whether extraction is needed ([`Ledger::classify`]), turns an extraction
//! into an [`Outcome`] ([`Ledger::resolve`]), and applies that outcome
//! ([`Ledger::apply`]).
//!
//! Records are kept in a `BTreeMap`, so iteration is always in ascending id
//! order, which is the order snapshots are written in.

pub mod negative;

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fmt;

use crate::gateway::Extraction;
use crate::models::{Fingerprint, SourceItem, TimelineRecord};

pub use negative::NegativeCache;

/// Bodies the source uses for comments that were deleted or removed.
pub const RETRACTION_SENTINELS: &[&str] = &["[deleted]", "[removed]"];

/// True for a retracted comment: a deletion sentinel or an empty body.
pub fn is_retracted(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || RETRACTION_SENTINELS.contains(&trimmed)
}

/// What the ledger already knows about an incoming comment.
///
/// Checks run in declaration order; the first that applies wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    /// Content is gone; any prior record is carried unchanged.
    Retracted,
    /// Same content was already rejected by the extractor.
    CachedNegative,
    /// Same content already produced the stored record.
    Unchanged,
    /// No record yet; needs extraction.
    New,
    /// Record exists but content changed; needs extraction and merge.
    Edited,
}

impl Classification {
    pub const ALL: [Classification; 5] = [
        Classification::Retracted,
        Classification::CachedNegative,
        Classification::Unchanged,
        Classification::New,
        Classification::Edited,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Retracted => "retracted",
            Classification::CachedNegative => "cached-negative",
            Classification::Unchanged => "unchanged",
            Classification::New => "new",
            Classification::Edited => "edited",
        }
    }

    pub fn needs_extraction(self) -> bool {
        matches!(self, Classification::New | Classification::Edited)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision taken for one comment in a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changes (retracted, unchanged, cached negative).
    Carried,
    /// First positive extraction for this id.
    Inserted(TimelineRecord),
    /// Positive re-extraction merged into the existing record.
    Merged(TimelineRecord),
    /// Extractor confirmed "not a timeline" for this fingerprint; any
    /// positive record is dropped.
    Rejected(Fingerprint),
    /// Extraction failed transiently; retried on the next pass.
    Deferred,
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Carried => "carried",
            Outcome::Inserted(_) => "inserted",
            Outcome::Merged(_) => "merged",
            Outcome::Rejected(_) => "rejected",
            Outcome::Deferred => "deferred",
        }
    }

    pub fn record(&self) -> Option<&TimelineRecord> {
        match self {
            Outcome::Inserted(r) | Outcome::Merged(r) => Some(r),
            _ => None,
        }
    }
}

/// In-memory reconciliation state: positive records plus negative cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<String, TimelineRecord>,
    negatives: NegativeCache,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from loaded state.
    ///
    /// Fails on duplicate record ids. A negative entry for an id that also
    /// has a positive record is dropped (the record is the newer evidence).
    pub fn from_parts(
        records: impl IntoIterator<Item = TimelineRecord>,
        mut negatives: NegativeCache,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for record in records {
            if map.contains_key(&record.id) {
                bail!("duplicate record id: '{}'", record.id);
            }
            negatives.remove(&record.id);
            map.insert(record.id.clone(), record);
        }
        Ok(Self {
            records: map,
            negatives,
        })
    }

    pub fn classify(&self, id: &str, content: &str, fingerprint: &Fingerprint) -> Classification {
        if is_retracted(content) {
            return Classification::Retracted;
        }
        if self.negatives.is_confirmed(id, fingerprint) {
            return Classification::CachedNegative;
        }
        match self.records.get(id) {
            Some(record) if record.fingerprint.as_ref() == Some(fingerprint) => {
                Classification::Unchanged
            }
            Some(_) => Classification::Edited,
            None => Classification::New,
        }
    }

    /// Turn an extraction for `item` into an outcome, merging with the
    /// existing record when there is one.
    pub fn resolve(
        &self,
        item: &SourceItem,
        fingerprint: &Fingerprint,
        extraction: Extraction,
    ) -> Outcome {
        match extraction {
            Extraction::NotTimeline => Outcome::Rejected(fingerprint.clone()),
            Extraction::Timeline(candidate) => {
                let fresh =
                    candidate.into_record(&item.external_id, &item.content, fingerprint.clone());
                match self.records.get(&item.external_id) {
                    Some(existing) => Outcome::Merged(existing.merge(fresh)),
                    None => Outcome::Inserted(fresh),
                }
            }
        }
    }

    pub fn apply(&mut self, id: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Inserted(record) | Outcome::Merged(record) => {
                self.negatives.remove(id);
                self.records.insert(id.to_string(), record.clone());
            }
            Outcome::Rejected(fingerprint) => {
                self.records.remove(id);
                self.negatives.insert(id, fingerprint.clone());
            }
            Outcome::Carried | Outcome::Deferred => {}
        }
    }

    /// Replace an existing record. Returns the previous one, or `None`
    /// (and changes nothing) when the id is unknown.
    pub fn replace(&mut self, record: TimelineRecord) -> Option<TimelineRecord> {
        let slot = self.records.get_mut(&record.id)?;
        Some(std::mem::replace(slot, record))
    }

    pub fn record(&self, id: &str) -> Option<&TimelineRecord> {
        self.records.get(id)
    }

    /// Records in ascending id order.
    pub fn records(&self) -> impl Iterator<Item = &TimelineRecord> {
        self.records.values()
    }

    pub fn negatives(&self) -> &NegativeCache {
        &self.negatives
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
