//! Negative cache: comments confirmed not to contain a timeline.

use std::collections::BTreeMap;

use crate::models::Fingerprint;

/// Map of id → fingerprint of the content the extractor rejected.
///
/// An entry only short-circuits extraction while the comment's content is
/// unchanged; an edit produces a new fingerprint and the comment is
/// extracted again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NegativeCache {
    entries: BTreeMap<String, Fingerprint>,
}

impl NegativeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `fingerprint` is the rejected fingerprint for `id`.
    pub fn is_confirmed(&self, id: &str, fingerprint: &Fingerprint) -> bool {
        self.entries.get(id) == Some(fingerprint)
    }

    pub fn get(&self, id: &str) -> Option<&Fingerprint> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(id.into(), fingerprint);
    }

    pub fn remove(&mut self, id: &str) -> Option<Fingerprint> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fingerprint)> {
        self.entries.iter().map(|(id, fp)| (id.as_str(), fp))
    }
}

impl FromIterator<(String, Fingerprint)> for NegativeCache {
    fn from_iter<I: IntoIterator<Item = (String, Fingerprint)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
