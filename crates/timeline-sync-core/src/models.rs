//! Core data models for Timeline Sync.
//!
//! These types represent the source comments that flow into a run and the
//! canonical timeline rows that are reconciled and persisted.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::category::Category;

/// A single comment as supplied by the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub external_id: String,
    pub content: String,
}

impl SourceItem {
    pub fn new(external_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            content: content.into(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.content)
    }
}

/// Short change-detection digest of a comment body.
///
/// First [`Fingerprint::LEN`] hex characters of the SHA-256 of the content.
/// Not used for anything security-related.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub const LEN: usize = 16;

    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let mut hex = format!("{:x}", hasher.finalize());
        hex.truncate(Self::LEN);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != Self::LEN || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            bail!("invalid fingerprint: '{}'", s);
        }
        Ok(Self(s.to_string()))
    }
}

/// How the application was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Method {
    Online,
    Paper,
    Other,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Online, Method::Paper, Method::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Online => "Online",
            Method::Paper => "Paper",
            Method::Other => "Other",
        }
    }

    /// Lenient mapping of extractor output. Missing or unrecognized values
    /// fall back to [`Method::Online`].
    pub fn from_extracted(raw: Option<&str>) -> Self {
        let raw = raw.unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or(Method::Online)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse, as used for stored snapshots.
impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("invalid application method: '{}'", s))
    }
}

/// A timeline date: a calendar day or the unknown sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineDate {
    #[default]
    Unknown,
    Known(NaiveDate),
}

impl TimelineDate {
    /// Textual form of [`TimelineDate::Unknown`].
    pub const UNKNOWN: &'static str = "N/A";

    /// Validate extractor output.
    ///
    /// Only a fixed-width `YYYY-MM-DD` naming a real calendar day is kept;
    /// everything else (including `N/A`) becomes [`TimelineDate::Unknown`].
    /// Locale handling is the extractor's job, this never guesses.
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim();
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return TimelineDate::Unknown;
        }
        let digits_ok = bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !digits_ok {
            return TimelineDate::Unknown;
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(TimelineDate::Known)
            .unwrap_or(TimelineDate::Unknown)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, TimelineDate::Known(_))
    }

    /// `self` if known, otherwise `other`.
    pub fn or(self, other: TimelineDate) -> TimelineDate {
        if self.is_known() {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for TimelineDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineDate::Unknown => f.write_str(Self::UNKNOWN),
            TimelineDate::Known(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Strict parse of a stored value: `N/A` or a valid `YYYY-MM-DD`.
impl FromStr for TimelineDate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == Self::UNKNOWN {
            return Ok(TimelineDate::Unknown);
        }
        match TimelineDate::normalize(s) {
            TimelineDate::Known(d) if s.len() == 10 => Ok(TimelineDate::Known(d)),
            _ => bail!("invalid date: '{}' (expected YYYY-MM-DD or N/A)", s),
        }
    }
}

/// One canonical timeline row, keyed by the comment's external id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRecord {
    pub id: String,
    pub category: Category,
    pub method: Method,
    pub application_date: TimelineDate,
    pub biometric_date: TimelineDate,
    pub approval_date: TimelineDate,
    pub ceremony_date: TimelineDate,
    /// Fingerprint of the content that last produced or confirmed this
    /// record. `None` only for rows upgraded from the legacy snapshot
    /// format, which forces a re-extraction on the next pass.
    pub fingerprint: Option<Fingerprint>,
}

impl TimelineRecord {
    pub fn dates(&self) -> [TimelineDate; 4] {
        [
            self.application_date,
            self.biometric_date,
            self.approval_date,
            self.ceremony_date,
        ]
    }

    /// Merge a fresh extraction for the same id into this record.
    ///
    /// Categorical fields and the fingerprint come from `newer`. Known dates
    /// are sticky: a date already known here is kept even if `newer`
    /// disagrees or has it unknown; unknown dates are filled from `newer`.
    ///
    /// The sticky rule cannot tell extractor noise from an author's genuine
    /// correction; corrected dates are applied through curated edits
    /// ([`TimelineRecord::overlay`]).
    pub fn merge(&self, newer: TimelineRecord) -> TimelineRecord {
        TimelineRecord {
            id: self.id.clone(),
            category: newer.category,
            method: newer.method,
            application_date: self.application_date.or(newer.application_date),
            biometric_date: self.biometric_date.or(newer.biometric_date),
            approval_date: self.approval_date.or(newer.approval_date),
            ceremony_date: self.ceremony_date.or(newer.ceremony_date),
            fingerprint: newer.fingerprint,
        }
    }

    /// Apply a hand-curated row on top of this record.
    ///
    /// Curated category and method always win; curated dates win when
    /// known. The fingerprint is kept so the curated row is not re-extracted.
    pub fn overlay(&self, curated: &TimelineRecord) -> TimelineRecord {
        TimelineRecord {
            id: self.id.clone(),
            category: curated.category.clone(),
            method: curated.method,
            application_date: curated.application_date.or(self.application_date),
            biometric_date: curated.biometric_date.or(self.biometric_date),
            approval_date: curated.approval_date.or(self.approval_date),
            ceremony_date: curated.ceremony_date.or(self.ceremony_date),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> TimelineDate {
        TimelineDate::normalize(s)
    }

    fn record(id: &str, dates: [&str; 4], content: &str) -> TimelineRecord {
        TimelineRecord {
            id: id.to_string(),
            category: Category::canonicalize("ILR", content),
            method: Method::Online,
            application_date: date(dates[0]),
            biometric_date: date(dates[1]),
            approval_date: date(dates[2]),
            ceremony_date: date(dates[3]),
            fingerprint: Some(Fingerprint::of(content)),
        }
    }

    #[test]
    fn test_fingerprint_deterministic_and_short() {
        let a = Fingerprint::of("Got ILR, applied 01/02/2025");
        let b = Fingerprint::of("Got ILR, applied 01/02/2025");
        let c = Fingerprint::of("Got ILR, applied 02/02/2025");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), Fingerprint::LEN);
        assert_eq!(a.as_str().parse::<Fingerprint>().unwrap(), a);
    }

    #[test]
    fn test_fingerprint_of_empty_content() {
        // sha256("") = e3b0c442...
        assert_eq!(Fingerprint::of("").as_str(), "e3b0c44298fc1c14");
    }

    #[test]
    fn test_fingerprint_parse_rejects_garbage() {
        assert!("".parse::<Fingerprint>().is_err());
        assert!("E3B0C44298FC1C14".parse::<Fingerprint>().is_err());
        assert!("e3b0c44298fc1c1".parse::<Fingerprint>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_normalize_date_accepts_iso() {
        assert_eq!(
            date("2025-02-01"),
            TimelineDate::Known(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap())
        );
        assert_eq!(date(" 2025-02-01\n").to_string(), "2025-02-01");
    }

    #[test]
    fn test_normalize_date_rejects_everything_else() {
        for raw in [
            "N/A",
            "",
            "TBC",
            "01/02/2025",
            "2025-2-01",
            "2025-02-1",
            "2025/02/01",
            "2025-02-30",
            "2025-13-01",
            "+025-02-01",
            "2025-02-01T10:00",
            "February 2025",
        ] {
            assert_eq!(date(raw), TimelineDate::Unknown, "raw={:?}", raw);
        }
    }

    #[test]
    fn test_date_strict_parse() {
        assert_eq!("N/A".parse::<TimelineDate>().unwrap(), TimelineDate::Unknown);
        assert!("2025-02-01".parse::<TimelineDate>().unwrap().is_known());
        assert!("".parse::<TimelineDate>().is_err());
        assert!(" 2025-02-01".parse::<TimelineDate>().is_err());
        assert!("TBC".parse::<TimelineDate>().is_err());
    }

    #[test]
    fn test_method_from_extracted() {
        assert_eq!(Method::from_extracted(Some("online")), Method::Online);
        assert_eq!(Method::from_extracted(Some(" PAPER ")), Method::Paper);
        assert_eq!(Method::from_extracted(Some("Other")), Method::Other);
        assert_eq!(Method::from_extracted(Some("via solicitor")), Method::Online);
        assert_eq!(Method::from_extracted(None), Method::Online);
    }

    #[test]
    fn test_method_strict_parse() {
        assert_eq!("Paper".parse::<Method>().unwrap(), Method::Paper);
        assert!("paper".parse::<Method>().is_err());
    }

    #[test]
    fn test_merge_keeps_known_dates() {
        let old = record("c1", ["2025-02-01", "N/A", "N/A", "N/A"], "v1");
        let new = record("c1", ["2025-03-01", "N/A", "N/A", "N/A"], "v2");
        let merged = old.merge(new);
        assert_eq!(merged.application_date.to_string(), "2025-02-01");
    }

    #[test]
    fn test_merge_unknown_does_not_erase() {
        let old = record("c1", ["2025-02-01", "2025-02-10", "N/A", "N/A"], "v1");
        let new = record("c1", ["N/A", "N/A", "N/A", "N/A"], "v2");
        let merged = old.merge(new);
        assert_eq!(merged.application_date.to_string(), "2025-02-01");
        assert_eq!(merged.biometric_date.to_string(), "2025-02-10");
    }

    #[test]
    fn test_merge_fills_gaps_and_takes_latest_categoricals() {
        let old = record("c1", ["2025-02-01", "N/A", "N/A", "N/A"], "v1");
        let mut new = record("c1", ["N/A", "2025-02-10", "N/A", "N/A"], "refugee");
        new.method = Method::Paper;
        let merged = old.merge(new.clone());
        assert_eq!(merged.application_date.to_string(), "2025-02-01");
        assert_eq!(merged.biometric_date.to_string(), "2025-02-10");
        assert_eq!(merged.approval_date, TimelineDate::Unknown);
        assert_eq!(merged.method, Method::Paper);
        assert_eq!(merged.category.to_string(), "ILR (+ Refugee)");
        assert_eq!(merged.fingerprint, new.fingerprint);
        assert_eq!(merged.id, "c1");
    }

    #[test]
    fn test_merge_chain_left_to_right() {
        let a = record("c1", ["2025-01-01", "N/A", "N/A", "N/A"], "a");
        let b = record("c1", ["N/A", "2025-01-10", "N/A", "N/A"], "b");
        let c = record("c1", ["2024-12-31", "N/A", "2025-03-01", "N/A"], "c");
        let merged = a.merge(b).merge(c);
        assert_eq!(
            merged.dates().map(|d| d.to_string()),
            ["2025-01-01", "2025-01-10", "2025-03-01", "N/A"]
        );
    }

    #[test]
    fn test_overlay_prefers_curated_known_values() {
        let stored = record("c1", ["2025-02-01", "2025-02-10", "N/A", "N/A"], "body");
        let mut curated = record("c1", ["2025-01-31", "N/A", "2025-04-01", "N/A"], "");
        curated.method = Method::Paper;
        curated.fingerprint = None;
        let out = stored.overlay(&curated);
        assert_eq!(
            out.dates().map(|d| d.to_string()),
            ["2025-01-31", "2025-02-10", "2025-04-01", "N/A"]
        );
        assert_eq!(out.method, Method::Paper);
        assert_eq!(out.fingerprint, stored.fingerprint);
    }
}
