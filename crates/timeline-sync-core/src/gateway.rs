//! Extraction gateway trait and response contract.
//!
//! An [`ExtractionGateway`] turns one comment body into either a
//! [`Candidate`] timeline or [`Extraction::NotTimeline`]. Any `Err` from a
//! gateway is treated by the driver as a transient failure: the comment is
//! left unprocessed and retried on the next pass.
//!
//! Concrete gateways (OpenAI, disabled) live in the `timeline-sync` app
//! crate. This module only defines the boundary and parses the JSON object
//! a model returns.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::category::Category;
use crate::models::{Fingerprint, Method, TimelineDate, TimelineRecord};

/// Raw fields proposed by the extractor, before canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "CandidateFields")]
pub struct Candidate {
    pub category: Option<String>,
    pub method: Option<String>,
    pub application_date: Option<String>,
    pub biometric_date: Option<String>,
    pub approval_date: Option<String>,
    pub ceremony_date: Option<String>,
    /// The extractor's "not a timeline" flag.
    pub skip: bool,
}

/// Wire shape of a model reply. The legacy `eligibility` and
/// `application_method` keys are accepted next to the current ones; when
/// both are sent the current key wins. Only `"skip": true` marks a
/// rejection, so a null `skip` reads as false.
#[derive(Deserialize)]
struct CandidateFields {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    eligibility: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    application_method: Option<String>,
    #[serde(default)]
    application_date: Option<String>,
    #[serde(default)]
    biometric_date: Option<String>,
    #[serde(default)]
    approval_date: Option<String>,
    #[serde(default)]
    ceremony_date: Option<String>,
    #[serde(default)]
    skip: Option<bool>,
}

impl From<CandidateFields> for Candidate {
    fn from(f: CandidateFields) -> Self {
        Self {
            category: f.category.or(f.eligibility),
            method: f.method.or(f.application_method),
            application_date: f.application_date,
            biometric_date: f.biometric_date,
            approval_date: f.approval_date,
            ceremony_date: f.ceremony_date,
            skip: f.skip.unwrap_or(false),
        }
    }
}

impl Candidate {
    /// Canonicalize into a record. Never fails: bad categories, methods
    /// and dates fall back to the rule table, `Online`, and `N/A`.
    pub fn into_record(self, id: &str, content: &str, fingerprint: Fingerprint) -> TimelineRecord {
        let date = |raw: &Option<String>| TimelineDate::normalize(raw.as_deref().unwrap_or(""));
        TimelineRecord {
            id: id.to_string(),
            category: Category::canonicalize(self.category.as_deref().unwrap_or(""), content),
            method: Method::from_extracted(self.method.as_deref()),
            application_date: date(&self.application_date),
            biometric_date: date(&self.biometric_date),
            approval_date: date(&self.approval_date),
            ceremony_date: date(&self.ceremony_date),
            fingerprint: Some(fingerprint),
        }
    }
}

/// Result of a successful extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Timeline(Candidate),
    NotTimeline,
}

/// Parse the JSON object returned by a model.
///
/// Errors (non-JSON text, a non-object value, wrongly typed fields) are
/// transient failures from the driver's point of view.
pub fn parse_extraction(text: &str) -> Result<Extraction> {
    let value: serde_json::Value = serde_json::from_str(text.trim())
        .map_err(|e| anyhow::anyhow!("extractor returned invalid JSON: {}", e))?;
    if !value.is_object() {
        bail!("extractor returned JSON that is not an object");
    }
    let candidate: Candidate = serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("extractor returned malformed fields: {}", e))?;

    if candidate.skip {
        Ok(Extraction::NotTimeline)
    } else {
        Ok(Extraction::Timeline(candidate))
    }
}

/// A capability that extracts timelines from comment bodies.
///
/// Created once per run by the application and passed to the driver.
#[async_trait]
pub trait ExtractionGateway: Send + Sync {
    /// Identifier shown in logs (e.g. the model name).
    fn name(&self) -> &str;

    /// Extract a timeline from one comment body.
    async fn extract(&self, content: &str) -> Result<Extraction>;
}
