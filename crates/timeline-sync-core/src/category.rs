//! Eligibility category canonicalization.
//!
//! A [`Category`] is one [`BaseCategory`] followed by zero or more
//! [`SuffixTag`]s in a fixed order, e.g. `ILR (+ Marriage) (+ Refugee)`.
//!
//! Extractor output is never stored verbatim. [`Category::canonicalize`]
//! re-derives the label from the extractor's proposal and the raw comment
//! body using two ordered keyword tables ([`BASE_RULES`] and
//! [`SUFFIX_RULES`]). Base rules are evaluated in priority order so that
//! specific routes win over the [`DEFAULT_BASE`] fallback.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// Base eligibility route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BaseCategory {
    Euss,
    Mn1Child,
    FormT,
    Bno,
    ArmedForces,
    Ilr,
}

impl BaseCategory {
    pub const ALL: [BaseCategory; 6] = [
        BaseCategory::Euss,
        BaseCategory::Mn1Child,
        BaseCategory::FormT,
        BaseCategory::Bno,
        BaseCategory::ArmedForces,
        BaseCategory::Ilr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BaseCategory::Euss => "EUSS",
            BaseCategory::Mn1Child => "MN1 (Child)",
            BaseCategory::FormT => "Form T",
            BaseCategory::Bno => "BNO",
            BaseCategory::ArmedForces => "Armed Forces",
            BaseCategory::Ilr => "ILR",
        }
    }
}

/// Optional route qualifier appended after the base label.
///
/// Declaration order is the canonical output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SuffixTag {
    Marriage,
    DomesticViolence,
    Refugee,
}

impl SuffixTag {
    pub const ALL: [SuffixTag; 3] = [
        SuffixTag::Marriage,
        SuffixTag::DomesticViolence,
        SuffixTag::Refugee,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SuffixTag::Marriage => " (+ Marriage)",
            SuffixTag::DomesticViolence => " (+ DV)",
            SuffixTag::Refugee => " (+ Refugee)",
        }
    }
}

/// A keyword predicate paired with the label it selects.
///
/// The rule matches when **any** clause has **all** of its keywords
/// present in the (lower-cased) text.
#[derive(Debug)]
pub struct KeywordRule<L: 'static> {
    pub label: L,
    pub clauses: &'static [&'static [&'static str]],
}

impl<L: Copy> KeywordRule<L> {
    pub fn matches(&self, text: &str) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.iter().all(|keyword| text.contains(keyword)))
    }
}

/// Base rules in priority order. First match wins.
pub const BASE_RULES: &[KeywordRule<BaseCategory>] = &[
    KeywordRule {
        label: BaseCategory::Euss,
        clauses: &[
            &["euss"],
            &["settled status"],
            &["eu settlement"],
            &["eu settled"],
        ],
    },
    KeywordRule {
        label: BaseCategory::Mn1Child,
        clauses: &[
            &["mn1"],
            &["minor child"],
            &["child application"],
            &["registration of a minor"],
        ],
    },
    KeywordRule {
        label: BaseCategory::FormT,
        clauses: &[&["form t"], &["born in the uk", "10", "year"]],
    },
    KeywordRule {
        label: BaseCategory::Bno,
        clauses: &[&["bno"], &["british national (overseas)"]],
    },
    KeywordRule {
        label: BaseCategory::ArmedForces,
        clauses: &[&["armed forces"], &["hm forces"]],
    },
];

/// Used when no base rule matches (covers the Skilled Worker, Ancestry,
/// Global Talent and similar routes that all settle through ILR).
pub const DEFAULT_BASE: BaseCategory = BaseCategory::Ilr;

/// Suffix rules, each tested independently, in canonical output order.
///
/// Every rule also matches its own rendered label so that a suffix
/// proposed by the extractor survives re-canonicalization.
pub const SUFFIX_RULES: &[KeywordRule<SuffixTag>] = &[
    KeywordRule {
        label: SuffixTag::Marriage,
        clauses: &[
            &["married to british"],
            &["british spouse"],
            &["spouse of a british"],
            &["uk spouse"],
            &["married to a british"],
            &["(+ marriage)"],
        ],
    },
    KeywordRule {
        label: SuffixTag::DomesticViolence,
        clauses: &[&["ilrdv"], &["domestic violence"], &["(+ dv)"]],
    },
    KeywordRule {
        label: SuffixTag::Refugee,
        clauses: &[&["refugee"]],
    },
];

/// Canonical eligibility category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Category {
    base: BaseCategory,
    suffixes: Vec<SuffixTag>,
}

impl Category {
    /// Build a category; suffixes are sorted into canonical order and
    /// deduplicated.
    pub fn new(base: BaseCategory, mut suffixes: Vec<SuffixTag>) -> Self {
        suffixes.sort();
        suffixes.dedup();
        Self { base, suffixes }
    }

    pub fn base(&self) -> BaseCategory {
        self.base
    }

    pub fn suffixes(&self) -> &[SuffixTag] {
        &self.suffixes
    }

    /// Derive the canonical category from an extractor's proposed label and
    /// the raw comment body.
    ///
    /// Idempotent: feeding the rendered result back in as `raw` with the
    /// same `content` yields the same category.
    pub fn canonicalize(raw: &str, content: &str) -> Self {
        let text = format!("{} || {}", raw, content).to_lowercase();

        let base = BASE_RULES
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.label)
            .unwrap_or(DEFAULT_BASE);

        let suffixes = SUFFIX_RULES
            .iter()
            .filter(|rule| rule.matches(&text))
            .map(|rule| rule.label)
            .collect();

        Self::new(base, suffixes)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base.label())?;
        for suffix in &self.suffixes {
            f.write_str(suffix.label())?;
        }
        Ok(())
    }
}

/// Strict parse of an already-canonical label (as stored in a snapshot).
impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some(base) = BaseCategory::ALL
            .iter()
            .copied()
            .find(|b| s.starts_with(b.label()))
        else {
            bail!("unknown eligibility category: '{}'", s);
        };

        let mut rest = &s[base.label().len()..];
        let mut suffixes = Vec::new();
        for tag in SuffixTag::ALL {
            if let Some(after) = rest.strip_prefix(tag.label()) {
                suffixes.push(tag);
                rest = after;
            }
        }

        if !rest.is_empty() {
            bail!("non-canonical eligibility category: '{}'", s);
        }

        Ok(Self { base, suffixes })
    }
}
