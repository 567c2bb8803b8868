//! Source feed loading.
//!
//! A feed is a JSON document with a top-level `comments` array, as written
//! by `tsync fetch`. Only each comment's id (`comment_id`, falling back to
//! `id` then `name`) and body (`body`, falling back to `content`) are read.
//!
//! Numeric ids are rendered as decimal text. An id of any other JSON type
//! rejects the feed. Comments whose id is missing, null or blank get a
//! synthetic `seq-NNNNN` id derived from their 1-based position, made unique
//! within the feed.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

use timeline_sync_core::models::SourceItem;

const ID_FIELDS: [&str; 3] = ["comment_id", "id", "name"];
const BODY_FIELDS: [&str; 2] = ["body", "content"];

pub fn load_feed(path: &Path) -> Result<Vec<SourceItem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed: {}", path.display()))?;
    parse_feed(&text).with_context(|| format!("Invalid feed: {}", path.display()))
}

pub fn parse_feed(text: &str) -> Result<Vec<SourceItem>> {
    let value: Value = serde_json::from_str(text)?;
    let comments = value
        .get("comments")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("feed is missing a 'comments' array"))?;

    let raw = comments
        .iter()
        .enumerate()
        .map(|(idx, c)| {
            let id = comment_id(c)
                .with_context(|| format!("comment {} has an invalid id", idx + 1))?
                .filter(|id| is_usable_id(id));
            let body = first_str(c, &BODY_FIELDS).unwrap_or("").to_string();
            Ok((id, body))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(assign_ids(raw))
}

/// The first present, non-null id field, trimmed.
fn comment_id(value: &Value) -> Result<Option<String>> {
    for field in ID_FIELDS {
        match value.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => return Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => return Ok(Some(n.to_string())),
            Some(other) => bail!("'{}' must be a string or number, got {}", field, other),
        }
    }
    Ok(None)
}

fn first_str<'a>(value: &'a Value, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| value.get(*f).and_then(|v| v.as_str()))
}

/// Ids end up as a TSV column, so control characters are not allowed.
fn is_usable_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c.is_control())
}

/// Resolve every comment to a [`SourceItem`], deriving synthetic ids from
/// position where the id is missing.
pub fn assign_ids(raw: Vec<(Option<String>, String)>) -> Vec<SourceItem> {
    let mut taken: HashSet<String> = raw.iter().filter_map(|(id, _)| id.clone()).collect();

    raw.into_iter()
        .enumerate()
        .map(|(idx, (id, body))| {
            let id = id.unwrap_or_else(|| {
                let base = format!("seq-{:05}", idx + 1);
                let mut candidate = base.clone();
                let mut n = 1;
                while taken.contains(&candidate) {
                    candidate = format!("{}-{}", base, n);
                    n += 1;
                }
                taken.insert(candidate.clone());
                candidate
            });
            SourceItem::new(id, body)
        })
        .collect()
}
