//! Reddit thread connector.
//!
//! Fetches a thread's listing (`<thread>/.json`) and keeps only top-level
//! comments, i.e. `t1` things whose `parent_id` is the post itself. The
//! listing carries at most a few hundred comments plus a `more` stub listing
//! the remaining ids, which are resolved through `/api/morechildren.json`
//! in batches of [`MORE_CHILDREN_BATCH`]. A failed batch is reported and
//! skipped.
//!
//! The output document is the feed format read by `tsync sync`:
//! `{ "post": {...}, "comments": [...], "metadata": {...} }`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::config::FetchConfig;

pub const MORE_CHILDREN_BATCH: usize = 100;
const MORE_CHILDREN_URL: &str = "https://www.reddit.com/api/morechildren.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedComment {
    pub comment_id: Option<String>,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: f64,
    pub created_iso: Option<String>,
    pub edited_utc: Option<f64>,
    pub edited_iso: Option<String>,
    pub was_edited: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub selftext: Option<String>,
    pub created_utc: Option<f64>,
    pub post_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadMetadata {
    pub total_comments: usize,
    pub edited_comments: usize,
    pub fetch_timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thread {
    pub post: PostInfo,
    pub comments: Vec<FetchedComment>,
    pub metadata: ThreadMetadata,
}

fn iso(ts: f64) -> Option<String> {
    if ts <= 0.0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(ts as i64, 0).map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
}

/// Keep only top-level comments (`t1` things parented to `post_id`).
pub fn toplevel_comments(children: &[Value], post_id: &str) -> Vec<FetchedComment> {
    children
        .iter()
        .filter(|c| c.get("kind").and_then(|k| k.as_str()) == Some("t1"))
        .filter_map(|c| c.get("data"))
        .filter(|d| d.get("parent_id").and_then(|p| p.as_str()) == Some(post_id))
        .map(|d| {
            let created_utc = d.get("created_utc").and_then(|v| v.as_f64()).unwrap_or(0.0);
            // `edited` is `false` or the edit timestamp.
            let edited = d.get("edited");
            let edited_utc = edited.and_then(|v| v.as_f64());
            let was_edited = match edited {
                Some(Value::Bool(b)) => *b,
                Some(Value::Number(_)) => true,
                _ => false,
            };
            FetchedComment {
                comment_id: d.get("name").and_then(|v| v.as_str()).map(str::to_string),
                author: d
                    .get("author")
                    .and_then(|v| v.as_str())
                    .unwrap_or("[deleted]")
                    .to_string(),
                body: d
                    .get("body")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                score: d.get("score").and_then(|v| v.as_i64()).unwrap_or(0),
                created_utc,
                created_iso: iso(created_utc),
                edited_utc,
                edited_iso: edited_utc.and_then(iso),
                was_edited,
            }
        })
        .collect()
}

/// Ids listed by the first `more` stub among `children`.
pub fn more_children_ids(children: &[Value]) -> Vec<String> {
    children
        .iter()
        .find(|c| c.get("kind").and_then(|k| k.as_str()) == Some("more"))
        .and_then(|m| m.pointer("/data/children"))
        .and_then(|c| c.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Split a thread listing into the post and its first page of comment things.
pub fn split_listing(listing: &Value) -> Result<(PostInfo, Vec<Value>)> {
    let post = listing
        .pointer("/0/data/children/0/data")
        .ok_or_else(|| anyhow::anyhow!("Unexpected thread listing: no post data"))?;
    let post_id = post
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Unexpected thread listing: post has no name"))?
        .to_string();
    let children = listing
        .pointer("/1/data/children")
        .and_then(|c| c.as_array())
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Unexpected thread listing: no comment listing"))?;

    let text = |key: &str| post.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let info = PostInfo {
        title: text("title"),
        author: text("author"),
        selftext: text("selftext"),
        created_utc: post.get("created_utc").and_then(|v| v.as_f64()),
        post_id,
    };
    Ok((info, children))
}

pub fn assemble_thread(post: PostInfo, comments: Vec<FetchedComment>) -> Thread {
    let edited_comments = comments.iter().filter(|c| c.was_edited).count();
    Thread {
        metadata: ThreadMetadata {
            total_comments: comments.len(),
            edited_comments,
            fetch_timestamp: chrono::Local::now().to_rfc3339(),
        },
        post,
        comments,
    }
}

pub async fn fetch_thread(url: &str, config: &FetchConfig) -> Result<Thread> {
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(30))
        .build()?;

    let json_url = format!("{}/.json", url.trim_end_matches('/'));
    eprintln!("Fetching {}", json_url);

    let listing: Value = client
        .get(&json_url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to fetch {}", json_url))?
        .json()
        .await
        .with_context(|| format!("Invalid JSON from {}", json_url))?;

    let (post, children) = split_listing(&listing)?;
    let mut comments = toplevel_comments(&children, &post.post_id);

    let remaining = more_children_ids(&children);
    for batch in remaining.chunks(MORE_CHILDREN_BATCH) {
        eprintln!("Fetching a batch of {} more comments", batch.len());
        tokio::time::sleep(Duration::from_millis(config.batch_delay_ms)).await;

        match fetch_more_children(&client, &post.post_id, batch).await {
            Ok(things) => comments.extend(toplevel_comments(&things, &post.post_id)),
            Err(e) => eprintln!("Warning: could not fetch a batch of comments: {:#}", e),
        }
    }

    Ok(assemble_thread(post, comments))
}

async fn fetch_more_children(
    client: &reqwest::Client,
    post_id: &str,
    ids: &[String],
) -> Result<Vec<Value>> {
    let children = ids.join(",");
    let json: Value = client
        .get(MORE_CHILDREN_URL)
        .query(&[
            ("api_type", "json"),
            ("link_id", post_id),
            ("children", children.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(json
        .pointer("/json/data/things")
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default())
}

/// `tsync fetch`: download a thread and write it as a feed file.
pub async fn run_fetch(config: &FetchConfig, url: Option<&str>, output: &Path) -> Result<()> {
    let url = url
        .map(str::to_string)
        .or_else(|| config.thread_url.clone())
        .ok_or_else(|| anyhow::anyhow!("No thread URL given and fetch.thread_url is not set"))?;

    let thread = fetch_thread(&url, config).await?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(&thread)?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("fetch {}", url);
    println!("  comments: {}", thread.metadata.total_comments);
    println!("  edited: {}", thread.metadata.edited_comments);
    println!("  output: {}", output.display());
    println!("ok");
    Ok(())
}
