//! Per-item progress reporting for `tsync sync`.
//!
//! Each comment's classification and outcome is reported as it is decided.
//! Progress is emitted on **stderr** so stdout (the pass summary) stays
//! parseable for scripts.

use std::io::Write;

use timeline_sync_core::ledger::Classification;

/// A single progress event for a reconciliation pass.
#[derive(Clone, Debug)]
pub enum PassProgressEvent {
    /// The feed was loaded; `total` items will be visited.
    Started { feed: String, total: u64 },
    /// Item `n` of `total` was decided.
    Item {
        n: u64,
        total: u64,
        id: String,
        classification: Classification,
        outcome: &'static str,
    },
}

/// Reports pass progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the reconciliation driver.
    fn report(&self, event: PassProgressEvent);
}

/// Human-friendly progress on stderr: "sync  [  12 / 1,340]  t1_abc  edited -> merged".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PassProgressEvent) {
        let line = match &event {
            PassProgressEvent::Started { feed, total } => {
                format!("sync {}  {} items\n", feed, format_number(*total))
            }
            PassProgressEvent::Item {
                n,
                total,
                id,
                classification,
                outcome,
            } => {
                let total_fmt = format_number(*total);
                format!(
                    "sync  [{:>width$} / {}]  {}  {} -> {}\n",
                    format_number(*n),
                    total_fmt,
                    id,
                    classification,
                    outcome,
                    width = total_fmt.len()
                )
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PassProgressEvent) {
        let obj = match &event {
            PassProgressEvent::Started { feed, total } => serde_json::json!({
                "event": "start",
                "feed": feed,
                "total": total
            }),
            PassProgressEvent::Item {
                n,
                total,
                id,
                classification,
                outcome,
            } => serde_json::json!({
                "event": "item",
                "n": n,
                "total": total,
                "id": id,
                "classification": classification.as_str(),
                "outcome": outcome
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PassProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to the driver.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
