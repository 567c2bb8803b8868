use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// The durable TSV snapshot, read at the start and replaced at the end
    /// of every pass.
    pub snapshot: PathBuf,
    /// Defaults to `<snapshot stem>.negative.tsv` next to the snapshot.
    #[serde(default)]
    pub negative_cache: Option<PathBuf>,
    #[serde(default = "default_keep_backups")]
    pub keep_backups: bool,
    /// Oldest backups beyond this many are deleted after each write.
    /// `0` keeps them all.
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

fn default_keep_backups() -> bool {
    true
}
fn default_max_backups() -> usize {
    10
}

impl LedgerConfig {
    pub fn negative_cache_path(&self) -> PathBuf {
        match &self.negative_cache {
            Some(p) => p.clone(),
            None => {
                let stem = self
                    .snapshot
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "timelines".to_string());
                self.snapshot
                    .with_file_name(format!("{}.negative.tsv", stem))
            }
        }
    }

    /// Append-only decision log of the pass in progress.
    pub fn journal_path(&self) -> PathBuf {
        with_suffix(&self.snapshot, ".journal")
    }
}

/// `path` with `suffix` appended to its file name (`a.tsv` → `a.tsv.tmp`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Minimum pause between consecutive extraction calls.
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_rate_limit_delay_ms() -> u64 {
    300
}

impl ExtractionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default)]
    pub thread_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Pause before each `morechildren` batch request.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            thread_url: None,
            user_agent: default_user_agent(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_user_agent() -> String {
    "UKNaturalisationTimelineTracker/2.0".to_string()
}
fn default_batch_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Config used by commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            ledger: LedgerConfig {
                snapshot: PathBuf::from("data/processing_timelines.tsv"),
                negative_cache: None,
                keep_backups: true,
                max_backups: default_max_backups(),
            },
            extraction: ExtractionConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate ledger
    if config.ledger.snapshot.as_os_str().is_empty() {
        anyhow::bail!("ledger.snapshot must not be empty");
    }
    if config.ledger.negative_cache_path() == config.ledger.snapshot {
        anyhow::bail!("ledger.negative_cache must differ from ledger.snapshot");
    }

    // Validate extraction
    match config.extraction.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown extraction provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.extraction.is_enabled() && config.extraction.model.is_none() {
        anyhow::bail!(
            "extraction.model must be specified when provider is '{}'",
            config.extraction.provider
        );
    }

    if config.extraction.max_retries > 10 {
        anyhow::bail!("extraction.max_retries must be <= 10");
    }

    Ok(config)
}
