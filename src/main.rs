//! # Timeline Sync CLI (`tsync`)
//!
//! ## Usage
//!
//! ```bash
//! tsync --config ./config/tsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tsync init` | Create an empty snapshot and negative cache |
//! | `tsync fetch [URL]` | Download a thread's top-level comments as a feed |
//! | `tsync sync <feed.json>` | Reconcile a feed into the snapshot |
//! | `tsync recover` | Apply the journal of an interrupted sync |
//! | `tsync apply-edits <file.tsv>` | Lay hand-curated rows over the snapshot |
//! | `tsync stats` | Summarise the snapshot |
//! | `tsync export` | Dump the snapshot as JSON |
//! | `tsync completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Classify only; no extraction calls, nothing written
//! tsync sync data/thread.json --dry-run
//!
//! # Reconcile the first 50 comments with JSON progress on stderr
//! tsync sync data/thread.json --limit 50 --progress json
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use timeline_sync::progress::ProgressMode;
use timeline_sync::reconcile::SyncOptions;
use timeline_sync::{config, edits, export, fetch, journal, reconcile, snapshot, stats};

/// Timeline Sync: incremental extraction of naturalisation timelines
/// from a comment thread into a durable TSV snapshot.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/tsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "tsync",
    about = "Timeline Sync — incremental timeline extraction and reconciliation",
    version,
    long_about = "Timeline Sync reads a thread of comments, extracts one citizenship-application \
    timeline per comment, and reconciles the results into a TSV snapshot. Unchanged, deleted and \
    already-rejected comments are never re-extracted, and known dates are never lost."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/tsync.toml`. `fetch` and `completions` also
    /// run without one.
    #[arg(long, global = true, default_value = "./config/tsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty snapshot and negative cache.
    ///
    /// Idempotent: an existing snapshot is validated and left unchanged.
    Init,

    /// Download a Reddit thread's top-level comments as a feed file.
    Fetch {
        /// Thread URL. Defaults to `fetch.thread_url` from the config.
        url: Option<String>,

        /// Where to write the feed JSON.
        #[arg(short, long, default_value = "processing_timelines_raw_data.json")]
        output: PathBuf,
    },

    /// Reconcile a feed into the snapshot.
    ///
    /// New and edited comments are sent to the extractor; everything else
    /// is carried. The snapshot is replaced atomically at the end.
    Sync {
        /// Feed JSON with a top-level `comments` array.
        feed: PathBuf,

        /// Classify only: print what would be extracted, write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Only visit the first N comments of the feed.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Apply the journal left behind by an interrupted sync.
    Recover,

    /// Lay a hand-curated snapshot over the stored one.
    ///
    /// Curated category and method win; curated dates win where known.
    ApplyEdits {
        /// Curated TSV (current or legacy header).
        curated: PathBuf,
    },

    /// Show record counts and date coverage.
    Stats,

    /// Export records and negatives as JSON.
    Export {
        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "tsync", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Fetch { url, output } => {
            let cfg =
                config::load_config(&cli.config).unwrap_or_else(|_| config::Config::minimal());
            fetch::run_fetch(&cfg.fetch, url.as_deref(), output).await?;
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            snapshot::run_init(&cfg.ledger)?;
        }
        Commands::Sync {
            feed,
            dry_run,
            limit,
            progress,
        } => {
            let opts = SyncOptions {
                dry_run,
                limit,
                progress: progress.unwrap_or_else(ProgressMode::default_for_tty),
            };
            reconcile::run_sync(&cfg, &feed, &opts).await?;
        }
        Commands::Recover => {
            journal::run_recover(&cfg)?;
        }
        Commands::ApplyEdits { curated } => {
            edits::run_apply_edits(&cfg, &curated)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Export { output } => {
            export::run_export(&cfg, output.as_deref())?;
        }
        Commands::Completions { .. } | Commands::Fetch { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
