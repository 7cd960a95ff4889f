//! Command line arguments.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "segfetch.toml";

#[derive(Debug, Parser)]
#[command(
    name = "segfetch",
    version,
    about = "Fetch segmented media playlists and repackage them as MP4"
)]
pub struct Cli {
    /// Configuration file (TOML). Defaults to ./segfetch.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stderr before exiting.
    #[arg(long, global = true)]
    pub metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one or more playlist URLs (or local playlist files).
    Fetch {
        /// Playlist URLs or paths. Each one becomes a task.
        #[arg(required = true)]
        locators: Vec<String>,

        /// Output file names, matched to locators by position.
        #[arg(short, long = "output", value_name = "NAME")]
        outputs: Vec<String>,
    },

    /// Ingest a local .m3u8/.m3u file as an upload, then fetch it.
    Upload {
        file: PathBuf,

        #[arg(short, long, value_name = "NAME")]
        output: Option<String>,
    },

    /// Validate configuration and external tools.
    Check,
}

/// Output names for `count` locators: explicit names by position, then
/// timestamped defaults.
pub fn output_names(count: usize, explicit: &[String], now: DateTime<Local>) -> Vec<String> {
    let stamp = now.format("%Y%m%d%H%M%S");
    (0..count)
        .map(|i| match explicit.get(i) {
            Some(name) => name.clone(),
            None if count == 1 => format!("video_{stamp}"),
            None => format!("video_{stamp}_{}", i + 1),
        })
        .collect()
}
