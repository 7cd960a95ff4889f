//! Orchestrator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::progress::ASSUMED_MEDIA_DURATION;

/// Hard wall-clock bound on the fetch phase.
pub const FETCH_DEADLINE: Duration = Duration::from_secs(3 * 3600);

/// Hard wall-clock bound on the transcode phase.
pub const TRANSCODE_DEADLINE: Duration = Duration::from_secs(3600);

/// Per-phase deadlines. Expiry kills the tool and fails the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDeadlines {
    pub fetch: Duration,
    pub transcode: Duration,
}

impl Default for PhaseDeadlines {
    fn default() -> Self {
        Self {
            fetch: FETCH_DEADLINE,
            transcode: TRANSCODE_DEADLINE,
        }
    }
}

/// Resolved settings for the task orchestrator.
///
/// Tool paths arrive here already resolved; the orchestrator never looks at
/// the environment itself.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Segment fetcher executable.
    pub fetcher_path: PathBuf,
    /// Transcoder executable, also handed to the fetcher for remuxing.
    pub transcoder_path: PathBuf,
    /// Working directory the fetcher is launched in.
    pub fetcher_working_dir: PathBuf,
    /// Final output directory; per-task working directories live below it.
    pub download_dir: PathBuf,
    pub deadlines: PhaseDeadlines,
    /// Total media length the transcode estimate is computed against.
    pub assumed_media_duration: Duration,
}

impl OrchestratorConfig {
    pub fn new(
        fetcher_path: impl Into<PathBuf>,
        transcoder_path: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        let fetcher_path = resolve_tool_path(fetcher_path.into());
        let fetcher_working_dir = default_working_dir(&fetcher_path);
        Self {
            fetcher_path,
            transcoder_path: resolve_tool_path(transcoder_path.into()),
            fetcher_working_dir,
            download_dir: absolute(download_dir.into()),
            deadlines: PhaseDeadlines::default(),
            assumed_media_duration: ASSUMED_MEDIA_DURATION,
        }
    }

    /// Builds the orchestrator settings from the application config.
    pub fn from_config(config: &Config) -> Self {
        let mut orchestrator = Self::new(
            &config.tools.fetcher_path,
            &config.tools.transcoder_path,
            &config.storage.download_dir,
        );
        if let Some(dir) = &config.tools.fetcher_working_dir {
            orchestrator.fetcher_working_dir = dir.clone();
        }
        orchestrator
    }

    pub fn with_deadlines(mut self, deadlines: PhaseDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_fetcher_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fetcher_working_dir = dir.into();
        self
    }

    /// Per-task working directory (fetch save dir and scratch space).
    pub fn working_dir_for(&self, task_id: &str) -> PathBuf {
        self.download_dir.join(task_id)
    }
}

/// The fetcher runs in its own working directory, so relative paths handed to
/// it must be made absolute. Bare program names are left for `PATH` lookup.
fn resolve_tool_path(path: PathBuf) -> PathBuf {
    if path.components().count() > 1 {
        absolute(path)
    } else {
        path
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn default_working_dir(fetcher_path: &Path) -> PathBuf {
    match fetcher_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
