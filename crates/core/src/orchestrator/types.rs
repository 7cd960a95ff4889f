//! Types for the task orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::locator::LocatorError;
use crate::process::ProcessError;
use crate::task::{FailureKind, TaskError};

/// Errors raised before any run starts (tool validation, dispatch).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Task registry error.
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// A configured tool does not exist.
    #[error("{tool} not found at {}", path.display())]
    ToolNotFound { tool: &'static str, path: PathBuf },

    /// A tool exists but its self-check failed.
    #[error("{tool} check failed: {detail}")]
    ToolCheckFailed { tool: &'static str, detail: String },

    /// Filesystem error while preparing directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a dispatched run failed. Never returned to the caller that started the
/// run; it is recorded on the task and logged.
#[derive(Debug, Error)]
pub enum RunError {
    /// A tool exited with a non-zero code (or was killed by a signal).
    #[error("{tool} exited with {}: {diagnostic}", describe_exit(*exit_code))]
    ProcessExecution {
        tool: &'static str,
        exit_code: Option<i32>,
        diagnostic: String,
    },

    /// A tool could not be launched at all.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: ProcessError,
    },

    /// A phase deadline expired and the tool was terminated.
    #[error("{tool} timed out after {deadline:?} and was terminated")]
    Timeout {
        tool: &'static str,
        deadline: Duration,
        stderr_tail: Vec<String>,
    },

    /// The fetcher exited cleanly but produced nothing.
    #[error("no artifact produced in {} (present: [{}])", dir.display(), present.join(", "))]
    ArtifactMissing { dir: PathBuf, present: Vec<String> },

    /// Filesystem failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The locator could not be materialized.
    #[error("failed to resolve locator: {0}")]
    Locator(#[from] LocatorError),

    /// The registry rejected an update.
    #[error("task registry error: {0}")]
    Registry(#[from] TaskError),

    /// Anything else, including a panic inside the run.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl RunError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Tag recorded on the failed task.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ProcessExecution { .. } | Self::Launch { .. } => FailureKind::ProcessExecution,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ArtifactMissing { .. } => FailureKind::ArtifactMissing,
            Self::Io { .. } => FailureKind::Io,
            Self::Locator(e) if e.is_network() => FailureKind::Network,
            Self::Locator(_) => FailureKind::Io,
            Self::Registry(_) | Self::Unexpected(_) => FailureKind::Unexpected,
        }
    }

    /// Diagnostic text stored in the task's error detail.
    pub fn detail(&self) -> String {
        match self {
            Self::Timeout { stderr_tail, .. } if !stderr_tail.is_empty() => {
                format!("{}\n{}", self, stderr_tail.join("\n"))
            }
            _ => self.to_string(),
        }
    }
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Handle to a dispatched run.
///
/// Dropping it does not cancel the run. Failures are never surfaced here;
/// they land on the task record and in the log.
#[derive(Debug)]
pub struct RunHandle {
    task_id: String,
    handle: JoinHandle<()>,
}

impl RunHandle {
    pub(crate) fn new(task_id: String, handle: JoinHandle<()>) -> Self {
        Self { task_id, handle }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns true once the run has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to end, whatever its outcome.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let err = RunError::ProcessExecution {
            tool: "fetcher",
            exit_code: Some(2),
            diagnostic: "boom".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::ProcessExecution);
        assert_eq!(err.to_string(), "fetcher exited with exit code 2: boom");

        let err = RunError::Locator(LocatorError::Status {
            url: "http://host/x".to_string(),
            status: 404,
        });
        assert_eq!(err.kind(), FailureKind::Network);

        let err = RunError::Locator(LocatorError::Io(std::io::Error::other("disk full")));
        assert_eq!(err.kind(), FailureKind::Io);

        let err = RunError::Unexpected("panic".to_string());
        assert_eq!(err.kind(), FailureKind::Unexpected);
    }

    #[test]
    fn test_artifact_missing_lists_files() {
        let err = RunError::ArtifactMissing {
            dir: PathBuf::from("/srv/out/t1"),
            present: vec!["a.m3u8".to_string(), "log.txt".to_string()],
        };
        assert_eq!(err.kind(), FailureKind::ArtifactMissing);
        assert_eq!(
            err.to_string(),
            "no artifact produced in /srv/out/t1 (present: [a.m3u8, log.txt])"
        );
    }

    #[test]
    fn test_timeout_detail_includes_output() {
        let err = RunError::Timeout {
            tool: "transcoder",
            deadline: Duration::from_secs(3600),
            stderr_tail: vec!["frame=10".to_string()],
        };
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(
            err.detail(),
            "transcoder timed out after 3600s and was terminated\nframe=10"
        );
    }

    #[test]
    fn test_signal_exit_description() {
        let err = RunError::ProcessExecution {
            tool: "transcoder",
            exit_code: None,
            diagnostic: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
