//! Error types for the process runner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running an external tool.
///
/// A non-zero exit code is not an error at this level; it is reported in
/// [`ExecutionResult`](super::ExecutionResult) and classified by the caller.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Executable not found.
    #[error("Executable not found: {program}")]
    NotFound { program: PathBuf },

    /// The process could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error while waiting on the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Deadline expired; the process was killed.
    #[error("{program} timed out after {} seconds", deadline.as_secs())]
    Timeout {
        program: PathBuf,
        deadline: Duration,
        /// Last stderr lines captured before the kill.
        stderr_tail: Vec<String>,
    },
}
