//! Core task data types.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::TaskError;

/// Extension forced onto every output file name.
pub const OUTPUT_EXTENSION: &str = ".mp4";

/// Upper bound on the size of a recorded error detail.
pub const MAX_ERROR_DETAIL_BYTES: usize = 4096;

const TRUNCATION_MARKER: &str = " [truncated]";

/// Lifecycle status of a task.
///
/// ```text
/// Pending -> Fetching -> Transcoding -> Completed
///    |          |             |
///    +----------+-------------+-----> Failed -> Pending (retry only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting for a run to start.
    Pending,
    /// The fetch tool is retrieving segments.
    Fetching,
    /// The transcode tool is repackaging the fetched artifact.
    Transcoding,
    /// Output is in place (terminal for the attempt).
    Completed,
    /// The attempt failed (terminal until retried).
    Failed,
}

impl TaskStatus {
    /// Returns true if no further transition is possible within the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Returns true while a phase is running.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Fetching | TaskStatus::Transcoding)
    }

    /// Whether `self -> next` is one of the permitted edges.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Pending, Failed)
                | (Fetching, Transcoding)
                | (Fetching, Failed)
                | (Transcoding, Completed)
                | (Transcoding, Failed)
                | (Failed, Pending)
        )
    }

    /// Returns the status as a string (for logs and metrics labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Fetching => "fetching",
            TaskStatus::Transcoding => "transcoding",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failed run, recorded next to the error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A tool exited with a non-zero code.
    ProcessExecution,
    /// A phase deadline expired and the tool was killed.
    Timeout,
    /// The fetch tool succeeded but left no artifact.
    ArtifactMissing,
    /// Filesystem failure (working directory, move).
    Io,
    /// The remote locator could not be materialized.
    Network,
    /// Anything else, including panics inside the run.
    Unexpected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ProcessExecution => "process_execution",
            FailureKind::Timeout => "timeout",
            FailureKind::ArtifactMissing => "artifact_missing",
            FailureKind::Io => "io",
            FailureKind::Network => "network",
            FailureKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media retrieval task and its observable record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier (UUID v4), never reused.
    pub id: String,
    /// Playlist URL or local playlist path. Replaced once by the path of a
    /// materialized copy when the original is not a playlist document.
    pub source_locator: String,
    /// Output file name, always ending in `.mp4`.
    pub output_file_name: String,
    /// Final absolute location of the output.
    pub output_path: PathBuf,
    pub status: TaskStatus,
    /// Overall progress, 0-100.
    pub progress: u8,
    /// Diagnostic for a failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A mutation applied to a task as one atomic step.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    /// A run attempt has been dispatched.
    Started,
    /// The locator was materialized locally.
    LocatorResolved(String),
    /// Move to `Fetching` or `Transcoding`.
    Phase(TaskStatus),
    /// A new progress observation. Lower values than the current one are ignored.
    Progress(u8),
    /// The attempt finished successfully.
    Completed,
    /// The attempt failed.
    Failed { kind: FailureKind, detail: String },
}

impl Task {
    /// Creates a pending task. Inputs are expected to be validated already.
    pub fn new(
        source_locator: impl Into<String>,
        output_file_name: impl Into<String>,
        output_path: PathBuf,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_locator: source_locator.into(),
            output_file_name: output_file_name.into(),
            output_path,
            status: TaskStatus::Pending,
            progress: 0,
            error_detail: None,
            failure_kind: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies an update, enforcing the transition rules.
    pub fn apply(&mut self, update: TaskUpdate) -> Result<(), TaskError> {
        match update {
            TaskUpdate::Started => {
                self.require(TaskStatus::Pending, "start")?;
                self.started_at = Some(Utc::now());
            }
            TaskUpdate::LocatorResolved(locator) => {
                self.require(TaskStatus::Pending, "resolve locator of")?;
                self.source_locator = locator;
            }
            TaskUpdate::Phase(next) => {
                if !next.is_active() {
                    return Err(self.conflict(&format!("enter phase {} on", next)));
                }
                self.transition(next, "advance")?;
                if next == TaskStatus::Transcoding {
                    // Fetch half of the scale is done once its tool exited cleanly.
                    self.progress = self.progress.max(50);
                }
            }
            TaskUpdate::Progress(value) => {
                if !self.status.is_active() {
                    return Err(self.conflict("record progress on"));
                }
                self.progress = self.progress.max(value.min(100));
            }
            TaskUpdate::Completed => {
                self.transition(TaskStatus::Completed, "complete")?;
                self.progress = 100;
                self.completed_at = Some(Utc::now());
            }
            TaskUpdate::Failed { kind, detail } => {
                self.transition(TaskStatus::Failed, "fail")?;
                self.failure_kind = Some(kind);
                self.error_detail = Some(truncate_detail(&detail));
                self.completed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    /// Puts a failed task back to `Pending` for another attempt.
    pub fn reset(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Pending, "retry")?;
        self.progress = 0;
        self.error_detail = None;
        self.failure_kind = None;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus, operation: &str) -> Result<(), TaskError> {
        if !self.status.can_transition_to(next) {
            return Err(self.conflict(operation));
        }
        if self.status == TaskStatus::Failed {
            self.error_detail = None;
            self.failure_kind = None;
        }
        self.status = next;
        Ok(())
    }

    fn require(&self, expected: TaskStatus, operation: &str) -> Result<(), TaskError> {
        if self.status != expected {
            return Err(self.conflict(operation));
        }
        Ok(())
    }

    fn conflict(&self, operation: &str) -> TaskError {
        TaskError::Conflict {
            task_id: self.id.clone(),
            status: self.status,
            operation: operation.to_string(),
        }
    }
}

/// Validates a caller-supplied output name and forces the `.mp4` suffix.
pub fn normalize_output_name(name: &str) -> Result<String, TaskError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TaskError::Validation("output name is required".to_string()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(TaskError::Validation(format!(
            "output name must be a plain file name: {name}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(TaskError::Validation(
            "output name contains control characters".to_string(),
        ));
    }

    if name.to_ascii_lowercase().ends_with(OUTPUT_EXTENSION) {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}{OUTPUT_EXTENSION}"))
    }
}

/// Bounds a diagnostic string to [`MAX_ERROR_DETAIL_BYTES`].
pub fn truncate_detail(detail: &str) -> String {
    if detail.len() <= MAX_ERROR_DETAIL_BYTES {
        return detail.to_string();
    }
    let mut end = MAX_ERROR_DETAIL_BYTES - TRUNCATION_MARKER.len();
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &detail[..end], TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            "http://host/a.m3u8",
            "clip.mp4",
            PathBuf::from("/out/clip.mp4"),
        )
    }

    fn failed_task() -> Task {
        let mut t = task();
        t.apply(TaskUpdate::Phase(TaskStatus::Fetching)).unwrap();
        t.apply(TaskUpdate::Progress(30)).unwrap();
        t.apply(TaskUpdate::Failed {
            kind: FailureKind::ProcessExecution,
            detail: "exit code 1".to_string(),
        })
        .unwrap();
        t
    }

    #[test]
    fn test_new_task_is_pending() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.progress, 0);
        assert!(t.error_detail.is_none());
        assert!(t.failure_kind.is_none());
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(task().id, task().id);
    }

    #[test]
    fn test_allowed_edges() {
        use TaskStatus::*;
        let all = [Pending, Fetching, Transcoding, Completed, Failed];
        let allowed = [
            (Pending, Fetching),
            (Pending, Failed),
            (Fetching, Transcoding),
            (Fetching, Failed),
            (Transcoding, Completed),
            (Transcoding, Failed),
            (Failed, Pending),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let mut t = task();
        t.apply(TaskUpdate::Started).unwrap();
        assert!(t.started_at.is_some());
        t.apply(TaskUpdate::Phase(TaskStatus::Fetching)).unwrap();
        t.apply(TaskUpdate::Progress(25)).unwrap();
        t.apply(TaskUpdate::Phase(TaskStatus::Transcoding)).unwrap();
        assert_eq!(t.progress, 50);
        t.apply(TaskUpdate::Progress(75)).unwrap();
        t.apply(TaskUpdate::Completed).unwrap();
        assert_eq!(t.status, TaskStatus::Completed);
        assert_eq!(t.progress, 100);
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut t = task();
        t.apply(TaskUpdate::Phase(TaskStatus::Fetching)).unwrap();
        t.apply(TaskUpdate::Progress(40)).unwrap();
        t.apply(TaskUpdate::Progress(10)).unwrap();
        assert_eq!(t.progress, 40);
        t.apply(TaskUpdate::Progress(250)).unwrap();
        assert_eq!(t.progress, 100);
    }

    #[test]
    fn test_progress_rejected_outside_phase() {
        let mut t = task();
        let err = t.apply(TaskUpdate::Progress(10)).unwrap_err();
        assert!(matches!(err, TaskError::Conflict { .. }));
        assert_eq!(t.progress, 0);
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let mut t = task();
        let err = t.apply(TaskUpdate::Completed).unwrap_err();
        assert!(matches!(
            err,
            TaskError::Conflict {
                status: TaskStatus::Pending,
                ..
            }
        ));
        assert!(t.apply(TaskUpdate::Phase(TaskStatus::Transcoding)).is_err());
        assert!(t.apply(TaskUpdate::Phase(TaskStatus::Failed)).is_err());
    }

    #[test]
    fn test_failure_records_kind_and_detail() {
        let t = failed_task();
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.failure_kind, Some(FailureKind::ProcessExecution));
        assert_eq!(t.error_detail.as_deref(), Some("exit code 1"));
    }

    #[test]
    fn test_reset_only_from_failed() {
        let mut t = task();
        assert!(matches!(t.reset(), Err(TaskError::Conflict { .. })));

        let mut t = failed_task();
        t.reset().unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.progress, 0);
        assert!(t.error_detail.is_none());
        assert!(t.failure_kind.is_none());
        assert!(t.started_at.is_none());
        assert!(t.completed_at.is_none());
    }

    #[test]
    fn test_locator_resolution_only_while_pending() {
        let mut t = task();
        t.apply(TaskUpdate::LocatorResolved("/work/x.m3u8".to_string()))
            .unwrap();
        assert_eq!(t.source_locator, "/work/x.m3u8");
        t.apply(TaskUpdate::Phase(TaskStatus::Fetching)).unwrap();
        assert!(t
            .apply(TaskUpdate::LocatorResolved("/other.m3u8".to_string()))
            .is_err());
    }

    #[test]
    fn test_normalize_output_name() {
        assert_eq!(normalize_output_name("clip").unwrap(), "clip.mp4");
        assert_eq!(normalize_output_name("clip.mp4").unwrap(), "clip.mp4");
        assert_eq!(normalize_output_name("Clip.MP4").unwrap(), "Clip.MP4");
        assert_eq!(normalize_output_name("  movie  ").unwrap(), "movie.mp4");
        assert_eq!(normalize_output_name("show.ts").unwrap(), "show.ts.mp4");
    }

    #[test]
    fn test_normalize_output_name_rejects_bad_input() {
        for bad in ["", "   ", "../escape", "a/b", "a\\b", "..", "bad\nname"] {
            assert!(
                matches!(normalize_output_name(bad), Err(TaskError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_truncate_detail() {
        assert_eq!(truncate_detail("short"), "short");

        let long = "é".repeat(MAX_ERROR_DETAIL_BYTES);
        let truncated = truncate_detail(&long);
        assert!(truncated.len() <= MAX_ERROR_DETAIL_BYTES);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_task_serialization() {
        let t = failed_task();
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failure_kind"], "process_execution");
        let parsed: Task = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, t);
    }
}
