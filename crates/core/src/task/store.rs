//! Task storage trait and error type.

use thiserror::Error;

use super::types::{Task, TaskStatus, TaskUpdate};

/// Error type for task operations. Always returned synchronously to the caller.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Locator or output name rejected at creation.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Cannot perform operation due to current status.
    #[error("Cannot {operation} task {task_id}: current status is {status}")]
    Conflict {
        task_id: String,
        status: TaskStatus,
        operation: String,
    },

    /// Registry is unusable (a writer panicked while holding the lock).
    #[error("Task registry error: {0}")]
    Internal(String),
}

/// Concurrency-safe owner of all task records.
///
/// Every method observes and produces whole records: a reader never sees a
/// task with some fields of an update applied and others not.
pub trait TaskStore: Send + Sync {
    /// Validate inputs and create a new pending task.
    fn create(&self, locator: &str, output_name: &str) -> Result<Task, TaskError>;

    /// Get a snapshot of a task by ID.
    fn get(&self, id: &str) -> Result<Option<Task>, TaskError>;

    /// Snapshot of all tasks, oldest first.
    fn list(&self) -> Result<Vec<Task>, TaskError>;

    /// Remove every task. Returns how many were removed.
    fn clear(&self) -> Result<usize, TaskError>;

    /// Put a failed task back to pending (retry).
    fn reset(&self, id: &str) -> Result<Task, TaskError>;

    /// Apply one atomic update and return the resulting snapshot.
    fn apply(&self, id: &str, update: TaskUpdate) -> Result<Task, TaskError>;
}
