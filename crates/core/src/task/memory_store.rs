//! In-memory task registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::locator::validate_locator;

use super::store::{TaskError, TaskStore};
use super::types::{normalize_output_name, Task, TaskUpdate};

/// Process-lifetime task registry guarded by a single reader-writer lock.
///
/// Nothing is persisted; a restart starts with an empty registry.
pub struct InMemoryTaskStore {
    output_dir: PathBuf,
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    /// Creates an empty registry whose outputs land in `output_dir`.
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref();
        // Output paths are reported as absolute locations.
        let output_dir = std::path::absolute(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());
        Self {
            output_dir,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Directory that receives final outputs.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Task>>, TaskError> {
        self.tasks
            .read()
            .map_err(|_| TaskError::Internal("task registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Task>>, TaskError> {
        self.tasks
            .write()
            .map_err(|_| TaskError::Internal("task registry lock poisoned".to_string()))
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self, locator: &str, output_name: &str) -> Result<Task, TaskError> {
        let locator = validate_locator(locator)?;
        let output_file_name = normalize_output_name(output_name)?;
        let output_path = self.output_dir.join(&output_file_name);

        let task = Task::new(locator, output_file_name, output_path);
        self.write()?.insert(task.id.clone(), task.clone());

        crate::metrics::TASKS_CREATED.inc();
        info!(task_id = %task.id, locator = %task.source_locator, output = %task.output_file_name, "Task created");
        Ok(task)
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        Ok(self.read()?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<Task>, TaskError> {
        let mut tasks: Vec<Task> = self.read()?.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn clear(&self) -> Result<usize, TaskError> {
        let mut tasks = self.write()?;
        let removed = tasks.len();
        tasks.clear();
        info!(removed, "All tasks have been cleared");
        Ok(removed)
    }

    fn reset(&self, id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        task.reset()?;
        info!(task_id = %id, "Task reset for retry");
        Ok(task.clone())
    }

    fn apply(&self, id: &str, update: TaskUpdate) -> Result<Task, TaskError> {
        let mut tasks = self.write()?;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        // Work on a copy so a rejected update leaves the record untouched.
        let mut updated = task.clone();
        updated.apply(update)?;
        if updated.status != task.status {
            debug!(task_id = %id, from = %task.status, to = %updated.status, "Task status changed");
        }
        *task = updated;
        Ok(task.clone())
    }
}
