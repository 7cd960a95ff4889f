//! Task orchestrator implementation.
//!
//! Drives one task through resolve -> fetch -> transcode -> finalize:
//! - Each run is spawned on its own tokio task (fire-and-forget)
//! - At most one run per task id is in flight
//! - Failures are classified, recorded on the task and logged; the caller
//!   that started the run only ever observes them by polling the registry

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::locator::{is_playlist_locator, PlaylistFetcher};
use crate::metrics;
use crate::process::{Invocation, ProcessError, ProcessRunner};
use crate::progress::{fetch_progress, transcode_progress};
use crate::task::{Task, TaskError, TaskStatus, TaskStore, TaskUpdate};

use super::commands::{fetch_args, transcode_args, transcoded_path};
use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, RunError, RunHandle};
use super::workspace;

/// Deadline for the transcoder's `-version` probe.
const TOOL_CHECK_DEADLINE: Duration = Duration::from_secs(30);

/// The two tool-driven phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetch,
    Transcode,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Fetch => "fetch",
            Phase::Transcode => "transcode",
        }
    }

    fn tool(&self) -> &'static str {
        match self {
            Phase::Fetch => "fetcher",
            Phase::Transcode => "transcoder",
        }
    }

    fn status(&self) -> TaskStatus {
        match self {
            Phase::Fetch => TaskStatus::Fetching,
            Phase::Transcode => TaskStatus::Transcoding,
        }
    }
}

/// Membership of a task id in the active-run set, released on drop.
struct ActiveRun {
    active: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl ActiveRun {
    /// Returns `None` if a run for `task_id` is already in flight.
    fn acquire(active: &Arc<Mutex<HashSet<String>>>, task_id: &str) -> Option<Self> {
        let mut set = active.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(task_id.to_string()) {
            return None;
        }
        metrics::RUNS_ACTIVE.inc();
        Some(Self {
            active: Arc::clone(active),
            task_id: task_id.to_string(),
        })
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
        metrics::RUNS_ACTIVE.dec();
    }
}

/// The task orchestrator - runs tasks through the fetch/transcode pipeline.
#[derive(Clone)]
pub struct TaskOrchestrator {
    config: Arc<OrchestratorConfig>,
    store: Arc<dyn TaskStore>,
    fetcher: Arc<dyn PlaylistFetcher>,
    runner: ProcessRunner,
    active: Arc<Mutex<HashSet<String>>>,
}

impl TaskOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn TaskStore>,
        fetcher: Arc<dyn PlaylistFetcher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            fetcher,
            runner: ProcessRunner::new(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Ids of tasks with a run in flight.
    pub fn active_runs(&self) -> Vec<String> {
        let set = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = set.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Checks that both tools are usable and the download directory exists.
    pub async fn validate(&self) -> Result<(), OrchestratorError> {
        let fetcher = &self.config.fetcher_path;
        if !fetcher.is_file() {
            return Err(OrchestratorError::ToolNotFound {
                tool: "fetcher",
                path: fetcher.clone(),
            });
        }

        let transcoder = &self.config.transcoder_path;
        let probe = Invocation::new(transcoder, TOOL_CHECK_DEADLINE).arg("-version");
        match self.runner.run(&probe, |_| {}).await {
            Ok(result) if result.success() => {
                let version = result.stdout_tail.first().cloned().unwrap_or_default();
                debug!(transcoder = %transcoder.display(), version = %version, "Transcoder available");
            }
            Ok(result) => {
                return Err(OrchestratorError::ToolCheckFailed {
                    tool: "transcoder",
                    detail: result.diagnostic(),
                })
            }
            Err(ProcessError::NotFound { .. }) => {
                return Err(OrchestratorError::ToolNotFound {
                    tool: "transcoder",
                    path: transcoder.clone(),
                })
            }
            Err(e) => {
                return Err(OrchestratorError::ToolCheckFailed {
                    tool: "transcoder",
                    detail: e.to_string(),
                })
            }
        }

        tokio::fs::create_dir_all(&self.config.download_dir).await?;
        info!(
            fetcher = %fetcher.display(),
            transcoder = %transcoder.display(),
            download_dir = %self.config.download_dir.display(),
            "Tools validated"
        );
        Ok(())
    }

    /// Dispatches a run for a pending task and returns immediately.
    ///
    /// Fails with `NotFound` for an unknown id and `Conflict` when the task is
    /// not pending or a run for it is already in flight. Everything that goes
    /// wrong after dispatch is recorded on the task instead.
    pub fn start(&self, task_id: &str) -> Result<RunHandle, TaskError> {
        let task = self
            .store
            .get(task_id)?
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        let guard = ActiveRun::acquire(&self.active, task_id).ok_or_else(|| {
            TaskError::Conflict {
                task_id: task_id.to_string(),
                status: task.status,
                operation: "start".to_string(),
            }
        })?;
        let task = self.store.apply(task_id, TaskUpdate::Started)?;

        metrics::RUNS_STARTED.inc();
        info!(task_id, locator = %task.source_locator, "Run dispatched");

        let this = self.clone();
        let handle = tokio::spawn(async move {
            this.execute(task, guard).await;
        });
        Ok(RunHandle::new(task_id.to_string(), handle))
    }

    /// Resets a failed task and dispatches a fresh run.
    pub fn retry(&self, task_id: &str) -> Result<RunHandle, TaskError> {
        self.store.reset(task_id)?;
        self.start(task_id)
    }

    async fn execute(self, task: Task, guard: ActiveRun) {
        let task_id = task.id.clone();
        let started = Instant::now();

        let result = match AssertUnwindSafe(self.run_attempt(task)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(RunError::Unexpected(panic_message(panic.as_ref()))),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                metrics::RUNS_FINISHED.with_label_values(&["completed"]).inc();
                info!(task_id = %task_id, elapsed_ms, "Task completed");
            }
            Err(e) => self.record_failure(&task_id, &e, elapsed_ms),
        }
        // Released only once the outcome is visible: a run that fails before
        // leaving `Pending` must not let another start slip in.
        drop(guard);
    }

    fn record_failure(&self, task_id: &str, err: &RunError, elapsed_ms: u64) {
        let kind = err.kind();
        metrics::RUNS_FINISHED
            .with_label_values(&[kind.as_str()])
            .inc();
        error!(task_id, kind = %kind, elapsed_ms, "Task failed: {}", err);

        let update = TaskUpdate::Failed {
            kind,
            detail: err.detail(),
        };
        if let Err(e) = self.store.apply(task_id, update) {
            warn!(task_id, "Failed to record task failure: {}", e);
        }
    }

    async fn run_attempt(&self, task: Task) -> Result<(), RunError> {
        let task_id = task.id.as_str();
        let work_dir = self.config.working_dir_for(task_id);
        workspace::prepare(&work_dir).await?;

        // Resolve locator
        let locator = if is_playlist_locator(&task.source_locator) {
            local_or_remote(&task.source_locator)
        } else {
            let path = self.fetcher.fetch(&task.source_locator, &work_dir).await?;
            let resolved = path.to_string_lossy().into_owned();
            self.store
                .apply(task_id, TaskUpdate::LocatorResolved(resolved.clone()))?;
            info!(task_id, locator = %resolved, "Locator materialized");
            resolved
        };

        // Fetch
        let fetch = Invocation::new(&self.config.fetcher_path, self.config.deadlines.fetch)
            .args(fetch_args(&locator, &work_dir, &self.config.transcoder_path))
            .working_dir(&self.config.fetcher_working_dir);
        self.run_phase(task_id, Phase::Fetch, &fetch, fetch_progress)
            .await?;

        let artifact = workspace::locate_artifact(&work_dir).await?;
        debug!(task_id, artifact = %artifact.display(), "Artifact located");

        // Transcode
        let scratch = transcoded_path(&work_dir);
        let transcode =
            Invocation::new(&self.config.transcoder_path, self.config.deadlines.transcode)
                .args(transcode_args(&artifact, &scratch));
        let assumed = self.config.assumed_media_duration;
        self.run_phase(task_id, Phase::Transcode, &transcode, move |line| {
            transcode_progress(line, assumed)
        })
        .await?;

        // Finalize
        if !tokio::fs::try_exists(&scratch).await.unwrap_or(false) {
            return Err(RunError::ArtifactMissing {
                dir: work_dir.clone(),
                present: workspace::list_files(&work_dir).await?,
            });
        }
        workspace::move_into_place(&scratch, &task.output_path).await?;
        workspace::remove(&work_dir).await;

        self.store.apply(task_id, TaskUpdate::Completed)?;
        info!(task_id, output = %task.output_path.display(), "Output in place");
        Ok(())
    }

    /// Enters `phase`, runs its tool and feeds output lines to `parse`.
    async fn run_phase<P>(
        &self,
        task_id: &str,
        phase: Phase,
        invocation: &Invocation,
        parse: P,
    ) -> Result<(), RunError>
    where
        P: Fn(&str) -> Option<u8> + Send,
    {
        self.store.apply(task_id, TaskUpdate::Phase(phase.status()))?;
        info!(task_id, phase = phase.as_str(), tool = phase.tool(), "Phase started");

        let started = Instant::now();
        let store = Arc::clone(&self.store);
        let mut reported = 0u8;
        let result = self
            .runner
            .run(invocation, move |line| {
                let Some(value) = parse(&line.text) else {
                    return;
                };
                if value <= reported {
                    return;
                }
                reported = value;
                if let Err(e) = store.apply(task_id, TaskUpdate::Progress(value)) {
                    debug!(task_id, "Progress update rejected: {}", e);
                }
            })
            .await;

        let outcome = match result {
            Ok(execution) if execution.success() => Ok(()),
            Ok(execution) => Err(RunError::ProcessExecution {
                tool: phase.tool(),
                exit_code: execution.exit_code,
                diagnostic: execution.diagnostic(),
            }),
            Err(ProcessError::Timeout {
                deadline,
                stderr_tail,
                ..
            }) => Err(RunError::Timeout {
                tool: phase.tool(),
                deadline,
                stderr_tail,
            }),
            Err(e) => Err(RunError::Launch {
                tool: phase.tool(),
                source: e,
            }),
        };

        let elapsed = started.elapsed();
        let label = if outcome.is_ok() { "success" } else { "failed" };
        metrics::PHASE_DURATION
            .with_label_values(&[phase.as_str(), label])
            .observe(elapsed.as_secs_f64());
        info!(
            task_id,
            phase = phase.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            result = label,
            "Phase finished"
        );
        outcome
    }
}

/// URLs pass through; local playlist paths are made absolute because the
/// fetcher runs in its own working directory.
fn local_or_remote(locator: &str) -> String {
    if locator.contains("://") {
        return locator.to_string();
    }
    let path = Path::new(locator);
    std::path::absolute(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .into_owned()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("run panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("run panicked: {message}")
    } else {
        "run panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::InMemoryTaskStore;
    use crate::testing::MockPlaylistFetcher;
    use tempfile::TempDir;

    fn orchestrator(out: &Path) -> (TaskOrchestrator, Arc<InMemoryTaskStore>) {
        orchestrator_with_fetcher(out, MockPlaylistFetcher::new())
    }

    fn orchestrator_with_fetcher(
        out: &Path,
        fetcher: MockPlaylistFetcher,
    ) -> (TaskOrchestrator, Arc<InMemoryTaskStore>) {
        let store = Arc::new(InMemoryTaskStore::new(out));
        let config = OrchestratorConfig::new(
            "/nonexistent/segfetch-fetcher",
            "/nonexistent/segfetch-ffmpeg",
            out,
        );
        let orchestrator = TaskOrchestrator::new(
            config,
            Arc::clone(&store) as Arc<dyn TaskStore>,
            Arc::new(fetcher),
        );
        (orchestrator, store)
    }

    #[tokio::test]
    async fn test_start_unknown_task() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp.path());
        let err = orchestrator.start("missing").unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_retry_requires_failed() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(temp.path());
        let task = store.create("http://host/a.m3u8", "clip").unwrap();
        let err = orchestrator.retry(&task.id).unwrap_err();
        assert!(matches!(err, TaskError::Conflict { .. }));
        assert_eq!(store.get(&task.id).unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_active_set_released_after_run() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, store) = orchestrator(temp.path());
        let task = store.create("http://host/a.m3u8", "clip").unwrap();

        // The fetcher does not exist, so the run fails at launch.
        let handle = orchestrator.start(&task.id).unwrap();
        handle.join().await;

        assert!(orchestrator.active_runs().is_empty());
        let task = store.get(&task.id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure_kind, Some(crate::task::FailureKind::ProcessExecution));
        assert!(task.error_detail.unwrap().contains("failed to launch fetcher"));
        assert!(task.started_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_second_run_while_early_failure_is_recorded() {
        let temp = TempDir::new().unwrap();
        let fetcher = MockPlaylistFetcher::new();
        fetcher.set_failure_status(Some(500)).await;
        let (orchestrator, store) = orchestrator_with_fetcher(temp.path(), fetcher.clone());

        for i in 0..200 {
            let task = store
                .create("http://host/watch?v=1", &format!("clip{i}"))
                .unwrap();
            let handle = orchestrator.start(&task.id).unwrap();
            while !handle.is_finished() {
                assert!(
                    orchestrator.start(&task.id).is_err(),
                    "second run accepted for {}",
                    task.id
                );
                tokio::task::yield_now().await;
            }
            handle.join().await;

            assert!(orchestrator.start(&task.id).is_err());
            let task = store.get(&task.id).unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Failed);
            assert_eq!(task.failure_kind, Some(crate::task::FailureKind::Network));
        }
        assert_eq!(fetcher.recorded_urls().await.len(), 200);
    }

    #[tokio::test]
    async fn test_validate_missing_fetcher() {
        let temp = TempDir::new().unwrap();
        let (orchestrator, _) = orchestrator(temp.path());
        let err = orchestrator.validate().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::ToolNotFound { tool: "fetcher", .. }
        ));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "run panicked: boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "run panicked: bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(payload.as_ref()), "run panicked");
    }

    #[test]
    fn test_local_or_remote() {
        assert_eq!(local_or_remote("http://host/a.m3u8"), "http://host/a.m3u8");
        assert!(Path::new(&local_or_remote("lists/a.m3u8")).is_absolute());
    }
}
