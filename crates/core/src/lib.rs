pub mod config;
pub mod locator;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod task;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, load_config_or_defaults, validate_config, Config,
    ConfigError, LogFormat,
};
pub use locator::{store_playlist_upload, HttpPlaylistFetcher, LocatorError, PlaylistFetcher};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, PhaseDeadlines, RunError, RunHandle, TaskOrchestrator,
};
pub use process::{ExecutionResult, Invocation, ProcessError, ProcessRunner};
pub use task::{
    FailureKind, InMemoryTaskStore, Task, TaskError, TaskStatus, TaskStore, TaskUpdate,
};
