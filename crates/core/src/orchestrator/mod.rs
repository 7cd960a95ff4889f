//! Task orchestrator.
//!
//! Runs each task through its phases, one spawned run per task:
//! - **Resolve**: non-playlist locators are materialized locally first
//! - **Fetch**: the segment fetcher assembles a single artifact (progress 0-50)
//! - **Transcode**: the transcoder remuxes it without re-encoding (progress 50-99)
//! - **Finalize**: the result is moved into place and the task completes

mod commands;
mod config;
mod runner;
mod types;
mod workspace;

pub use commands::{fetch_args, pick_artifact, transcode_args, SAVE_NAME, TRANSCODED_NAME};
pub use config::{OrchestratorConfig, PhaseDeadlines, FETCH_DEADLINE, TRANSCODE_DEADLINE};
pub use runner::TaskOrchestrator;
pub use types::{OrchestratorError, RunError, RunHandle};
