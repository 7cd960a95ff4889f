//! Scoped execution of external tools.
//!
//! [`ProcessRunner`] launches one subprocess per call, streams its stdout and
//! stderr line by line to a caller-supplied sink while it runs, enforces a
//! wall-clock deadline and makes sure the child is killed and reaped on every
//! exit path. On unix the tool leads its own process group, so anything it
//! started dies with it. Dropping the `run` future also kills the group.

mod error;
mod lines;
mod runner;

pub use error::ProcessError;
pub use lines::LineSplitter;
pub use runner::{ExecutionResult, Invocation, OutputLine, OutputStream, ProcessRunner};
