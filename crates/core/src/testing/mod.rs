//! Testing utilities for exercising the orchestrator without the real tools.
//!
//! - [`MockPlaylistFetcher`] stands in for network materialization
//! - [`FakeTool`] writes shell scripts that behave like the fetch and
//!   transcode tools, so runs go through real subprocesses
//!
//! # Example
//!
//! ```rust,ignore
//! use segfetch_core::testing::{FakeTool, MockPlaylistFetcher};
//!
//! let fetcher = FakeTool::new()
//!     .stdout("50%")
//!     .create_in_save_dir("raw_video.ts")
//!     .write(tools.path(), "fetcher")?;
//! let transcoder = FakeTool::new()
//!     .stderr("time=00:00:00.00")
//!     .create_output()
//!     .write(tools.path(), "ffmpeg")?;
//! ```

#[cfg(unix)]
mod fake_tool;
mod mock_fetcher;

#[cfg(unix)]
pub use fake_tool::FakeTool;
pub use mock_fetcher::{MockPlaylistFetcher, DEFAULT_PLAYLIST};
