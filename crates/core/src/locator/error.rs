//! Error types for locator handling.

use thiserror::Error;

/// Errors that can occur while materializing or ingesting a playlist.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// Request could not be sent or the body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Playlist request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Body exceeded the size accepted for a playlist document.
    #[error("Playlist from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    /// Writing the local copy failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Uploaded payload was empty.
    #[error("No file uploaded")]
    EmptyUpload,

    /// Uploaded file name does not look like a playlist.
    #[error("Only .m3u8 and .m3u files are allowed: {file_name}")]
    UnsupportedExtension { file_name: String },
}

impl LocatorError {
    /// Whether the failure came from the network rather than the local disk.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Status { .. } | Self::TooLarge { .. }
        )
    }
}
