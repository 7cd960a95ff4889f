//! Mock playlist fetcher for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::locator::{LocatorError, PlaylistFetcher};

/// Playlist served when nothing else was configured.
pub const DEFAULT_PLAYLIST: &str = "#EXTM3U\n#EXT-X-ENDLIST\n";

/// Mock implementation of the PlaylistFetcher trait.
///
/// Provides controllable behavior for testing:
/// - Track requested URLs for assertions
/// - Serve configured content
/// - Simulate HTTP failures and slow responses
///
/// # Example
///
/// ```rust,ignore
/// use segfetch_core::testing::MockPlaylistFetcher;
///
/// let fetcher = MockPlaylistFetcher::new();
/// fetcher.set_failure_status(Some(404)).await;
///
/// // Hand it to the orchestrator...
/// assert_eq!(fetcher.recorded_urls().await, vec!["http://host/page"]);
/// ```
#[derive(Debug, Clone)]
pub struct MockPlaylistFetcher {
    /// Recorded request URLs.
    urls: Arc<RwLock<Vec<String>>>,
    /// Body written for every successful fetch.
    content: Arc<RwLock<Vec<u8>>>,
    /// If set, every fetch fails with this HTTP status.
    failure_status: Arc<RwLock<Option<u16>>>,
    /// Simulated latency.
    delay: Arc<RwLock<Duration>>,
}

impl Default for MockPlaylistFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlaylistFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self {
            urls: Arc::new(RwLock::new(Vec::new())),
            content: Arc::new(RwLock::new(DEFAULT_PLAYLIST.as_bytes().to_vec())),
            failure_status: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Get all requested URLs, in order.
    pub async fn recorded_urls(&self) -> Vec<String> {
        self.urls.read().await.clone()
    }

    /// Set the body served for subsequent fetches.
    pub async fn set_content(&self, content: impl Into<Vec<u8>>) {
        *self.content.write().await = content.into();
    }

    /// Make subsequent fetches fail with the given status (`None` to succeed).
    pub async fn set_failure_status(&self, status: Option<u16>) {
        *self.failure_status.write().await = status;
    }

    /// Set the simulated latency.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl PlaylistFetcher for MockPlaylistFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, LocatorError> {
        self.urls.write().await.push(url.to_string());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = *self.failure_status.read().await {
            return Err(LocatorError::Status {
                url: url.to_string(),
                status,
            });
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!("{}.m3u8", uuid::Uuid::new_v4()));
        let content = self.content.read().await.clone();
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}
