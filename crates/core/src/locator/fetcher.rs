//! Materializes remote locators as local playlist files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;

use super::error::LocatorError;
use super::MATERIALIZED_EXTENSION;

/// Retrieves a locator's content into a local file.
#[async_trait]
pub trait PlaylistFetcher: Send + Sync {
    /// Downloads `url` into a new file inside `dest_dir` and returns its path.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, LocatorError>;
}

/// Largest playlist document accepted by default.
pub const MAX_PLAYLIST_BYTES: u64 = 16 * 1024 * 1024;

/// `reqwest` based fetcher.
///
/// The body is streamed to disk and rejected once it grows past
/// `max_body_bytes`.
pub struct HttpPlaylistFetcher {
    client: reqwest::Client,
    max_body_bytes: u64,
}

impl HttpPlaylistFetcher {
    pub fn new(config: &NetworkConfig) -> Result<Self, LocatorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            max_body_bytes: MAX_PLAYLIST_BYTES,
        })
    }

    pub fn with_max_body_bytes(mut self, limit: u64) -> Self {
        self.max_body_bytes = limit;
        self
    }

    fn too_large(&self, url: &str) -> LocatorError {
        LocatorError::TooLarge {
            url: url.to_string(),
            limit: self.max_body_bytes,
        }
    }
}

#[async_trait]
impl PlaylistFetcher for HttpPlaylistFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, LocatorError> {
        debug!(url, "Fetching playlist document");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocatorError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response
            .content_length()
            .is_some_and(|length| length > self.max_body_bytes)
        {
            return Err(self.too_large(url));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            MATERIALIZED_EXTENSION
        ));

        match self.write_body(response, &path, url).await {
            Ok(bytes) => {
                info!(url, path = %path.display(), bytes, "Playlist materialized");
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), "Failed to remove partial playlist: {}", remove_err);
                }
                Err(e)
            }
        }
    }
}

impl HttpPlaylistFetcher {
    async fn write_body(
        &self,
        response: reqwest::Response,
        path: &Path,
        url: &str,
    ) -> Result<u64, LocatorError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_body_bytes {
                return Err(self.too_large(url));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(written)
    }
}
