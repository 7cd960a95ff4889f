//! Source locators: validation, playlist detection, remote materialization
//! and upload ingestion.

mod error;
mod fetcher;
mod upload;

pub use error::LocatorError;
pub use fetcher::{HttpPlaylistFetcher, PlaylistFetcher, MAX_PLAYLIST_BYTES};
pub use upload::store_playlist_upload;

use std::path::Path;

use reqwest::Url;

use crate::task::TaskError;

/// File extensions recognised as playlist documents.
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u8", "m3u"];

/// Extension given to playlists materialized on disk.
pub(crate) const MATERIALIZED_EXTENSION: &str = "m3u8";

/// Checks a caller-supplied locator and returns it trimmed.
///
/// Remote locators must be `http`/`https` URLs. Anything without a scheme is a
/// local path and has to be a playlist document already, since there is no way
/// to fetch it.
pub fn validate_locator(locator: &str) -> Result<String, TaskError> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(TaskError::Validation("locator is required".to_string()));
    }
    if locator.chars().any(char::is_control) {
        return Err(TaskError::Validation(
            "locator contains control characters".to_string(),
        ));
    }

    if locator.contains("://") {
        let url = Url::parse(locator)
            .map_err(|e| TaskError::Validation(format!("malformed locator URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TaskError::Validation(format!(
                "unsupported locator scheme: {}",
                url.scheme()
            )));
        }
    } else if !has_playlist_extension(Path::new(locator)) {
        return Err(TaskError::Validation(format!(
            "local locator must be a playlist file (.m3u8 or .m3u): {locator}"
        )));
    }

    Ok(locator.to_string())
}

/// Whether the locator already denotes a playlist document.
///
/// For URLs only the path is considered, so `a.m3u8?token=x` counts.
pub fn is_playlist_locator(locator: &str) -> bool {
    match Url::parse(locator) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            has_playlist_extension(Path::new(url.path()))
        }
        _ => has_playlist_extension(Path::new(locator)),
    }
}

pub(crate) fn has_playlist_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            PLAYLIST_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
