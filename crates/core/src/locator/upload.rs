//! Ingestion of uploaded playlist documents.

use std::path::{Path, PathBuf};

use tracing::info;

use super::error::LocatorError;
use super::{has_playlist_extension, MATERIALIZED_EXTENSION};

/// Stores an uploaded playlist under `upload_dir` and returns the path to use
/// as the task locator.
///
/// The original file name is only used for the extension check; the stored
/// file gets a fresh unique name.
pub async fn store_playlist_upload(
    upload_dir: &Path,
    original_name: &str,
    contents: &[u8],
) -> Result<PathBuf, LocatorError> {
    if contents.is_empty() {
        return Err(LocatorError::EmptyUpload);
    }
    if !has_playlist_extension(Path::new(original_name)) {
        return Err(LocatorError::UnsupportedExtension {
            file_name: original_name.to_string(),
        });
    }

    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(format!(
        "{}.{}",
        uuid::Uuid::new_v4(),
        MATERIALIZED_EXTENSION
    ));
    tokio::fs::write(&path, contents).await?;

    info!(original_name, path = %path.display(), "Stored uploaded playlist");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLAYLIST: &[u8] = b"#EXTM3U\n#EXTINF:10,\nseg0.ts\n#EXT-X-ENDLIST\n";

    #[tokio::test]
    async fn test_store_upload() {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");

        let path = store_playlist_upload(&uploads, "Show.M3U", PLAYLIST)
            .await
            .unwrap();

        assert!(path.starts_with(&uploads));
        assert_eq!(path.extension().unwrap(), "m3u8");
        assert_eq!(std::fs::read(&path).unwrap(), PLAYLIST);
    }

    #[tokio::test]
    async fn test_store_upload_unique_names() {
        let dir = TempDir::new().unwrap();
        let a = store_playlist_upload(dir.path(), "a.m3u8", PLAYLIST)
            .await
            .unwrap();
        let b = store_playlist_upload(dir.path(), "a.m3u8", PLAYLIST)
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_store_upload_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let err = store_playlist_upload(dir.path(), "a.m3u8", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::EmptyUpload));
    }

    #[tokio::test]
    async fn test_store_upload_rejects_extension() {
        let dir = TempDir::new().unwrap();
        let err = store_playlist_upload(dir.path(), "video.mp4", PLAYLIST)
            .await
            .unwrap_err();
        assert!(matches!(err, LocatorError::UnsupportedExtension { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
