use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that switches defaults to the container layout.
pub const CONTAINER_ENV: &str = "SEGFETCH_IN_CONTAINER";

/// Returns true when running inside the container image.
pub fn running_in_container() -> bool {
    std::env::var(CONTAINER_ENV)
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false)
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where outputs, working directories and uploads live
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Final output directory. Per-task working directories are created below it.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Directory for uploaded playlist documents.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    if running_in_container() {
        PathBuf::from("/app/downloads")
    } else {
        PathBuf::from("downloads")
    }
}

fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("segfetch_uploads")
}

/// External tool locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Segment fetcher binary (N_m3u8DL-RE compatible command line).
    #[serde(default = "default_fetcher_path")]
    pub fetcher_path: PathBuf,
    /// Transcoder binary (ffmpeg compatible command line).
    #[serde(default = "default_transcoder_path")]
    pub transcoder_path: PathBuf,
    /// Working directory for the fetcher. Defaults to the fetcher's parent directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetcher_working_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetcher_path: default_fetcher_path(),
            transcoder_path: default_transcoder_path(),
            fetcher_working_dir: None,
        }
    }
}

fn default_fetcher_path() -> PathBuf {
    if running_in_container() {
        PathBuf::from("/app/tools/N_m3u8DL-RE")
    } else {
        let binary = if cfg!(windows) {
            "N_m3u8DL-RE.exe"
        } else {
            "N_m3u8DL-RE"
        };
        PathBuf::from("tools").join("N_m3u8DL-RE").join(binary)
    }
}

fn default_transcoder_path() -> PathBuf {
    if running_in_container() {
        PathBuf::from("/usr/bin/ffmpeg")
    } else {
        PathBuf::from("ffmpeg")
    }
}

/// HTTP settings used when materializing remote playlists
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds (default: 60)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    concat!("segfetch/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
