use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Tool paths are not empty
/// - Download directory is not empty
/// - Network timeout is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.tools.fetcher_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "tools.fetcher_path cannot be empty".to_string(),
        ));
    }

    if config.tools.transcoder_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "tools.transcoder_path cannot be empty".to_string(),
        ));
    }

    if config.storage.download_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.download_dir cannot be empty".to_string(),
        ));
    }

    if config.network.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "network.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
