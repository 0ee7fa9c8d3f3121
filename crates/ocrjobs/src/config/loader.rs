use std::path::Path;

use crate::config::schema::{ServiceConfig, CONFIG_VERSION};
use crate::error::ConfigError;
use crate::validation::{MAX_RESOLUTION, SEGMENTATION_MODES};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    let invalid = |message: String| -> Result<(), ConfigError> {
        Err(ConfigError::Validation { message })
    };

    if config.version != CONFIG_VERSION {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1".to_string());
    }

    if config.database_path.trim().is_empty() {
        return invalid("database_path must not be empty".to_string());
    }

    if config.max_upload_bytes == 0 {
        return invalid("max_upload_bytes must be positive".to_string());
    }

    if !SEGMENTATION_MODES.contains(&config.ocr.default_segmentation_mode) {
        return invalid(format!(
            "ocr.default_segmentation_mode {} is not a supported mode",
            config.ocr.default_segmentation_mode
        ));
    }

    if !(1..=MAX_RESOLUTION).contains(&config.ocr.default_resolution) {
        return invalid(format!(
            "ocr.default_resolution must be between 1 and {}",
            MAX_RESOLUTION
        ));
    }

    if config.ocr.default_language.trim().is_empty() {
        return invalid("ocr.default_language must not be empty".to_string());
    }

    Ok(())
}
