use std::fs;
use std::path::Path;

use crate::config::Settings;
use crate::error::{GatewayError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Settings> {
    let txt = fs::read_to_string(p)
        .map_err(|e| GatewayError::Config(format!("Failed to read settings file: {e}")))?;
    let mut settings: Settings = toml::from_str(&txt)
        .map_err(|e| GatewayError::Config(format!("Failed to parse settings: {e}")))?;

    if let Ok(path) = std::env::var("RATE_LIMIT_INFO_PATH") {
        if !path.is_empty() {
            settings.rate_limit_info_path = path;
        }
    }

    validate_settings(&settings)?;

    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.origin.trim().is_empty() {
        return Err(GatewayError::Config("origin cannot be empty".into()));
    }
    if settings.cache.ttl_secs == 0 {
        return Err(GatewayError::Config("cache.ttl_secs must be > 0".into()));
    }
    if settings.limits.body_buffer_bytes == 0 {
        return Err(GatewayError::Config("limits.body_buffer_bytes must be > 0".into()));
    }
    if !settings.rate_limit_info_path.starts_with('/') {
        return Err(GatewayError::Config("rate_limit_info_path must start with '/'".into()));
    }
    if let Some(rules_file) = &settings.rules_file {
        if !rules_file.exists() {
            return Err(GatewayError::Config(format!(
                "Rules file not found: {}",
                rules_file.display()
            )));
        }
    }
    Ok(())
}
