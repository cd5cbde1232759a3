// src/core/paths.rs

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILENAME, CONFIG_PATH_ENV_VAR, PERSISTED_ENV_FILENAME,
};
use lazy_static::lazy_static;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

lazy_static! {
    static ref CMDFLOW_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}': {source}")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to expand path template '{template}': {message}")]
    Expansion { template: String, message: String },
}

/// Returns the cmdflow configuration directory (`~/.config/cmdflow`), creating it if needed.
///
/// Memoized: the first call computes and caches the path.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = CMDFLOW_CONFIG_DIR
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    // --- Cache miss ---
    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(CONFIG_DIR_NAME);

    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached = Some(config_path.clone());
    Ok(config_path)
}

/// `$CMDFLOW_CONFIG` when set, `config.toml` inside the config dir otherwise.
pub fn get_config_file_path() -> Result<PathBuf, PathError> {
    match std::env::var_os(CONFIG_PATH_ENV_VAR) {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => get_config_dir().map(|dir| dir.join(CONFIG_FILENAME)),
    }
}

/// The default location of the persisted env layer.
pub fn get_persisted_env_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(PERSISTED_ENV_FILENAME))
}

/// Expands `~` and `$VAR` / `${VAR}` in a user-supplied path.
pub fn expand_path(template: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        template: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_keeps_plain_paths() {
        assert_eq!(
            expand_path("/tmp/cmdflow/env.toml").unwrap(),
            PathBuf::from("/tmp/cmdflow/env.toml")
        );
    }

    #[test]
    fn test_expand_path_reports_unknown_variables() {
        let err = expand_path("$CMDFLOW_SURELY_UNSET_VARIABLE/x").unwrap_err();
        assert!(matches!(err, PathError::Expansion { .. }));
    }
}
