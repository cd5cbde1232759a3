// src/system/config.rs

use crate::core::env::Env;
use crate::core::paths::{self, PathError};
use crate::models::EnvLayerType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Path(#[from] PathError),
}

/// The contents of `config.toml`.
///
/// ```toml
/// bootstrap = "env.ls"
/// env_file = "~/.local/share/cmdflow/env.toml"
/// quiet = false
///
/// [env]
/// "sleep.secs" = "2"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Script text run before every user script.
    pub bootstrap: String,
    /// Where the persisted env layer lives; `~` and `$VAR` are expanded.
    pub env_file: Option<String>,
    /// Suppresses per-command progress lines.
    pub quiet: bool,
    /// Values seeded into the default env layer.
    pub env: BTreeMap<String, String>,
}

impl AppConfig {
    /// Loads the config from `explicit`, or from the default location.
    ///
    /// A missing file is not an error: the defaults are used.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => paths::get_config_file_path()?,
        };
        if !path.exists() {
            log::debug!("No config file at '{}', using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        log::debug!("Loaded config from '{}'.", path.display());
        Self::from_toml_str(&content, &path)
    }

    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlParse {
            path: origin.display().to_string(),
            source: e,
        })
    }

    /// The persisted env file: `env_file` when set, the config dir default otherwise.
    pub fn env_file_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(match &self.env_file {
            Some(template) => paths::expand_path(template)?,
            None => paths::get_persisted_env_path()?,
        })
    }

    /// Writes the `[env]` table into the default layer of `env`'s chain.
    pub fn apply_defaults(&self, env: &Env) {
        let target = env
            .get_layer(EnvLayerType::Default)
            .unwrap_or_else(|| env.clone());
        for (key, value) in &self.env {
            target.set(key, value);
        }
    }
}
