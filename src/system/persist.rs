// src/system/persist.rs

use crate::core::env::Env;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O error on persisted env file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse persisted env file '{path}': {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize persisted env: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct PersistedEnvFile {
    #[serde(default)]
    env: BTreeMap<String, String>,
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Loads the `[env]` table of `path` into `layer`. A missing file loads nothing.
pub fn load_into(path: &Path, layer: &Env) -> Result<usize, PersistError> {
    if !path.exists() {
        return Ok(0);
    }
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    let file: PersistedEnvFile =
        toml::from_str(&content).map_err(|source| PersistError::TomlParse {
            path: path.display().to_string(),
            source,
        })?;
    for (key, value) in &file.env {
        layer.set(key, value);
    }
    log::debug!("Loaded {} persisted key(s) from '{}'.", file.env.len(), path.display());
    Ok(file.env.len())
}

/// Writes the pairs stored directly in `layer` to `path`, replacing its contents.
pub fn save_from(path: &Path, layer: &Env) -> Result<usize, PersistError> {
    let file = PersistedEnvFile {
        env: layer.own_pairs(),
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let content = toml::to_string_pretty(&file)?;
    fs::write(path, content).map_err(io_error(path))?;
    log::debug!("Saved {} key(s) to '{}'.", file.env.len(), path.display());
    Ok(file.env.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvLayerType;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("env.toml");

        let source = Env::new(EnvLayerType::Persisted);
        source.set("deploy.region", "us");
        source.set("greeting", "hello world");
        assert_eq!(save_from(&path, &source).unwrap(), 2);

        let target = Env::new(EnvLayerType::Persisted);
        assert_eq!(load_into(&path, &target).unwrap(), 2);
        assert_eq!(target.get_own("deploy.region").as_deref(), Some("us"));
        assert_eq!(target.get_own("greeting").as_deref(), Some("hello world"));
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layer = Env::new(EnvLayerType::Persisted);
        assert_eq!(load_into(&dir.path().join("none.toml"), &layer).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.toml");
        fs::write(&path, "[env\n").unwrap();
        let layer = Env::new(EnvLayerType::Persisted);
        assert!(matches!(
            load_into(&path, &layer),
            Err(PersistError::TomlParse { .. })
        ));
    }
}
