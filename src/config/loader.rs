// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{EngineConfig, RawEngineConfig};
use crate::errors::Result;

/// Load a configuration file and return the raw, unvalidated form.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to get
/// an [`EngineConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawEngineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawEngineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = EngineConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load `path` if given, otherwise the default file if it exists, otherwise
/// built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => load_and_validate(p),
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_and_validate(default)
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

/// `loadbatch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("loadbatch.toml")
}
