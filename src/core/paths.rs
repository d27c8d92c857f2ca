// src/core/paths.rs

use crate::constants::{CONFIG_DIR_NAME, HOME_ENV_VAR, SETTINGS_FILENAME, STORE_DIR_NAME};
use lazy_static::lazy_static;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
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
    #[error("Failed to expand path '{path}': {message}")]
    Expansion { path: String, message: String },
}

/// Returns the configuration directory (`$DEVOPTS_HOME`, or `~/.config/devopts`).
/// Creates it if it doesn't exist.
///
/// The first call computes and caches the path.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = CONFIG_DIR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = locate_config_dir()?;
    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached = Some(config_path.clone());
    Ok(config_path)
}

fn locate_config_dir() -> Result<PathBuf, PathError> {
    match env::var(HOME_ENV_VAR) {
        Ok(home) if !home.trim().is_empty() => expand_path(&home),
        _ => dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or(PathError::ConfigDirNotFound),
    }
}

/// Path of `settings.toml` inside the configuration directory.
pub fn get_settings_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// Default root of the option store.
pub fn get_default_store_dir() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(STORE_DIR_NAME))
}

/// Expands `~` and environment variables in a user supplied path.
pub fn expand_path(template: &str) -> Result<PathBuf, PathError> {
    let expanded = shellexpand::full(template).map_err(|e| PathError::Expansion {
        path: template.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}
