// src/core/settings.rs

use crate::core::paths::{self, PathError};
use crate::core::validation::{DurationError, parse_duration};
use crate::system::executor::SystemShell;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Filesystem Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Path error: {0}")]
    Path(#[from] PathError),
    #[error("Failed to parse settings: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize settings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid command_timeout: {0}")]
    InvalidTimeout(#[source] DurationError),
}

/// Contents of `settings.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Program that runs option commands.
    pub shell: String,
    /// Arguments placed before the script.
    pub shell_args: Vec<String>,
    /// Go-style duration after which a command is killed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<String>,
    /// Whether required options may be asked for on a terminal.
    pub interactive: bool,
    /// Where resolved values are stored. Defaults to `<config dir>/contexts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let (shell, flag) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self {
            shell: shell.to_string(),
            shell_args: vec![flag.to_string()],
            command_timeout: None,
            interactive: true,
            store_dir: None,
        }
    }
}

impl Settings {
    /// The executor configured by these settings.
    pub fn shell_runner(&self) -> Result<SystemShell, SettingsError> {
        let timeout = match &self.command_timeout {
            Some(timeout) => {
                let delta = parse_duration(timeout).map_err(SettingsError::InvalidTimeout)?;
                Some(
                    delta
                        .to_std()
                        .map_err(|_| SettingsError::InvalidTimeout(DurationError(timeout.clone())))?,
                )
            }
            None => None,
        };
        Ok(SystemShell::new(&self.shell, self.shell_args.clone()).with_timeout(timeout))
    }

    pub fn store_dir(&self) -> Result<PathBuf, SettingsError> {
        match &self.store_dir {
            Some(dir) => Ok(paths::expand_path(dir)?),
            None => Ok(paths::get_default_store_dir()?),
        }
    }
}

/// Loads `settings.toml` from the configuration directory.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from(&paths::get_settings_path()?)
}

/// Loads the settings at `path`, writing the defaults there if the file is missing.
pub fn load_settings_from(path: &Path) -> Result<Settings, SettingsError> {
    if !path.exists() {
        log::debug!("Writing default settings to {}", path.display());
        let settings = Settings::default();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(&settings)?)?;
        return Ok(settings);
    }

    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
