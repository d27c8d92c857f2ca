// src/core/store.rs

//! File-backed storage of resolved option values.
//!
//! Layout below the store root:
//!
//! ```text
//! <context>/providers/<provider>/options.json
//! <context>/workspaces/<workspace>/<provider>/options.json
//! ```
//!
//! Files are replaced atomically so an interrupted write never leaves a
//! truncated document behind.

use crate::constants::OPTIONS_FILENAME;
use crate::models::{OptionDefinitions, OptionValues, StoredOptions};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Filesystem Error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize stored options: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to replace '{path}': {source}")]
    Persist {
        path: String,
        #[source]
        source: tempfile::PersistError,
    },
    #[error("'{0}' is not a valid name, use letters, digits, '-', '_' and '.'")]
    InvalidName(String),
}

/// Drops the values of options defined as global; those belong to the context.
pub fn filter_global_options(
    values: &OptionValues,
    definitions: &OptionDefinitions,
) -> OptionValues {
    values
        .iter()
        .filter(|(name, _)| !definitions.get(*name).is_some_and(|d| d.global))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider_path(&self, context: &str, provider: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(checked(context)?)
            .join("providers")
            .join(checked(provider)?)
            .join(OPTIONS_FILENAME))
    }

    pub fn workspace_path(
        &self,
        context: &str,
        workspace: &str,
        provider: &str,
    ) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(checked(context)?)
            .join("workspaces")
            .join(checked(workspace)?)
            .join(checked(provider)?)
            .join(OPTIONS_FILENAME))
    }

    /// Values of `provider` in `context`. Missing files load as empty.
    pub fn load(&self, context: &str, provider: &str) -> Result<StoredOptions, StoreError> {
        read(&self.provider_path(context, provider)?)
    }

    pub fn save(
        &self,
        context: &str,
        provider: &str,
        stored: &StoredOptions,
    ) -> Result<(), StoreError> {
        write(&self.provider_path(context, provider)?, stored)
    }

    pub fn load_workspace(
        &self,
        context: &str,
        workspace: &str,
        provider: &str,
    ) -> Result<StoredOptions, StoreError> {
        read(&self.workspace_path(context, workspace, provider)?)
    }

    /// Saves the workspace values of `provider` without its global options.
    pub fn save_workspace(
        &self,
        context: &str,
        workspace: &str,
        provider: &str,
        stored: &StoredOptions,
        definitions: &OptionDefinitions,
    ) -> Result<(), StoreError> {
        let scoped = StoredOptions {
            options: filter_global_options(&stored.options, definitions),
            dynamic_options: stored.dynamic_options.clone(),
        };
        write(&self.workspace_path(context, workspace, provider)?, &scoped)
    }

    /// Deletes the stored values. Returns whether anything was deleted.
    pub fn delete(&self, context: &str, provider: &str) -> Result<bool, StoreError> {
        remove(&self.provider_path(context, provider)?)
    }

    pub fn delete_workspace(
        &self,
        context: &str,
        workspace: &str,
        provider: &str,
    ) -> Result<bool, StoreError> {
        remove(&self.workspace_path(context, workspace, provider)?)
    }
}

fn checked(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn read(path: &Path) -> Result<StoredOptions, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No stored options at {}", path.display());
            return Ok(StoredOptions::default());
        }
        Err(e) => return Err(io_error(path)(e)),
    };
    serde_json::from_str(&content).map_err(|source| StoreError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write(path: &Path, stored: &StoredOptions) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(io_error(dir))?;

    let json = serde_json::to_string_pretty(stored)?;
    let mut file = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    file.write_all(json.as_bytes()).map_err(io_error(path))?;
    file.persist(path).map_err(|source| StoreError::Persist {
        path: path.display().to_string(),
        source,
    })?;
    log::debug!("Stored options at {}", path.display());
    Ok(())
}

fn remove(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path)(e)),
    }
}
