// src/cli/handlers/commons.rs

// Helpers shared by the handlers.

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    cli::args::ScopeArgs,
    core::{
        paths,
        settings::Settings,
        store::Store,
    },
    models::{OptionDefinitions, OptionValues, ProviderConfig},
};

const MASK: &str = "********";

/// Reads a provider definition (JSON when the extension says so, TOML otherwise).
/// Returns it together with the directory commands should run in.
pub fn load_provider(path: &str) -> Result<(ProviderConfig, PathBuf)> {
    let path = paths::expand_path(path)?;
    let content = fs::read_to_string(&path).with_context(|| {
        format!(
            t!("common.error.read_provider"),
            path = path.display()
        )
    })?;
    let provider = parse_provider(&path, &content)?;
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    log::debug!(
        "Loaded provider '{}' with {} options from {}",
        provider.name,
        provider.options.len(),
        path.display()
    );
    Ok((provider, dir))
}

fn parse_provider(path: &Path, content: &str) -> Result<ProviderConfig> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parse_error = || format!(t!("common.error.parse_provider"), path = path.display());

    let mut provider: ProviderConfig = if is_json {
        serde_json::from_str(content).with_context(parse_error)?
    } else {
        toml::from_str(content).with_context(parse_error)?
    };

    if provider.name.trim().is_empty() {
        provider.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(provider)
}

/// Parses repeated `KEY=VALUE` flags. Later pairs win.
pub fn parse_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                map.insert(key.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(anyhow!(format!(
                    t!("common.error.invalid_pair"),
                    pair = pair
                )));
            }
        }
    }
    Ok(map)
}

pub fn open_store(settings: &Settings) -> Result<Store> {
    let dir = settings.store_dir().context(t!("error.store"))?;
    Ok(Store::new(dir))
}

/// `aws @ default` or `aws @ default/my-workspace`.
pub fn scope_label(scope: &ScopeArgs, provider: &str) -> String {
    match &scope.workspace {
        Some(workspace) => format!("{} @ {}/{}", provider, scope.context, workspace),
        None => format!("{} @ {}", provider, scope.context),
    }
}

/// Renders one line per visible value. Password values are masked and
/// hidden options are left out.
pub fn format_values(
    values: &OptionValues,
    static_definitions: &OptionDefinitions,
    dynamic_definitions: &OptionDefinitions,
) -> Vec<String> {
    let width = values.keys().map(String::len).max().unwrap_or(0);
    let mut lines = Vec::new();

    for (name, value) in values {
        let definition = static_definitions
            .get(name)
            .or_else(|| dynamic_definitions.get(name));
        if definition.is_some_and(|d| d.hidden) {
            continue;
        }

        let shown = if definition.is_some_and(|d| d.password) && !value.value.is_empty() {
            MASK.to_string()
        } else {
            shlex::try_quote(&value.value)
                .map(|quoted| quoted.into_owned())
                .unwrap_or_else(|_| value.value.clone())
        };

        let mut labels = Vec::new();
        if value.user_provided {
            labels.push(t!("common.label.user"));
        }
        if !static_definitions.contains_key(name) {
            labels.push(t!("common.label.dynamic"));
        }
        let suffix = if labels.is_empty() {
            String::new()
        } else {
            format!("  ({})", labels.join(", ")).dimmed().to_string()
        };

        lines.push(format!(
            "  {:<width$} = {}{}",
            name.cyan(),
            shown,
            suffix,
            width = width
        ));
    }
    lines
}

pub fn print_values(
    values: &OptionValues,
    static_definitions: &OptionDefinitions,
    dynamic_definitions: &OptionDefinitions,
) {
    for line in format_values(values, static_definitions, dynamic_definitions) {
        println!("{}", line);
    }
}
