// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Option definitions keyed by option name.
pub type OptionDefinitions = BTreeMap<String, OptionDefinition>;

/// Resolved option values keyed by option name.
pub type OptionValues = BTreeMap<String, OptionValue>;

/// The declared type of an option. Values are validated against it, never converted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    String,
    Number,
    Boolean,
    Duration,
}

/// Static description of a configurable value: where it comes from, how it
/// is validated, at which stage it is resolved and how long it is cached.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionDefinition {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub password: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Value is shared by every workspace of a context.
    #[serde(skip_serializing_if = "is_false")]
    pub global: bool,
    /// Value is only resolved once a concrete workspace or machine exists.
    #[serde(skip_serializing_if = "is_false")]
    pub local: bool,

    /// Template, may reference other options with `${NAME}`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub default: String,
    /// Shell script whose trimmed output becomes the value.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub command: String,
    /// Shell script printing a JSON [`SubOptions`] document.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sub_options_command: String,

    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub validation_pattern: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub validation_message: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<OptionType>,

    /// Go-style duration (`10m`, `1h30m`) after which a command value is recomputed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cache: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The outcome of resolving one option in one pass, plus its provenance.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionValue {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Supplied by the user; never recomputed or invalidated.
    #[serde(skip_serializing_if = "is_false")]
    pub user_provided: bool,
    /// When the command behind this value last ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// Sub-options currently attached to this option.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl OptionValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn user_provided(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            user_provided: true,
            ..Default::default()
        }
    }
}

/// The document a `subOptionsCommand` prints.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SubOptions {
    #[serde(default)]
    pub options: OptionDefinitions,
}

/// A provider definition file as read by the CLI.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: OptionDefinitions,
}

/// What the store keeps for one provider.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredOptions {
    pub options: OptionValues,
    pub dynamic_options: OptionDefinitions,
}
