// src/constants.rs

/// Identifier of the synthetic root node every option hangs from.
pub const ROOT_ID: &str = "root";

/// What the graph calls its nodes in cycle errors.
pub const GRAPH_ITEM_NAME: &str = "provider option";

/// Name of the tool's configuration directory (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "devopts";

/// Environment variable overriding the configuration directory.
pub const HOME_ENV_VAR: &str = "DEVOPTS_HOME";

/// The settings file (inside the configuration directory).
pub const SETTINGS_FILENAME: &str = "settings.toml";

/// Directory holding the stored option values (inside the configuration directory).
pub const STORE_DIR_NAME: &str = "contexts";

/// File with the resolved options of one provider in one context.
pub const OPTIONS_FILENAME: &str = "options.json";

/// Context used when none is given.
pub const DEFAULT_CONTEXT: &str = "default";
