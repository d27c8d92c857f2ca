// src/core/variables.rs

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};

lazy_static! {
    // `$NAME`, `${NAME}`, `${NAME:-fallback}` and `${NAME:+alternative}`.
    static ref VARIABLE_RE: Regex =
        Regex::new(r"(?m)\$\{?([A-Z0-9_]+)(:(-|\+)([^\}]+))?\}?")
            .expect("variable expression must compile");
}

/// Replaces every variable reference in `template` whose name is present in
/// `values`. Unknown references are kept verbatim.
///
/// The `:-` and `:+` forms are recognized but their branches are not applied:
/// a known name is replaced by its value, an unknown one is left untouched.
pub fn resolve_default_value(template: &str, values: &BTreeMap<String, String>) -> String {
    VARIABLE_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let full_match = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|name| values.get(name.as_str()))
                .cloned()
                .unwrap_or_else(|| full_match.to_string())
        })
        .into_owned()
}

/// Applies [`resolve_default_value`] to every entry and drops the entries
/// that end up empty.
pub fn resolve_default_values(
    templates: &BTreeMap<String, String>,
    values: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    templates
        .iter()
        .filter_map(|(key, template)| {
            let resolved = resolve_default_value(template, values);
            (!resolved.is_empty()).then(|| (key.clone(), resolved))
        })
        .collect()
}

/// Names referenced in `template`, deduplicated and sorted.
pub fn find_variables(template: &str) -> Vec<String> {
    VARIABLE_RE
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Whether `template` references `name`.
pub fn references(template: &str, name: &str) -> bool {
    VARIABLE_RE
        .captures_iter(template)
        .any(|caps| caps.get(1).is_some_and(|m| m.as_str() == name))
}
