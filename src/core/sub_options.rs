// src/core/sub_options.rs

use crate::core::dependencies::{DependencySource, add_definitions, check_scope, link_pending_dependents};
use crate::core::resolver::{ResolveError, ResolvePass};
use crate::models::{OptionDefinitions, OptionValues, SubOptions};
use std::collections::BTreeSet;

impl ResolvePass<'_> {
    /// Re-runs the `subOptionsCommand` of `name` and swaps the attached
    /// sub-options for the ones it prints. Sub-options that changed lose
    /// their value and their dependents; the rest keep theirs.
    pub(crate) fn refresh_sub_options(&mut self, name: &str) -> Result<(), ResolveError> {
        let Some(definition) = self.graph.get(name).map(|node| node.data.clone()) else {
            return Ok(());
        };
        if definition.sub_options_command.is_empty() || !self.values.contains_key(name) {
            return Ok(());
        }

        let output = self.run_command(name, "subOptionsCommand", &definition.sub_options_command)?;
        let sub_options: SubOptions =
            serde_json::from_str(&output).map_err(|source| ResolveError::SubOptionsParse {
                option: name.to_string(),
                output: output.clone(),
                source,
            })?;
        let mut new_options = sub_options.options;
        new_options.retain(|child, _| {
            let is_static = self.static_definitions.contains_key(child);
            if is_static {
                log::debug!("Sub option {} of {} is defined statically, ignoring it", child, name);
            }
            !is_static
        });

        let attached = self.attached_definitions(name);
        let mut removed = Vec::new();
        for child in changed_options(&attached, &new_options, &self.values) {
            log::debug!("Sub option {} of {} changed", child, name);
            self.values.remove(&child);
            removed.extend(self.graph.remove_sub_graph(&child)?);
        }
        self.forget(&removed);

        // Static options that depended on a replaced sub-option are evaluated again.
        let restored: OptionDefinitions = removed
            .iter()
            .filter(|id| !new_options.contains_key(*id))
            .filter_map(|id| {
                self.static_definitions
                    .get(id)
                    .map(|definition| (id.clone(), definition.clone()))
            })
            .collect();
        if !restored.is_empty() {
            add_definitions(&mut self.graph, &restored, &self.values)?;
        }

        if let Some(value) = self.values.get_mut(name) {
            value.children = new_options.keys().cloned().collect();
        }
        self.graft(name, &new_options)
    }

    fn attached_definitions(&self, name: &str) -> OptionDefinitions {
        self.values
            .get(name)
            .map(|value| {
                value
                    .children
                    .iter()
                    .filter_map(|child| {
                        self.graph
                            .get(child)
                            .map(|node| (child.clone(), node.data.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn graft(&mut self, name: &str, options: &OptionDefinitions) -> Result<(), ResolveError> {
        let Some(parent) = self.graph.get(name).map(|node| node.data.clone()) else {
            return Ok(());
        };

        let mut grafted = OptionDefinitions::new();
        for (child, definition) in options {
            check_scope(child, definition, name, &parent, DependencySource::SubOptions)?;
            if !self.graph.contains(child) {
                log::debug!("Attaching sub option {} to {}", child, name);
                self.graph.insert_node_at(name, child, definition.clone())?;
            }
            self.graph.add_child(name, child)?;
            grafted.insert(child.clone(), definition.clone());
        }

        add_definitions(&mut self.graph, &grafted, &self.values)?;
        for child in grafted.keys() {
            link_pending_dependents(&mut self.graph, &mut self.values, child)?;
        }
        Ok(())
    }
}

/// Names of sub-options whose current value can no longer be trusted: those
/// that disappeared or are new, those without a value, those whose value left
/// the allowed set and those whose default changed under a computed value.
pub(crate) fn changed_options(
    old: &OptionDefinitions,
    new: &OptionDefinitions,
    values: &OptionValues,
) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = old
        .keys()
        .filter(|name| !new.contains_key(*name))
        .cloned()
        .collect();

    for (name, definition) in new {
        let Some(previous) = old.get(name) else {
            changed.insert(name.clone());
            continue;
        };
        let Some(value) = values.get(name) else {
            changed.insert(name.clone());
            continue;
        };

        let left_enum = !definition.enum_values.is_empty()
            && !definition.enum_values.contains(&value.value);
        let default_moved = !value.user_provided && previous.default != definition.default;
        if left_enum || default_moved {
            changed.insert(name.clone());
        }
    }

    changed
}
