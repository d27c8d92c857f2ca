// src/core/dependencies.rs

//! Turns option definitions into a dependency graph.
//!
//! An option depends on every option its `default` or `command` references
//! and, for sub-options, on the option that attached it. Scope rules:
//! a global option may only depend on global options, and a local option may
//! only be depended upon by local options.

use crate::constants::{GRAPH_ITEM_NAME, ROOT_ID};
use crate::core::graph::{Graph, Node};
use crate::core::resolver::ResolveError;
use crate::core::variables::{find_variables, references};
use crate::models::{OptionDefinition, OptionDefinitions, OptionValues};

pub(crate) type OptionGraph = Graph<OptionDefinition>;

/// Where a dependency was found, for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencySource {
    Default,
    Command,
    SubOptions,
}

impl std::fmt::Display for DependencySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Command => "command",
            Self::SubOptions => "sub options",
        })
    }
}

/// Builds a graph with one node per definition and all dependency edges.
pub(crate) fn build_graph(
    definitions: &OptionDefinitions,
    values: &OptionValues,
) -> Result<OptionGraph, ResolveError> {
    let mut graph = Graph::new_of(Node::new(ROOT_ID, OptionDefinition::default()), GRAPH_ITEM_NAME);
    add_definitions(&mut graph, definitions, values)?;
    Ok(graph)
}

/// One option of a resolution plan and the options it waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub name: String,
    pub depends_on: Vec<String>,
}

/// The order in which `definitions` would be resolved before any sub-option
/// is discovered.
pub fn resolution_plan(
    definitions: &OptionDefinitions,
    previous: &OptionValues,
) -> Result<Vec<PlanStep>, ResolveError> {
    let graph = build_graph(definitions, previous)?;
    let steps = graph
        .resolution_order()
        .into_iter()
        .map(|name| {
            let depends_on = graph
                .get(&name)
                .map(|node| {
                    node.parents
                        .iter()
                        .filter(|parent| parent.as_str() != graph.root_id())
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            PlanStep { name, depends_on }
        })
        .collect();
    Ok(steps)
}

/// Inserts (or refreshes the definition of) every option below the root and
/// links its dependencies.
pub(crate) fn add_definitions(
    graph: &mut OptionGraph,
    definitions: &OptionDefinitions,
    values: &OptionValues,
) -> Result<(), ResolveError> {
    for (name, definition) in definitions {
        match graph.get_mut(name) {
            Some(node) => node.data = definition.clone(),
            None => {
                graph.insert_node_at(ROOT_ID, name, definition.clone())?;
            }
        }
    }

    for name in definitions.keys() {
        add_dependencies(graph, values, name)?;
    }

    graph.prune_root_edges();
    Ok(())
}

fn add_dependencies(
    graph: &mut OptionGraph,
    values: &OptionValues,
    name: &str,
) -> Result<(), ResolveError> {
    let Some(definition) = graph.get(name).map(|node| node.data.clone()) else {
        return Ok(());
    };

    // Attached sub-options always depend on the option that attached them.
    if let Some(value) = values.get(name) {
        for child in &value.children {
            if child == name {
                continue;
            }
            let Some(child_definition) = graph.get(child).map(|node| &node.data) else {
                continue;
            };
            check_scope(child, child_definition, name, &definition, DependencySource::SubOptions)?;
            graph.add_child(name, child)?;
        }
    }

    for (template, source) in [
        (&definition.default, DependencySource::Default),
        (&definition.command, DependencySource::Command),
    ] {
        for dependency in find_variables(template) {
            if dependency == name {
                continue;
            }
            let Some(dependency_definition) = graph.get(&dependency).map(|node| &node.data) else {
                continue;
            };
            check_scope(name, &definition, &dependency, dependency_definition, source)?;
            graph.add_edge(&dependency, name)?;
        }
    }

    Ok(())
}

/// Links options that reference `name`, which was grafted into the graph
/// after they were linked. Options already emitted with a computed value are
/// reopened together with their computed dependents, so they are resolved
/// again once `name` has a value.
pub(crate) fn link_pending_dependents(
    graph: &mut OptionGraph,
    values: &mut OptionValues,
    name: &str,
) -> Result<(), ResolveError> {
    let Some(definition) = graph.get(name).map(|node| node.data.clone()) else {
        return Ok(());
    };

    let mut links = Vec::new();
    for node in graph.nodes().filter(|node| node.id != name) {
        if node.done
            && (values.get(&node.id).is_some_and(|value| value.user_provided)
                || graph.depends_on(name, &node.id))
        {
            continue;
        }
        for (template, source) in [
            (&node.data.default, DependencySource::Default),
            (&node.data.command, DependencySource::Command),
        ] {
            if references(template, name) {
                check_scope(&node.id, &node.data, name, &definition, source)?;
                links.push(node.id.clone());
                break;
            }
        }
    }

    for dependent in links {
        log::debug!("Option '{}' now waits for sub option '{}'", dependent, name);
        reopen(graph, values, &dependent);
        graph.add_edge(name, &dependent)?;
    }
    graph.prune_root_edges();
    Ok(())
}

/// Marks `id` and its computed dependents as not yet emitted and drops
/// their values. User-provided values stop the walk.
fn reopen(graph: &mut OptionGraph, values: &mut OptionValues, id: &str) {
    let mut pending = vec![id.to_string()];
    while let Some(current) = pending.pop() {
        if values.get(&current).is_some_and(|value| value.user_provided) {
            continue;
        }
        let Some(node) = graph.get_mut(&current) else {
            continue;
        };
        if !node.done {
            continue;
        }
        log::debug!("Reopening option '{}'", current);
        node.done = false;
        pending.extend(node.children.iter().cloned());
        values.remove(&current);
    }
}

pub(crate) fn check_scope(
    dependent_name: &str,
    dependent: &OptionDefinition,
    dependency_name: &str,
    dependency: &OptionDefinition,
    source: DependencySource,
) -> Result<(), ResolveError> {
    if dependent.global && !dependency.global {
        return Err(ResolveError::GlobalDependsOnNonGlobal {
            dependent: dependent_name.to_string(),
            dependency: dependency_name.to_string(),
            via: source,
        });
    }
    if !dependent.local && dependency.local {
        return Err(ResolveError::NonLocalDependsOnLocal {
            dependent: dependent_name.to_string(),
            dependency: dependency_name.to_string(),
            via: source,
        });
    }
    Ok(())
}
