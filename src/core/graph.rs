// src/core/graph.rs

//! A generic dependency graph keyed by string identifiers.
//!
//! Nodes are owned by the graph's map; parents and children are stored as
//! identifiers only, so cloning and subtree removal never have to chase
//! references. An edge `from -> to` means `to` depends on `from` and must be
//! resolved after it. Every node without a real dependency hangs from a
//! synthetic root node.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Raised when an edge would close a cycle. `path` lists the cycle in
/// dependency order, starting and ending with the same node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CyclicError {
    pub what: String,
    pub path: Vec<String>,
}

impl fmt::Display for CyclicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.what.is_empty() {
            "dependency"
        } else {
            self.what.as_str()
        };
        write!(f, "Cyclic {} found: {}", what, self.path.join(" → "))
    }
}

impl std::error::Error for CyclicError {}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Parent '{0}' does not exist in the graph.")]
    ParentNotFound(String),
    #[error("Node '{0}' does not exist in the graph.")]
    NodeNotFound(String),
    #[error("Cannot remove '{0}' from the graph because other nodes still depend on it.")]
    HasChildren(String),
    #[error(transparent)]
    Cyclic(#[from] CyclicError),
}

/// A node of the graph. `parents` must resolve before this node,
/// `children` depend on it.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub id: String,
    pub data: T,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    /// Set once the topological iterator has emitted the node.
    pub done: bool,
}

impl<T> Node<T> {
    pub fn new(id: impl Into<String>, data: T) -> Self {
        Self {
            id: id.into(),
            data,
            parents: Vec::with_capacity(1),
            children: Vec::with_capacity(1),
            done: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Graph<T> {
    nodes: BTreeMap<String, Node<T>>,
    root: String,
    item: String,
}

impl<T> Graph<T> {
    /// Creates a graph holding only `root`. The root counts as already emitted.
    pub fn new(root: Node<T>) -> Self {
        Self::new_of(root, "")
    }

    /// Like [`Graph::new`], naming what the nodes are in cycle errors.
    pub fn new_of(mut root: Node<T>, item: impl Into<String>) -> Self {
        root.done = true;
        let root_id = root.id.clone();
        let mut nodes = BTreeMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            nodes,
            root: root_id,
            item: item.into(),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&Node<T>> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node<T>> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over every node except the root.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<T>> {
        self.nodes.values().filter(move |node| node.id != self.root)
    }

    /// Attaches a new node below `parent_id`. If `id` already exists, only an
    /// additional edge from `parent_id` is recorded and `data` is dropped.
    pub fn insert_node_at(
        &mut self,
        parent_id: &str,
        id: &str,
        data: T,
    ) -> Result<&Node<T>, GraphError> {
        if !self.nodes.contains_key(parent_id) {
            return Err(GraphError::ParentNotFound(parent_id.to_string()));
        }
        if self.nodes.contains_key(id) {
            self.add_edge(parent_id, id)?;
        } else {
            let mut node = Node::new(id, data);
            node.parents.push(parent_id.to_string());
            self.nodes.insert(id.to_string(), node);
            if let Some(parent) = self.nodes.get_mut(parent_id) {
                parent.children.push(id.to_string());
            }
        }

        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))
    }

    /// Records that `to_id` depends on `from_id`. Rejects edges that would
    /// close a cycle with the full cycle path.
    pub fn add_edge(&mut self, from_id: &str, to_id: &str) -> Result<(), GraphError> {
        let from = self
            .nodes
            .get(from_id)
            .ok_or_else(|| GraphError::NodeNotFound(from_id.to_string()))?;
        if !self.nodes.contains_key(to_id) {
            return Err(GraphError::NodeNotFound(to_id.to_string()));
        }
        if from.children.iter().any(|child| child == to_id) {
            return Ok(());
        }

        if let Some(path) = self.find_first_path(to_id, from_id) {
            // path runs to -> ... -> from; the new edge closes it at `to`.
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(from_id.to_string());
            cycle.extend(path);
            return Err(CyclicError {
                what: self.item.clone(),
                path: cycle,
            }
            .into());
        }

        if let Some(from) = self.nodes.get_mut(from_id) {
            from.children.push(to_id.to_string());
        }
        if let Some(to) = self.nodes.get_mut(to_id) {
            to.parents.push(from_id.to_string());
        }
        Ok(())
    }

    /// Alias of [`Graph::add_edge`]: `child_id` becomes a dependent of `parent_id`.
    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> Result<(), GraphError> {
        self.add_edge(parent_id, child_id)
    }

    /// Whether `id` depends on `dependency`, directly or through other nodes.
    pub fn depends_on(&self, id: &str, dependency: &str) -> bool {
        id != dependency && self.find_first_path(dependency, id).is_some()
    }

    /// Depth-first search for a path following child edges.
    fn find_first_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = vec![from.to_string()];
        if self.find_path_recursive(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn find_path_recursive(
        &self,
        current: &str,
        target: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        if current == target {
            return true;
        }
        visited.insert(current.to_string());

        let Some(node) = self.nodes.get(current) else {
            return false;
        };
        for child in &node.children {
            if visited.contains(child) {
                continue;
            }
            path.push(child.clone());
            if self.find_path_recursive(child, target, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Removes a node nothing depends on anymore. Unknown ids are ignored.
    pub fn remove_node(&mut self, id: &str) -> Result<(), GraphError> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };
        if !node.children.is_empty() {
            return Err(GraphError::HasChildren(id.to_string()));
        }

        let parents = node.parents.clone();
        for parent_id in parents {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|child| child != id);
            }
        }
        self.nodes.remove(id);
        Ok(())
    }

    /// Removes `id` and everything that depends on it, deepest dependents
    /// first. Returns the removed ids in removal order.
    pub fn remove_sub_graph(&mut self, id: &str) -> Result<Vec<String>, GraphError> {
        let mut removed = Vec::new();
        self.remove_sub_graph_into(id, &mut removed)?;
        Ok(removed)
    }

    fn remove_sub_graph_into(
        &mut self,
        id: &str,
        removed: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if id == self.root {
            return Err(GraphError::HasChildren(id.to_string()));
        }
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };

        // Collected up front: removing a child rewrites this node's child list.
        let children = node.children.clone();
        for child in children {
            self.remove_sub_graph_into(&child, removed)?;
        }

        self.remove_node(id)?;
        removed.push(id.to_string());
        Ok(())
    }

    /// Drops the root edge of every node that also has a real dependency, so
    /// the root never constrains the order between real nodes.
    pub fn prune_root_edges(&mut self) {
        let root = self.root.clone();
        let linked: Vec<String> = self
            .nodes
            .values()
            .filter(|node| node.parents.len() > 1 && node.parents.contains(&root))
            .map(|node| node.id.clone())
            .collect();

        for id in linked {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.parents.retain(|parent| parent != &root);
            }
            if let Some(root_node) = self.nodes.get_mut(&root) {
                root_node.children.retain(|child| child != &id);
            }
        }
    }

    /// Emits one node whose dependencies have all been emitted, or `None`
    /// once no such node remains. Among eligible nodes the smallest id wins.
    pub fn next_from_top(&mut self) -> Option<String> {
        let next = self
            .nodes
            .values()
            .find(|node| {
                !node.done
                    && node.parents.iter().all(|parent| {
                        self.nodes.get(parent).is_none_or(|parent| parent.done)
                    })
            })
            .map(|node| node.id.clone())?;

        if let Some(node) = self.nodes.get_mut(&next) {
            node.done = true;
        }
        Some(next)
    }

    /// The order in which [`Graph::next_from_top`] would emit the pending
    /// nodes, computed on a copy.
    pub fn resolution_order(&self) -> Vec<String>
    where
        T: Clone,
    {
        let mut scratch = self.clone();
        std::iter::from_fn(|| scratch.next_from_top()).collect()
    }
}
