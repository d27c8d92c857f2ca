//! # devopts
//!
//! Resolves the named options that parameterize development environment
//! providers. Option values may be literals, `${NAME}` templates referencing
//! other options, or the output of shell commands, and some options only
//! appear once their parent option is known (sub-options).
//!
//! The library is split in two layers:
//!
//! - [`core::graph`]: a generic dependency graph with cycle rejection and a
//!   topological iterator.
//! - [`core::resolver`]: builds a graph from option definitions and walks it
//!   in dependency order, computing, caching and validating every value.
//!
//! The [`system`] module provides the shell executor and the interactive
//! prompt used by the resolver, and [`core::store`] a file-backed store for
//! the resolved values.

include!(concat!(env!("OUT_DIR"), "/messages.rs"));

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Shared flag that aborts running commands once set.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use crate::core::graph::{CyclicError, Graph, GraphError, Node};
pub use crate::core::resolver::{ResolveError, Resolver};
pub use crate::core::variables::{resolve_default_value, resolve_default_values};
pub use crate::models::{
    OptionDefinition, OptionDefinitions, OptionType, OptionValue, OptionValues, SubOptions,
};
