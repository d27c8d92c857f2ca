// src/core/mod.rs

pub mod dependencies;
pub mod graph;
pub mod paths;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod sub_options;
pub mod validation;
pub mod variables;
