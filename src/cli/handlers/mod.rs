// src/cli/handlers/mod.rs

// One module per subcommand.

pub mod commons;
pub mod plan;
pub mod reset;
pub mod resolve;
pub mod show;
