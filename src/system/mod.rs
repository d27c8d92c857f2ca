//! # System Interaction Layer
//!
//! Boundary between the resolver and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: runs `command` and `subOptionsCommand` scripts through the
//!   system shell with an extended environment, captures their output and
//!   kills them on cancellation (`Ctrl+C`) or timeout.
//! - **`prompt`**: asks the user for required values on an attached terminal.

pub mod executor;
pub mod prompt;
