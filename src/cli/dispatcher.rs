// src/cli/dispatcher.rs

use anyhow::Result;

use crate::{
    CancellationToken,
    cli::{Cli, Command, handlers},
};

/// Routes a parsed command line to its handler.
pub fn dispatch(cli: Cli, cancellation_token: &CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    match cli.command {
        Command::Resolve(args) => handlers::resolve::handle(args, cancellation_token),
        Command::Plan(args) => handlers::plan::handle(args),
        Command::Show(args) => handlers::show::handle(args),
        Command::Reset(args) => handlers::reset::handle(args),
    }
}
