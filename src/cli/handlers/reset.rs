// src/cli/handlers/reset.rs

use anyhow::{Context, Result};
use colored::Colorize;

use super::commons;
use crate::{cli::args::ScopeArgs, core::settings};

/// The handler for `devopts reset`. Forgets stored values, so the next
/// `resolve` recomputes everything.
pub fn handle(args: ScopeArgs) -> Result<()> {
    let settings = settings::load_settings().context(t!("error.loading_settings"))?;
    let (provider, _) = commons::load_provider(&args.provider)?;
    let store = commons::open_store(&settings)?;

    let deleted = match &args.workspace {
        Some(workspace) => store.delete_workspace(&args.context, workspace, &provider.name),
        None => store.delete(&args.context, &provider.name),
    }
    .context(t!("error.store"))?;

    let label = commons::scope_label(&args, &provider.name);
    if deleted {
        println!("{}", format!(t!("reset.success"), scope = label).green());
    } else {
        println!("{}", format!(t!("reset.info.nothing"), scope = label).yellow());
    }
    Ok(())
}
