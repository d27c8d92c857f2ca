// src/cli/handlers/show.rs

use anyhow::{Context, Result};
use colored::Colorize;

use super::commons;
use crate::{cli::args::ScopeArgs, core::settings};

/// The handler for `devopts show`.
pub fn handle(args: ScopeArgs) -> Result<()> {
    let settings = settings::load_settings().context(t!("error.loading_settings"))?;
    let (provider, _) = commons::load_provider(&args.provider)?;
    let store = commons::open_store(&settings)?;

    let stored = match &args.workspace {
        Some(workspace) => store.load_workspace(&args.context, workspace, &provider.name)?,
        None => store.load(&args.context, &provider.name)?,
    };

    let label = commons::scope_label(&args, &provider.name);
    if stored.options.is_empty() {
        println!("{}", format!(t!("show.info.empty"), scope = label).yellow());
        return Ok(());
    }

    println!("{}", format!(t!("show.header"), scope = label).bold());
    commons::print_values(&stored.options, &provider.options, &stored.dynamic_options);
    Ok(())
}
