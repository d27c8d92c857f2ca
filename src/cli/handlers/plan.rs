// src/cli/handlers/plan.rs

use anyhow::Result;
use colored::Colorize;

use super::commons;
use crate::{
    cli::args::PlanArgs,
    core::dependencies::{PlanStep, resolution_plan},
    models::OptionValues,
};

/// The handler for `devopts plan`. Builds the dependency graph of a provider
/// and prints its resolution order without running any command.
pub fn handle(args: PlanArgs) -> Result<()> {
    let (provider, _) = commons::load_provider(&args.provider)?;
    let steps = resolution_plan(&provider.options, &OptionValues::new())?;

    if steps.is_empty() {
        println!("{}", t!("plan.info.empty").yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!(t!("plan.header"), provider = provider.name).bold()
    );
    for line in format_plan(&steps) {
        println!("{}", line);
    }
    Ok(())
}

fn format_plan(steps: &[PlanStep]) -> Vec<String> {
    let width = steps.len().to_string().len();
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let position = format!("{:>width$}.", i + 1, width = width);
            if step.depends_on.is_empty() {
                format!("  {} {}", position.dimmed(), step.name.cyan())
            } else {
                format!(
                    "  {} {} {} {}",
                    position.dimmed(),
                    step.name.cyan(),
                    "<-".dimmed(),
                    step.depends_on.join(", ")
                )
            }
        })
        .collect()
}
