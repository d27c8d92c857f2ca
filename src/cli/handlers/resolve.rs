// src/cli/handlers/resolve.rs

use anyhow::{Context, Result};
use colored::Colorize;

use super::commons;
use crate::{
    CancellationToken,
    cli::args::ResolveArgs,
    core::{
        resolver::Resolver,
        settings::{self, Settings},
        store::Store,
    },
    models::{OptionDefinitions, OptionValues, ProviderConfig, StoredOptions},
    system::prompt::{NoPrompt, TerminalPrompter},
};

/// The handler for `devopts resolve`.
pub fn handle(args: ResolveArgs, cancellation_token: &CancellationToken) -> Result<()> {
    let settings = settings::load_settings().context(t!("error.loading_settings"))?;
    let (provider, provider_dir) = commons::load_provider(&args.scope.provider)?;
    let store = commons::open_store(&settings)?;

    let scope = &args.scope;
    let context_stored = store.load(&scope.context, &provider.name)?;
    let previous = match &scope.workspace {
        Some(workspace) => {
            let workspace_stored = store.load_workspace(&scope.context, workspace, &provider.name)?;
            merge(&context_stored, workspace_stored)
        }
        None => context_stored.clone(),
    };

    println!(
        "{}",
        format!(
            t!("resolve.header"),
            scope = commons::scope_label(scope, &provider.name)
        )
        .bold()
    );

    let resolver = build_resolver(&args, &settings, provider_dir)?;
    let (options, dynamic_options) = resolver
        .resolve(
            cancellation_token,
            &previous.dynamic_options,
            &provider.options,
            &previous.options,
        )
        .with_context(|| format!(t!("error.resolving"), provider = provider.name))?;
    let resolved = StoredOptions {
        options,
        dynamic_options,
    };

    save(&store, &args, &provider, context_stored, &resolved)?;

    if resolved.options.is_empty() {
        println!("{}", t!("resolve.warning.no_options").yellow());
    } else {
        commons::print_values(
            &resolved.options,
            &provider.options,
            &resolved.dynamic_options,
        );
    }
    println!(
        "\n{}",
        format!(
            t!("resolve.success.saved"),
            count = resolved.options.len()
        )
        .green()
    );
    Ok(())
}

fn build_resolver(
    args: &ResolveArgs,
    settings: &Settings,
    provider_dir: std::path::PathBuf,
) -> Result<Resolver> {
    let user_options = commons::parse_pairs(&args.options)?;
    let extra_values = commons::parse_pairs(&args.vars)?;
    let runner = settings.shell_runner()?.with_cwd(Some(provider_dir));

    let resolver = Resolver::new(user_options, extra_values)
        .with_resolve_local(!args.no_local)
        .with_resolve_global(args.global)
        .with_skip_required(args.skip_required)
        .with_resolve_sub_options(true)
        .with_runner(runner);

    Ok(if settings.interactive {
        resolver.with_prompter(TerminalPrompter)
    } else {
        resolver.with_prompter(NoPrompt)
    })
}

/// Workspace values layered over the context values.
fn merge(context: &StoredOptions, workspace: StoredOptions) -> StoredOptions {
    let mut merged = context.clone();
    merged.options.extend(workspace.options);
    merged.dynamic_options.extend(workspace.dynamic_options);
    merged
}

fn save(
    store: &Store,
    args: &ResolveArgs,
    provider: &ProviderConfig,
    context_stored: StoredOptions,
    resolved: &StoredOptions,
) -> Result<()> {
    let scope = &args.scope;
    let Some(workspace) = &scope.workspace else {
        store
            .save(&scope.context, &provider.name, resolved)
            .context(t!("error.store"))?;
        return Ok(());
    };

    let mut definitions = resolved.dynamic_options.clone();
    definitions.extend(provider.options.clone());
    store
        .save_workspace(&scope.context, workspace, &provider.name, resolved, &definitions)
        .context(t!("error.store"))?;

    // Global values are shared by every workspace of the context.
    let globals = global_values(&resolved.options, &definitions);
    if !globals.is_empty() {
        let mut context_stored = context_stored;
        context_stored.options.extend(globals);
        store
            .save(&scope.context, &provider.name, &context_stored)
            .context(t!("error.store"))?;
    }
    Ok(())
}

fn global_values(values: &OptionValues, definitions: &OptionDefinitions) -> OptionValues {
    values
        .iter()
        .filter(|(name, _)| definitions.get(*name).is_some_and(|d| d.global))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
