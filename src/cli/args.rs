// src/cli/args.rs
use crate::constants::DEFAULT_CONTEXT;
use clap::Args;

/// Which stored values a command works on.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Provider definition file (TOML or JSON).
    pub provider: String,

    /// Context the values belong to.
    #[arg(long, default_value = DEFAULT_CONTEXT)]
    pub context: String,

    /// Store values for a single workspace instead of the whole context.
    #[arg(long)]
    pub workspace: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Override an option (e.g., "AWS_REGION=eu-west-1").
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Make a variable available to templates and commands (e.g., "WORKSPACE_ID=api").
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Leave required options without a value unresolved instead of asking.
    #[arg(long)]
    pub skip_required: bool,

    /// Do not resolve options marked as local.
    #[arg(long)]
    pub no_local: bool,

    /// Also resolve options marked as global.
    #[arg(long)]
    pub global: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Provider definition file (TOML or JSON).
    pub provider: String,
}
