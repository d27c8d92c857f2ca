// src/bin/devopts.rs

use anyhow::anyhow;
use clap::Parser;
use colored::*;
use devopts::{
    CancellationToken, ResolveError, t,
    cli::{Cli, dispatcher},
    system::executor::ExecutionError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The main entry point of `devopts`.
/// Sets up logging and interrupt handling, runs the command on a blocking
/// thread and performs centralized error handling.
#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_interrupts(cancellation_token.clone()));

    let token = cancellation_token.clone();
    let result = tokio::task::spawn_blocking(move || dispatcher::dispatch(cli, &token))
        .await
        .unwrap_or_else(|e| Err(anyhow!(e)));

    if let Err(e) = result {
        // --- Centralized Error Handling ---
        if was_cancelled(&e) {
            eprintln!("\n{}", t!("common.info.cancelled").yellow());
            std::process::exit(130);
        }
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// The first Ctrl+C cancels the running command, the second one exits.
async fn watch_interrupts(cancellation_token: CancellationToken) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if cancellation_token.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        log::debug!("Interrupt received, cancelling");
    }
}

fn was_cancelled(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(cause.downcast_ref::<ResolveError>(), Some(ResolveError::Cancelled { .. }))
            || matches!(
                cause.downcast_ref::<ExecutionError>(),
                Some(ExecutionError::Cancelled)
            )
    })
}
