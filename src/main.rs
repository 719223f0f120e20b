// src/main.rs

use anyhow::Result;
use apger::CancelFlag;
use clap::{CommandFactory, Parser};
use tracing::warn;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Flip `cancel` on Ctrl-C so the running step is stopped and cleaned up
fn install_interrupt_handler(cancel: CancelFlag) {
    let spawned = std::thread::Builder::new()
        .name("apger-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!("Cannot install interrupt handler: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping the running step...");
                    cancel.cancel();
                }
            });
        });
    if let Err(e) = spawned {
        warn!("Cannot install interrupt handler: {}", e);
    }
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let cancel = CancelFlag::new();
    if matches!(
        cli.command,
        Commands::Cook { .. } | Commands::CookAll { .. } | Commands::Fetch { .. }
    ) {
        install_interrupt_handler(cancel.clone());
    }

    match cli.command {
        Commands::Cook {
            recipe,
            overrides,
            log_file,
        } => commands::cmd_cook(&recipe, config, &overrides, log_file.as_ref(), cancel),
        Commands::CookAll {
            recipes,
            parallel,
            overrides,
        } => commands::cmd_cook_all(&recipes, parallel, config, &overrides, cancel),
        Commands::Validate { recipe, resolve } => commands::cmd_validate(&recipe, config, resolve),
        Commands::Fetch { recipe, dest } => commands::cmd_fetch(&recipe, &dest, config, cancel),
        Commands::Inspect {
            package,
            files,
            format,
            public_key,
        } => commands::cmd_inspect(&package, files, &format, public_key.as_deref()),
        Commands::Keygen {
            output,
            key_id,
            force,
        } => commands::cmd_keygen(&output, key_id.as_deref(), force),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "apger", &mut std::io::stdout());
            Ok(())
        }
    }
}
