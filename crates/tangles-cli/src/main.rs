//! tanglesd - Main entry point

use clap::Parser;
use std::process;
use tangles_cli::{Cli, Commands, DaemonConfig, ImagesCommand};
use tangles_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tracing::error;

#[tokio::main]
async fn main() {
    // Load .env before clap reads `env = ...` defaults
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("tanglesd")
        .build();

    // Environment variables take precedence over flags
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The daemon should still run without logging
    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: failed to initialize logging: {:#}", e);
            None
        },
    };

    let code = match execute_command(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            e.exit_code()
        },
    };

    // Exit explicitly; a pending stdin read would otherwise hold the runtime open
    drop(guard);
    process::exit(code);
}

async fn execute_command(cli: Cli) -> tangles_cli::Result<()> {
    let config = DaemonConfig::from_env()?;

    match cli.command {
        Commands::Images { command } => match command {
            ImagesCommand::Process {
                store_root,
                max_in_flight,
                timeout_secs,
                max_attempts,
            } => {
                let mut config = config;
                if let Some(root) = store_root {
                    config = config.with_store_root(root);
                }
                if let Some(n) = max_in_flight {
                    config.max_in_flight = n;
                }
                if let Some(secs) = timeout_secs {
                    config.timeout_secs = secs;
                }
                if let Some(n) = max_attempts {
                    config.max_attempts = n;
                }
                tangles_cli::commands::images::run(config).await
            },
        },

        Commands::Version { feed, no_check } => {
            let mut config = config;
            if let Some(feed) = feed {
                config.updates_feed = feed;
            }
            tangles_cli::commands::version::run(&config, !no_check).await
        },
    }
}
