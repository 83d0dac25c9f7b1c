//! Portcullis - OIDC authenticating reverse proxy
//!
//! Main entry point for the Portcullis CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{check, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Portcullis - OIDC authenticating reverse proxy
#[derive(Parser)]
#[command(name = "portcullis")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (default: ./portcullis.toml)
    #[arg(short, long, global = true, env = "PORTCULLIS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs to a daily rotating file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway (default)
    Serve(serve::ServeArgs),

    /// Validate the configuration and exit
    Check(check::CheckArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "portcullis=debug,portcullis_server=debug,portcullis_oidc=debug,portcullis_config=debug,tower_http=debug,info"
    } else {
        "portcullis=info,portcullis_server=info,portcullis_oidc=info,warn"
    };

    // Console is human-readable; the optional file gets everything as JSON.
    let (file_layer, _guard) = match cli.log_dir {
        Some(ref dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "portcullis.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "portcullis=trace,portcullis_server=trace,portcullis_oidc=trace,portcullis_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
                ),
        )
        .with(file_layer)
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Some(Commands::Serve(args)) => serve::run(args, &ctx).await,
        Some(Commands::Check(args)) => check::run(args, &ctx),
        None => serve::run(serve::ServeArgs::default(), &ctx).await,
    }
}
