//! Serve command - runs the gateway in the foreground.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Args;
use portcullis_server::Server;

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to listen on (overrides config)
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,

    /// Upstream URL to forward authorised requests to (overrides config)
    #[arg(short, long)]
    pub upstream: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.load_config()?;

    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(upstream) = args.upstream {
        config.upstream_url = Some(upstream);
    }
    config.validate()?;

    if ctx.verbose {
        for resource in &config.resources {
            tracing::debug!(
                uri = %resource.uri,
                methods = ?resource.methods,
                roles = ?resource.roles,
                white_listed = resource.white_listed,
                "Protected resource"
            );
        }
    }
    if config.resources.is_empty() {
        tracing::warn!("No resources configured, every request will be answered with 404");
    }

    let addr = config.listen;
    let server = Server::new(config)?;
    server.run_with_shutdown(addr, shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
