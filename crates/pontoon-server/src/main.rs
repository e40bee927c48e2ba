use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use pontoon_gateway::ComponentHub;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod config;
mod listener;
mod telemetry;

fn main() -> Result<()> {
    let cli = config::Cli::parse();

    // Forking must happen before the runtime and the log sink exist.
    if cli.daemonize {
        daemonize::Daemonize::new()
            .start()
            .context("daemonizing")?;
    }

    telemetry::init(cli.log.as_deref())?;

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    runtime.block_on(serve(cli))
}

async fn serve(cli: config::Cli) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "pontoon starting");

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let tls = match &cli.ssl {
        Some(pem_path) => {
            info!(cert = %pem_path.display(), "TLS enabled");
            Some(listener::tls_acceptor(pem_path)?)
        }
        None => None,
    };
    if cli.dh.is_some() {
        warn!("--dh accepted but unused: rustls has no DHE ciphersuites");
    }

    let config = cli.gateway_config();
    let hub = Arc::new(
        ComponentHub::connect(&config)
            .await
            .context("component connection failed")?,
    );
    let shutdown = hub.shutdown_token();

    let listener = TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("binding IRC port {}", cli.port))?;

    listener::run(listener, tls, hub, config, shutdown).await
}
