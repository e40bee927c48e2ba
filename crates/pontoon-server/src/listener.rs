//! TCP/TLS accept loop.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pontoon_gateway::{ComponentHub, GatewayConfig, Session};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Build a TLS acceptor from one PEM file holding the certificate
/// chain and the private key.
pub fn tls_acceptor(pem_path: &Path) -> Result<TlsAcceptor> {
    let pem = std::fs::read(pem_path)
        .with_context(|| format!("reading TLS PEM file {}", pem_path.display()))?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<_, _>>()
        .context("parsing TLS certificates")?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates in {}", pem_path.display()));
    }
    let key = rustls_pemfile::private_key(&mut pem.as_slice())
        .context("parsing TLS private key")?
        .ok_or_else(|| anyhow!("no private key in {}", pem_path.display()))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS server config")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept IRC clients until shutdown. Each accepted socket completes
/// its optional TLS handshake, registers with the hub, and runs as a
/// session task; a failed handshake just closes the socket.
pub async fn run(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    hub: Arc<ComponentHub>,
    config: GatewayConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "IRC listener ready");

    loop {
        let (stream, peer_addr) = tokio::select! {
            result = listener.accept() => match result {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept IRC connection");
                    continue;
                }
            },
            _ = shutdown.cancelled() => {
                info!("Accept loop stopped");
                return Ok(());
            }
        };

        info!(peer = %peer_addr, "IRC client connected");
        let tls = tls.clone();
        let hub = Arc::clone(&hub);
        let config = config.clone();

        tokio::spawn(async move {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_client(stream, hub, config).await,
                    Err(e) => {
                        warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
                    }
                },
                None => serve_client(stream, hub, config).await,
            }
        });
    }
}

async fn serve_client<S>(stream: S, hub: Arc<ComponentHub>, config: GatewayConfig)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    match hub.register() {
        Ok(registration) => Session::new(stream, config, registration).run().await,
        Err(e) => warn!(error = %e, "Failed to register session"),
    }
}
