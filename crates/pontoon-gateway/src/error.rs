//! Error types for the gateway.

use thiserror::Error;

/// Gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// IO error (network, file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XMPP transport error (component stream)
    #[error("XMPP error: {0}")]
    Xmpp(#[from] tokio_xmpp::Error),

    /// JID parsing error
    #[error("JID error: {0}")]
    Jid(#[from] jid::Error),

    /// Component authentication failed
    #[error("Component authentication failed: {0}")]
    Auth(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared component connection is gone
    #[error("Component connection closed")]
    ComponentClosed,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a new authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
