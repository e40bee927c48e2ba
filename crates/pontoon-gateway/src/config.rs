//! Gateway runtime settings.
//!
//! The binary crate parses CLI flags and hands the gateway one of
//! these; the library never reads the environment itself.

use crate::error::GatewayError;

/// Settings shared by the hub and every session.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// XMPP server host the component connection is made to.
    pub server: String,
    /// Port of the component socket on the XMPP server.
    pub server_port: u16,
    /// Component name. Doubles as the IRC server name in prefixes and
    /// as the domain of the synthesized per-session JIDs.
    pub component_name: String,
    /// Shared component secret.
    pub component_secret: String,
    /// MUC service domain, used to complete `#room` arguments.
    pub muc_server: String,
    /// Local port the IRC listener runs on (welcome text only).
    pub irc_port: u16,
    /// When true, channels on the configured MUC service are shown as
    /// `#room` instead of `#room@muc-server`.
    pub short_channels: bool,
}

impl GatewayConfig {
    /// Validate the parts the gateway cannot work without.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.component_name.is_empty() {
            return Err(GatewayError::config("component name must not be empty"));
        }
        if self.component_secret.is_empty() {
            return Err(GatewayError::config("component secret must not be empty"));
        }
        if self.muc_server.is_empty() {
            return Err(GatewayError::config("muc server must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig {
            server: "127.0.0.1".to_string(),
            server_port: 5347,
            component_name: "irc.example.org".to_string(),
            component_secret: "secret".to_string(),
            muc_server: "muc.example.org".to_string(),
            irc_port: 6667,
            short_channels: false,
        }
    }

    #[test]
    fn accepts_complete_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn rejects_missing_secret() {
        let mut cfg = config();
        cfg.component_secret.clear();
        assert!(cfg.validate().is_err());
    }
}
