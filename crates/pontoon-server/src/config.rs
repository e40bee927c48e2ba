//! Command line flags.

use std::path::PathBuf;

use clap::Parser;
use pontoon_gateway::GatewayConfig;

/// IRC to XMPP MUC gateway.
///
/// Connects to an XMPP server as an external component and serves MUC
/// rooms to IRC clients on a local port.
#[derive(Parser, Debug)]
#[command(name = "pontoon", version)]
pub struct Cli {
    /// Port to listen for IRC connections on
    #[arg(short = 'p', long, default_value_t = 6667)]
    pub port: u16,

    /// Jabber/XMPP server to which the component connection should be made
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    pub server: String,

    /// Port to which the component connection should be made
    #[arg(short = 'P', long = "server-port", default_value_t = 5347)]
    pub server_port: u16,

    /// Address of the MUC service. Used for autocompletion of JOIN commands
    #[arg(short = 'm', long = "muc-server")]
    pub muc_server: String,

    /// Name of the component
    #[arg(short = 'c', long = "component-name")]
    pub component_name: String,

    /// Component password
    #[arg(short = 'C', long = "component-pass")]
    pub component_pass: String,

    /// SSL certificate (PEM, certificate chain plus private key).
    /// Enables TLS when provided
    #[arg(long = "ssl")]
    pub ssl: Option<PathBuf>,

    /// Diffie-Hellman parameter file for SSL
    #[arg(long = "dh")]
    pub dh: Option<PathBuf>,

    /// Fork into the background
    #[arg(short = 'd', long = "daemonize")]
    pub daemonize: bool,

    /// Log file
    #[arg(long = "log")]
    pub log: Option<PathBuf>,

    /// Show rooms on the configured MUC service as short `#room`
    /// channel names instead of `#room@muc-server`
    #[arg(long = "short-channels")]
    pub short_channels: bool,
}

impl Cli {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            server: self.server.clone(),
            server_port: self.server_port,
            component_name: self.component_name.clone(),
            component_secret: self.component_pass.clone(),
            muc_server: self.muc_server.clone(),
            irc_port: self.port,
            short_channels: self.short_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_flags_are_enforced() {
        assert!(Cli::try_parse_from(["pontoon"]).is_err());
        assert!(Cli::try_parse_from(["pontoon", "-m", "muc.example.org"]).is_err());
    }

    #[test]
    fn full_flag_set_parses() {
        let cli = Cli::try_parse_from([
            "pontoon",
            "-p",
            "6697",
            "-s",
            "xmpp.example.org",
            "-P",
            "5347",
            "-m",
            "muc.example.org",
            "-c",
            "irc.example.org",
            "-C",
            "secret",
            "--log",
            "/tmp/pontoon.log",
        ])
        .unwrap();
        assert_eq!(cli.port, 6697);
        let config = cli.gateway_config();
        assert_eq!(config.component_name, "irc.example.org");
        assert_eq!(config.muc_server, "muc.example.org");
        assert!(!config.short_channels);
    }
}
