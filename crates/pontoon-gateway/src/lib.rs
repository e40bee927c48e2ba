//! # pontoon-gateway
//!
//! Protocol translation engine of the pontoon IRC↔XMPP gateway.
//!
//! IRC clients connect to a local listener and transparently operate
//! XMPP Multi-User Chat rooms as IRC channels. All sessions share one
//! XEP-0114 component connection; each session is addressed through a
//! synthesized random bare JID on the component domain.
//!
//! ## Architecture
//!
//! - **ComponentHub**: the shared component stream, split into a
//!   single-writer task and a reader that dispatches stanzas to
//!   sessions by bare JID ([`hub`])
//! - **Session**: one task per IRC client owning all of its state:
//!   rooms, identity map, nick-change coordinator, liveness ([`session`])
//! - **IrcCodec**: line parsing and the numeric/command formatters
//!   ([`irc`])
//!
//! The binary crate (`pontoon-server`) owns the listener, TLS, CLI
//! and logging setup.

pub mod config;
pub mod error;
pub mod hub;
pub mod identity;
pub mod irc;
pub mod nick;
pub mod room;
pub mod session;
pub mod stanza;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use hub::{ComponentHub, HubHandle, SessionRegistration};
pub use session::Session;

/// Service name, used in welcome lines, WHOIS replies and as the
/// synthetic MUC resource the gateway speaks through.
pub const GATEWAY_NAME: &str = "pontoon";

/// Version advertised in the welcome block.
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
