//! The component hub: one XEP-0114 connection shared by all sessions.
//!
//! The hub owns the component stream and fans it out. Outbound stanzas
//! from every session funnel through one bounded channel into a single
//! writer task, so wire order matches hand-off order per session and
//! the socket has exactly one writer. Inbound stanzas are dispatched
//! to sessions by the bare `to` JID through a concurrent registry;
//! a failed delivery is logged and dropped, never propagated — one
//! sick session must not take the hub down. When the component stream
//! itself dies, a cancellation token tells every session to wind down.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use jid::BareJid;
use minidom::Element;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tokio_xmpp::tcp::TcpComponent as Component;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::stanza::Stanza;

/// RFC 6122 localparts are generated from this alphabet.
const LOCALPART_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const LOCALPART_LEN: usize = 20;

/// Depth of the shared outbound queue feeding the writer task.
const OUTBOUND_QUEUE: usize = 64;
/// Depth of each session's inbound queue.
const SESSION_QUEUE: usize = 256;

/// Pause before the reader starts processing, letting the component
/// stream setup settle.
const READER_SETTLE: Duration = Duration::from_secs(5);

type ClientMap = Arc<DashMap<BareJid, mpsc::Sender<Stanza>>>;

/// The shared component connection and session registry.
pub struct ComponentHub {
    domain: String,
    clients: ClientMap,
    outbound: mpsc::Sender<Element>,
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Everything a freshly accepted session needs from the hub.
pub struct SessionRegistration {
    /// The synthesized bare JID this session owns.
    pub bare_jid: BareJid,
    /// Narrow interface back into the hub.
    pub handle: HubHandle,
    /// Inbound stanzas addressed to `bare_jid`.
    pub inbound: mpsc::Receiver<Stanza>,
}

impl ComponentHub {
    /// Authenticate the component connection and start the reader and
    /// writer tasks.
    pub async fn connect(config: &GatewayConfig) -> Result<ComponentHub, GatewayError> {
        config.validate()?;

        let addr = format!("{}:{}", config.server, config.server_port);
        info!(addr = %addr, component = %config.component_name, "Connecting XMPP component");

        let component = Component::new(&config.component_name, &config.component_secret, addr)
            .await
            .map_err(|e| match e {
            tokio_xmpp::Error::Auth(auth) => GatewayError::auth(auth.to_string()),
            other => GatewayError::Xmpp(other),
        })?;

        info!(jid = %component.jid, "Component authenticated");

        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let clients: ClientMap = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        let (sink, stream) = component.split();
        tokio::spawn(writer_task(sink, outbound_rx, shutdown.clone()));
        tokio::spawn(reader_task(stream, Arc::clone(&clients), shutdown.clone()));

        Ok(ComponentHub {
            domain: config.component_name.clone(),
            clients,
            outbound,
            shutdown,
            started_at: Utc::now(),
        })
    }

    /// Register a new session under a fresh random bare JID, retrying
    /// on the (unlikely) collision.
    pub fn register(&self) -> Result<SessionRegistration, GatewayError> {
        let (tx, inbound) = mpsc::channel(SESSION_QUEUE);
        loop {
            let bare_jid = BareJid::new(&format!("{}@{}", random_localpart(), self.domain))?;
            match self.clients.entry(bare_jid.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(vacant) => {
                    vacant.insert(tx);
                    debug!(jid = %bare_jid, "Registered session");
                    return Ok(SessionRegistration {
                        bare_jid,
                        handle: self.handle(),
                        inbound,
                    });
                }
            }
        }
    }

    /// The narrow hub interface handed to sessions.
    pub fn handle(&self) -> HubHandle {
        HubHandle {
            outbound: self.outbound.clone(),
            clients: Arc::clone(&self.clients),
            shutdown: self.shutdown.clone(),
            started_at: self.started_at,
        }
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.clients.len()
    }

    /// Token cancelled when the component connection dies.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// What a session may do with the hub: send stanzas and unregister
/// itself. Sessions never see each other.
#[derive(Clone)]
pub struct HubHandle {
    outbound: mpsc::Sender<Element>,
    clients: ClientMap,
    shutdown: CancellationToken,
    started_at: DateTime<Utc>,
}

impl HubHandle {
    /// Build a handle around an explicit outbound channel, without a
    /// live component connection. Used by tests and embedders that
    /// drive a session against a fake component.
    pub fn detached(outbound: mpsc::Sender<Element>) -> HubHandle {
        HubHandle {
            outbound,
            clients: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Queue a stanza for the component writer. Order is preserved
    /// per caller.
    pub async fn send(&self, stanza: impl Into<Element>) -> Result<(), GatewayError> {
        self.outbound
            .send(stanza.into())
            .await
            .map_err(|_| GatewayError::ComponentClosed)
    }

    /// Drop a session's registry entry.
    pub fn unregister(&self, bare_jid: &BareJid) {
        if self.clients.remove(bare_jid).is_some() {
            debug!(jid = %bare_jid, "Unregistered session");
        }
    }

    /// Cancelled when the component connection dies.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Hub start time in the ctime-style format of the welcome block.
    pub fn start_time_text(&self) -> String {
        self.started_at.format("%a %b %e %H:%M:%S %Y").to_string()
    }

    /// Hub start time as a unix timestamp, for 329.
    pub fn start_unix(&self) -> i64 {
        self.started_at.timestamp()
    }
}

async fn writer_task<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Element>,
    shutdown: CancellationToken,
) where
    S: futures::Sink<Element, Error = tokio_xmpp::Error> + Unpin,
{
    loop {
        tokio::select! {
            element = outbound.recv() => {
                let Some(element) = element else { break };
                if let Err(e) = sink.send(element).await {
                    error!(error = %e, "Component write failed, shutting down");
                    shutdown.cancel();
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

async fn reader_task<S>(mut stream: S, clients: ClientMap, shutdown: CancellationToken)
where
    S: futures::Stream<Item = Element> + Unpin,
{
    sleep(READER_SETTLE).await;

    loop {
        tokio::select! {
            element = stream.next() => {
                match element {
                    Some(element) => dispatch(&clients, element),
                    None => {
                        error!("Component stream closed, shutting down sessions");
                        shutdown.cancel();
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
}

/// Route one inbound element to the session owning its bare `to` JID.
fn dispatch(clients: &DashMap<BareJid, mpsc::Sender<Stanza>>, element: Element) {
    let Some(stanza) = Stanza::classify(element) else {
        return;
    };
    let Some(to) = stanza.to() else {
        debug!("Dropping stanza without a to attribute");
        return;
    };
    let bare = to.to_bare();

    let Some(entry) = clients.get(&bare) else {
        debug!(to = %bare, "No session for inbound stanza");
        return;
    };
    if let Err(e) = entry.value().try_send(stanza) {
        warn!(to = %bare, error = %e, "Dropping stanza for backlogged session");
    }
}

fn random_localpart() -> String {
    let mut rng = rand::rng();
    (0..LOCALPART_LEN)
        .map(|_| LOCALPART_CHARS[rng.random_range(0..LOCALPART_CHARS.len())] as char)
        .collect()
}
