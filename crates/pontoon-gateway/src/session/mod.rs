//! One session per connected IRC client.
//!
//! The session owns both protocol views: the IRC socket it answers on
//! and the slice of the component connection addressed to its
//! synthesized bare JID. A single task runs the whole session, so room
//! state needs no locking; the run loop selects over IRC lines, hub
//! stanzas and the hub's shutdown token.

mod irc;
mod iq;
mod message;
mod presence;

use std::collections::HashMap;

use jid::{BareJid, FullJid, Jid};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use xmpp_parsers::iq::Iq;
use xmpp_parsers::message::Message;
use xmpp_parsers::presence::Presence;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::hub::{HubHandle, SessionRegistration};
use crate::identity::{fix_nick, host_from_jid, IdentityMap};
use crate::irc::{reply, IrcLine};
use crate::nick::{NickChange, RenameOutcome};
use crate::room::{PendingJoin, RoomState};
use crate::stanza::{self, Stanza};

/// Gateway session for one IRC client.
pub struct Session<S> {
    config: GatewayConfig,
    bare_jid: BareJid,
    hub: HubHandle,

    reader: Option<BufReader<ReadHalf<S>>>,
    writer: WriteHalf<S>,
    inbound: Option<mpsc::Receiver<Stanza>>,

    /// Fixed on the first NICK; `None` while pre-registration.
    nickname: Option<String>,
    /// PASS value, stored during pre-registration. The component link
    /// carries its own secret, so nothing consumes this yet.
    #[allow(dead_code)]
    password: Option<String>,

    rooms: HashMap<BareJid, RoomState>,
    join_queue: HashMap<BareJid, PendingJoin>,
    identities: IdentityMap,
    nick_change: NickChange,
    /// Occupants mid-rename: new occupant JID → old occupant JID.
    changing_nick: HashMap<FullJid, FullJid>,

    ping_counter: u8,
    terminating: bool,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, config: GatewayConfig, registration: SessionRegistration) -> Session<S> {
        let SessionRegistration {
            bare_jid,
            handle,
            inbound,
        } = registration;
        let (read_half, write_half) = tokio::io::split(stream);
        Session {
            config,
            bare_jid,
            hub: handle,
            reader: Some(BufReader::new(read_half)),
            writer: write_half,
            inbound: Some(inbound),
            nickname: None,
            password: None,
            rooms: HashMap::new(),
            join_queue: HashMap::new(),
            identities: IdentityMap::new(),
            nick_change: NickChange::default(),
            changing_nick: HashMap::new(),
            ping_counter: 0,
            terminating: false,
        }
    }

    /// Drive the session until the client goes away, the component
    /// dies, or a socket error ends it.
    pub async fn run(mut self) {
        let Some(mut reader) = self.reader.take() else {
            return;
        };
        let Some(mut inbound) = self.inbound.take() else {
            return;
        };
        let shutdown = self.hub.shutdown_token();
        let mut component_alive = true;
        let mut buf = Vec::with_capacity(512);

        info!(jid = %self.bare_jid, "Session started");

        while !self.terminating {
            let step = tokio::select! {
                line = next_line(&mut reader, &mut buf) => match line {
                    Ok(Some(bytes)) => self.on_irc_bytes(bytes).await,
                    Ok(None) => {
                        debug!(jid = %self.bare_jid, "IRC client closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(jid = %self.bare_jid, error = %e, "IRC read failed");
                        break;
                    }
                },
                stanza = inbound.recv() => match stanza {
                    Some(stanza) => self.on_stanza(stanza).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    component_alive = false;
                    let nick = self.nick().to_string();
                    let text =
                        format!("XMPP server disconnected, shutting down {}.", crate::GATEWAY_NAME);
                    let _ = self.send_line(&reply::notice(&nick, &text)).await;
                    break;
                }
            };
            if let Err(e) = step {
                warn!(jid = %self.bare_jid, error = %e, "Session error, terminating");
                break;
            }
        }

        self.teardown(component_alive).await;
    }

    /// Leave every joined room (best-effort), unregister, close.
    async fn teardown(mut self, component_alive: bool) {
        if component_alive {
            let rooms: Vec<BareJid> = self.rooms.keys().cloned().collect();
            let nick = self.nick().to_string();
            for room in rooms {
                if let Ok(presence) = stanza::muc_leave(&room, &nick, "") {
                    let _ = self.send_presence(presence).await;
                }
            }
        }
        self.hub.unregister(&self.bare_jid);
        let _ = self.writer.shutdown().await;
        info!(jid = %self.bare_jid, "Session ended");
    }

    /// UTF-8 check and line dispatch, per the codec contract: a bad
    /// line is reported to the user and dropped.
    async fn on_irc_bytes(&mut self, bytes: Vec<u8>) -> Result<(), GatewayError> {
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(_) => {
                return self
                    .send_line(&reply::gateway_error(
                        "Input from IRC client was not in utf-8. Turn utf-8 support \
                         on from your IRC client or input only pure ascii",
                    ))
                    .await;
            }
        };
        debug!(jid = %self.bare_jid, line = %line, "irc <<");
        let Some(line) = IrcLine::parse(&line) else {
            return Ok(());
        };
        if self.nickname.is_none() {
            return self.on_preregister_line(line).await;
        }
        self.on_irc_line(line).await
    }

    /// Pre-registration honors NICK and PASS only.
    async fn on_preregister_line(&mut self, line: IrcLine) -> Result<(), GatewayError> {
        if line.is_command("NICK") {
            let Some(nick) = line.first_param() else {
                return Ok(());
            };
            let nick = fix_nick(nick);
            self.nickname = Some(nick.clone());

            let host = host_from_jid(&Jid::from(self.bare_jid.clone()));
            let started = self.hub.start_time_text();
            for line in reply::registration_burst(
                &self.config.component_name,
                &nick,
                &host,
                self.config.irc_port,
                &started,
            ) {
                self.send_line(&line).await?;
            }
        } else if line.is_command("PASS") {
            self.password = line.first_param().map(str::to_string);
        } else {
            debug!(command = %line.command, "Ignoring command before registration");
        }
        Ok(())
    }

    async fn on_stanza(&mut self, stanza: Stanza) -> Result<(), GatewayError> {
        match stanza {
            Stanza::Presence(presence) => self.handle_presence(presence).await,
            Stanza::Message(message) => self.handle_message(message).await,
            Stanza::Iq(iq) => self.handle_iq(iq).await,
        }
    }

    // ---- small shared helpers ----------------------------------------

    pub(crate) fn nick(&self) -> &str {
        self.nickname.as_deref().unwrap_or("")
    }

    pub(crate) fn server(&self) -> &str {
        &self.config.component_name
    }

    /// Write one IRC line, appending CR/LF.
    pub(crate) async fn send_line(&mut self, line: &str) -> Result<(), GatewayError> {
        debug!(jid = %self.bare_jid, line = %line, "irc >>");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub(crate) async fn send_presence(&mut self, mut presence: Presence) -> Result<(), GatewayError> {
        presence.from = Some(Jid::from(self.bare_jid.clone()));
        self.hub.send(presence).await
    }

    pub(crate) async fn send_message(&mut self, mut message: Message) -> Result<(), GatewayError> {
        message.from = Some(Jid::from(self.bare_jid.clone()));
        self.hub.send(message).await
    }

    pub(crate) async fn send_iq(&mut self, mut iq: Iq) -> Result<(), GatewayError> {
        iq.from = Some(Jid::from(self.bare_jid.clone()));
        self.hub.send(iq).await
    }

    /// Parse a `#channel` argument into the room's bare JID, applying
    /// the muc-server suffix when the name carries no domain.
    pub(crate) fn room_from_channel(&self, arg: &str) -> Option<BareJid> {
        let name = arg.strip_prefix('#')?;
        if name.is_empty() {
            return None;
        }
        let full = if name.contains('@') {
            name.to_lowercase()
        } else {
            format!("{}@{}", name.to_lowercase(), self.config.muc_server)
        };
        BareJid::new(&full).ok()
    }

    /// Display name of a room on the IRC side.
    pub(crate) fn channel_for(&self, room: &BareJid) -> String {
        let node = room.node().map(|n| n.as_str()).unwrap_or_default();
        if self.config.short_channels && room.domain().as_str() == self.config.muc_server {
            format!("#{node}")
        } else {
            format!("#{room}")
        }
    }

    /// Channel-scoped error: the numeric with its RFC text, then the
    /// XMPP ERROR relay line.
    pub(crate) async fn channel_error(
        &mut self,
        numeric: u16,
        message: &str,
        room: &BareJid,
    ) -> Result<(), GatewayError> {
        let channel = self.channel_for(room);
        let nick = self.nick().to_string();
        let server = self.server().to_string();
        self.send_line(&reply::channel_numeric(&server, numeric, &nick, &channel))
            .await?;
        self.send_line(&reply::xmpp_error(message)).await
    }

    /// Apply a settled (or still pending) nick-change outcome.
    pub(crate) async fn apply_rename_outcome(
        &mut self,
        outcome: RenameOutcome,
    ) -> Result<(), GatewayError> {
        match outcome {
            RenameOutcome::InFlight | RenameOutcome::Settled => Ok(()),
            RenameOutcome::Committed { new_nick } => {
                let old_nick = self.nick().to_string();
                self.send_line(&reply::self_nick_change(&old_nick, &new_nick))
                    .await?;
                for room in self.rooms.values_mut() {
                    room.rename_occupant(&old_nick, &new_nick);
                }
                self.nickname = Some(new_nick);
                Ok(())
            }
            RenameOutcome::RolledBack { rooms } => {
                let nick = self.nick().to_string();
                for room in rooms {
                    let presence = stanza::muc_presence(&room, &nick)
                        .map_err(GatewayError::from)?;
                    self.send_presence(presence).await?;
                }
                self.send_line(&reply::nick_conflict_error()).await
            }
        }
    }
}

/// Read the next CR/LF-terminated line as raw bytes. `Ok(None)` is a
/// clean EOF.
///
/// Partial reads accumulate in `buf`, so cancellation from a `select!`
/// branch never loses input; the buffer is only drained when a full
/// line is handed out.
async fn next_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<Vec<u8>>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let n = reader.read_until(b'\n', buf).await?;
    if n == 0 && buf.is_empty() {
        return Ok(None);
    }
    let mut line = std::mem::take(buf);
    while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
        line.pop();
    }
    Ok(Some(line))
}
