//! Inbound IRC command dispatch: the IRC→XMPP half of the translator.

use jid::Jid;
use tracing::{debug, warn};
use xmpp_parsers::message::{Body, Message, MessageType, Subject};
use xmpp_parsers::presence::Show;

use crate::error::GatewayError;
use crate::identity::fix_nick;
use crate::irc::{reply, IrcLine};
use crate::stanza;

use super::Session;

/// Away keywords an AWAY text may start with to pick the show value.
const SHOW_KEYWORDS: &[(&str, Show)] = &[
    ("CHAT", Show::Chat),
    ("AWAY", Show::Away),
    ("XA", Show::Xa),
    ("DND", Show::Dnd),
];

impl<S> Session<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    pub(crate) async fn on_irc_line(&mut self, line: IrcLine) -> Result<(), GatewayError> {
        let command = line.command.to_ascii_uppercase();
        match command.as_str() {
            "PING" => self.irc_ping().await,
            "NICK" => self.irc_nick(&line).await,
            "PASS" => {
                debug!("PASS after registration ignored");
                Ok(())
            }
            "JOIN" => self.irc_join(&line).await,
            "PART" => self.irc_part(&line).await,
            "PRIVMSG" | "NOTICE" => self.irc_privmsg(&line).await,
            "TOPIC" => self.irc_topic(&line).await,
            "MODE" => self.irc_mode(&line).await,
            "WHO" => self.irc_who(&line).await,
            "WHOIS" => self.irc_whois(&line).await,
            "LIST" => self.irc_list().await,
            "AWAY" => self.irc_away(&line).await,
            "QUIT" => {
                self.terminating = true;
                Ok(())
            }
            _ => {
                warn!(line = %line, "ircline not handled");
                Ok(())
            }
        }
    }

    /// PONG every PING; every fifth PING sweeps the joined rooms with
    /// disco#info liveness probes.
    async fn irc_ping(&mut self) -> Result<(), GatewayError> {
        self.ping_counter += 1;
        if self.ping_counter >= 5 {
            self.ping_counter = 0;
            let mut due = Vec::new();
            for room in self.rooms.values_mut() {
                if room.liveness.on_probe_cycle() {
                    due.push(Jid::from(room.jid.clone()));
                }
            }
            for room in due {
                let iq = stanza::disco_info_query("disco_room_info", room);
                self.send_iq(iq).await?;
            }
        }
        let server = self.server().to_string();
        self.send_line(&reply::pong(&server)).await
    }

    /// Rename: local echo when no rooms are joined, otherwise the
    /// multi-room coordinator opens an epoch.
    async fn irc_nick(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(raw) = line.first_param() else {
            return Ok(());
        };
        let new_nick = fix_nick(raw);
        if new_nick == self.nick() {
            return Ok(());
        }
        if self.nick_change.is_pending() {
            debug!(nick = %new_nick, "NICK while a rename is in flight, ignored");
            return Ok(());
        }

        if self.rooms.is_empty() {
            let old_nick = self.nick().to_string();
            self.send_line(&reply::self_nick_change(&old_nick, &new_nick))
                .await?;
            self.nickname = Some(new_nick);
            return Ok(());
        }

        let rooms: Vec<_> = self.rooms.keys().cloned().collect();
        self.nick_change.begin(&new_nick, rooms.iter().cloned());
        for room in rooms {
            let presence = stanza::muc_presence(&room, &new_nick).map_err(GatewayError::from)?;
            self.send_presence(presence).await?;
        }
        Ok(())
    }

    async fn irc_join(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(channel) = line.args.first().cloned() else {
            return Ok(());
        };
        let password = line.args.get(1).cloned().unwrap_or_default();

        let Some(room) = self.room_from_channel(&channel) else {
            let nick = self.nick().to_string();
            let server = self.server().to_string();
            self.send_line(&reply::channel_numeric(&server, 404, &nick, &channel))
                .await?;
            return self.send_line(&reply::xmpp_error("No such MUC")).await;
        };

        if self.rooms.contains_key(&room) || self.join_queue.contains_key(&room) {
            return Ok(());
        }

        debug!(room = %room, "Joining room");
        self.join_queue.insert(room.clone(), Default::default());
        let nick = self.nick().to_string();
        let presence =
            stanza::muc_join(&room, &nick, &password).map_err(GatewayError::from)?;
        self.send_presence(presence).await
    }

    async fn irc_part(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(channel) = line.args.first() else {
            return Ok(());
        };
        let Some(room) = self.room_from_channel(channel) else {
            return Ok(());
        };
        if !self.rooms.contains_key(&room) {
            return Ok(());
        }
        let reason = line.trailing.clone().unwrap_or_default();
        let nick = self.nick().to_string();
        let presence =
            stanza::muc_leave(&room, &nick, reason.trim()).map_err(GatewayError::from)?;
        self.send_presence(presence).await
    }

    /// PRIVMSG and NOTICE both relay as XMPP messages: groupchat to
    /// `#`-channels, chat to identity-map targets.
    async fn irc_privmsg(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(target) = line.args.first() else {
            return Ok(());
        };
        let Some(text) = line.trailing.as_deref() else {
            return Ok(());
        };
        let mut text = text.trim().to_string();
        if let Some(me) = reply::action_to_me(&text) {
            text = me;
        }

        let message = if target.starts_with('#') {
            let Some(room) = self.room_from_channel(target) else {
                return Ok(());
            };
            let mut message = Message::new_with_type(
                MessageType::Groupchat,
                Some(Jid::from(room)),
            );
            message.bodies.insert(String::new(), Body(text));
            message
        } else {
            let Some(jid) = self.identities.resolve(target) else {
                debug!(target = %target, "PRIVMSG target not resolvable, dropped");
                return Ok(());
            };
            let mut message = Message::new(Some(jid));
            message.bodies.insert(String::new(), Body(text));
            message
        };
        self.send_message(message).await
    }

    async fn irc_topic(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(channel) = line.args.first() else {
            return Ok(());
        };
        let room = self.room_from_channel(channel);
        let Some(room) = room.filter(|room| self.rooms.contains_key(room)) else {
            let nick = self.nick().to_string();
            let server = self.server().to_string();
            return self
                .send_line(&reply::err_no_such_channel(&server, &nick))
                .await;
        };

        match line.trailing.as_deref() {
            Some(text) => {
                let mut message = Message::new_with_type(
                    MessageType::Groupchat,
                    Some(Jid::from(room)),
                );
                message
                    .subjects
                    .insert(String::new(), Subject(text.trim().to_string()));
                self.send_message(message).await
            }
            None => {
                // Topic query: answer from the stored subject.
                let topic = self.rooms.get(&room).and_then(|r| r.topic.clone());
                let Some(topic) = topic else {
                    return Ok(());
                };
                let channel = self.channel_for(&room);
                let nick = self.nick().to_string();
                let server = self.server().to_string();
                self.send_line(&reply::rpl_topic(&server, &nick, &channel, &topic.text))
                    .await?;
                self.send_line(&reply::rpl_topic_who_time(
                    &server,
                    &nick,
                    &channel,
                    &topic.set_by,
                    topic.set_at,
                ))
                .await
            }
        }
    }

    async fn irc_mode(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(target) = line.args.first().cloned() else {
            return Ok(());
        };
        let params = line.args.get(1).cloned();
        let taker = line.args.get(2).cloned();

        if target == self.nick() {
            let nick = self.nick().to_string();
            return self
                .send_line(&reply::self_mode(&nick, params.as_deref().unwrap_or("")))
                .await;
        }

        let Some(room) = self.room_from_channel(&target) else {
            return Ok(());
        };

        let Some(params) = params else {
            // Bare channel MODE: ask disco#info for the room features.
            let iq = stanza::disco_info_query("disco_room_info", Jid::from(room));
            return self.send_iq(iq).await;
        };

        if params.contains('b') {
            let channel = self.channel_for(&room);
            let nick = self.nick().to_string();
            let server = self.server().to_string();
            return self
                .send_line(&reply::rpl_end_of_ban_list(&server, &nick, &channel))
                .await;
        }

        let role = if params.contains("+o") {
            Some("moderator")
        } else if params.contains("-o") || params.contains("+v") {
            Some("participant")
        } else if params.contains("-v") {
            Some("visitor")
        } else {
            None
        };

        match (role, taker) {
            (Some(role), Some(taker)) => {
                let iq = stanza::muc_role_iq("muc_role", &room, &taker, role);
                self.send_iq(iq).await
            }
            _ => {
                let iq = stanza::disco_info_query("disco_room_info", Jid::from(room));
                self.send_iq(iq).await
            }
        }
    }

    async fn irc_who(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(target) = line.args.first() else {
            return Ok(());
        };
        let jid = if target.starts_with('#') {
            self.room_from_channel(target).map(Jid::from)
        } else {
            self.identities.resolve(target)
        };
        let Some(jid) = jid else {
            return Ok(());
        };
        let iq = stanza::disco_items_query("disco_muc_users", jid);
        self.send_iq(iq).await
    }

    /// WHOIS answers the 311/312/318 block at once; the vCard, last
    /// activity and software version details follow as NOTICEs when
    /// the iq results come back.
    async fn irc_whois(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let Some(target) = line.first_param() else {
            return Ok(());
        };
        let Some(jid) = self.identities.resolve(target) else {
            return Ok(());
        };

        let is_occupant = self.rooms.contains_key(&jid.to_bare());
        let whonick = self.identities.nick_for(&jid, is_occupant);
        let node = jid.node().map(|n| n.as_str()).unwrap_or_default().to_string();
        let domain = jid.domain().as_str().to_string();
        let nick = self.nick().to_string();
        let server = self.server().to_string();

        self.send_line(&reply::rpl_whois_user(&server, &nick, &whonick, &node, &domain))
            .await?;
        self.send_line(&reply::rpl_whois_server(&server, &nick, &whonick))
            .await?;
        self.send_line(&reply::rpl_end_of_whois(&server, &nick, &whonick))
            .await?;

        self.send_iq(stanza::vcard_query("whois_vcard", jid.clone()))
            .await?;
        self.send_iq(stanza::last_activity_query("whois_last", jid.clone()))
            .await?;
        self.send_iq(stanza::version_query("whois_version", jid)).await
    }

    async fn irc_list(&mut self) -> Result<(), GatewayError> {
        let muc_server = jid::BareJid::new(&self.config.muc_server)?;
        let iq = stanza::disco_items_query("disco_muc_rooms", Jid::from(muc_server));
        self.send_iq(iq).await
    }

    /// AWAY maps to directed presence in every joined room: empty
    /// clears the away state (305), text sets show/status (306).
    async fn irc_away(&mut self, line: &IrcLine) -> Result<(), GatewayError> {
        let text = line
            .trailing
            .clone()
            .unwrap_or_else(|| line.args.join(" "))
            .trim()
            .to_string();
        let nick = self.nick().to_string();
        let server = self.server().to_string();
        let rooms: Vec<_> = self.rooms.keys().cloned().collect();

        if text.is_empty() {
            for room in rooms {
                let presence =
                    stanza::muc_presence(&room, &nick).map_err(GatewayError::from)?;
                self.send_presence(presence).await?;
            }
            return self.send_line(&reply::rpl_unaway(&server, &nick)).await;
        }

        let (show, status) = parse_away(&text);
        for room in rooms {
            let mut presence =
                stanza::muc_presence(&room, &nick).map_err(GatewayError::from)?;
            presence.show = Some(show.clone());
            presence.set_status(String::new(), status.clone());
            self.send_presence(presence).await?;
        }
        self.send_line(&reply::rpl_nowaway(&server, &nick)).await
    }
}

/// Split an AWAY text into show and status: an optional leading
/// keyword picks the show value, the rest (or the whole text) is the
/// status.
fn parse_away(text: &str) -> (Show, String) {
    let (first, rest) = match text.split_once(' ') {
        Some((first, rest)) => (first, rest.trim()),
        None => (text, ""),
    };
    for (keyword, show) in SHOW_KEYWORDS {
        if first.eq_ignore_ascii_case(keyword) {
            let status = if rest.is_empty() { text } else { rest };
            return (show.clone(), status.to_string());
        }
    }
    (Show::Away, text.to_string())
}
