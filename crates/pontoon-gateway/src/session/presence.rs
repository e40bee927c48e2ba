//! Inbound MUC presence: joins, parts, renames, role changes, errors.

use jid::{BareJid, Jid};
use tracing::debug;
use xmpp_parsers::muc::user::{Affiliation, MucUser, Role, Status};
use xmpp_parsers::presence::{Presence, Type as PresenceType};

use crate::error::GatewayError;
use crate::identity::host_from_jid;
use crate::irc::reply;
use crate::room::{Occupant, RoomState};
use crate::stanza;
use crate::GATEWAY_NAME;

use super::Session;

impl<S> Session<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    pub(crate) async fn handle_presence(&mut self, presence: Presence) -> Result<(), GatewayError> {
        let Some(from) = presence.from.clone() else {
            return Ok(());
        };
        let room = from.to_bare();

        if presence.type_ == PresenceType::Error {
            return self.on_presence_error(&presence, &room).await;
        }

        if !stanza::is_muc_presence(&presence) {
            debug!(from = %from, "Ignoring non-MUC presence");
            return Ok(());
        }

        let user = stanza::muc_user(&presence);
        let occupant = occupant_from(&presence, user.as_ref());
        let item_nick = user
            .as_ref()
            .and_then(|u| u.items.first())
            .and_then(|i| i.nick.clone());
        let has_new_nick = user
            .as_ref()
            .map(|u| u.status.contains(&Status::NewNick))
            .unwrap_or(false);

        // Status 303 with our own target nick settles one room of the
        // rename epoch (or of its rollback).
        if has_new_nick && self.nick_change.awaits(&room) {
            if let Some(item_nick) = item_nick.as_deref() {
                let ours = item_nick == self.nick()
                    || self.nick_change.target_nick() == Some(item_nick);
                if ours {
                    let outcome = self.nick_change.on_changed(&room);
                    return self.apply_rename_outcome(outcome).await;
                }
            }
        }

        self.emit_role_change(&from, &room, &occupant).await?;

        let joining = self.join_queue.contains_key(&room);
        let in_room = self.rooms.contains_key(&room);
        let is_self = from.resource().map(|r| r.as_str()) == Some(self.nick());

        if presence.type_ == PresenceType::Unavailable {
            self.on_unavailable(&from, &room, joining, in_room, is_self, has_new_nick, item_nick)
                .await
        } else {
            self.on_available(&from, &room, occupant, joining, in_room, is_self)
                .await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn on_unavailable(
        &mut self,
        from: &Jid,
        room: &BareJid,
        joining: bool,
        in_room: bool,
        is_self: bool,
        has_new_nick: bool,
        item_nick: Option<String>,
    ) -> Result<(), GatewayError> {
        if is_self {
            if joining {
                self.join_queue.remove(room);
            } else if self.nick_change.awaits(room) {
                debug!(room = %room, "Own unavailable presence mid-rename, ignored");
            } else if in_room {
                let nick = self.identities.nick_for(from, true);
                let host = host_from_jid(from);
                let channel = self.channel_for(room);
                self.send_line(&reply::part(&nick, &host, &channel, "left"))
                    .await?;
                self.rooms.remove(room);
            } else {
                debug!(from = %from, "Stray self unavailable presence");
            }
            return Ok(());
        }

        if joining {
            // Someone came and went while our join is still pending.
            if let (Some(pending), Ok(full)) = (
                self.join_queue.get_mut(room),
                from.clone().try_into_full(),
            ) {
                pending.users.remove(&full);
            }
        } else if in_room {
            let Ok(full) = from.clone().try_into_full() else {
                return Ok(());
            };
            if has_new_nick {
                // Nick change in progress: the matching available
                // presence turns into a NICK line instead of PART+JOIN.
                if let Some(new_nick) = item_nick {
                    if let Ok(new_full) = room.with_resource_str(&new_nick) {
                        self.changing_nick.insert(new_full, full.clone());
                    }
                }
            } else {
                let nick = self.identities.nick_for(from, true);
                let host = host_from_jid(from);
                let channel = self.channel_for(room);
                self.send_line(&reply::part(&nick, &host, &channel, "left"))
                    .await?;
            }
            if let Some(room_state) = self.rooms.get_mut(room) {
                room_state.occupants.remove(&full);
            }
        } else {
            debug!(from = %from, "Unavailable presence for an unknown room");
        }
        Ok(())
    }

    async fn on_available(
        &mut self,
        from: &Jid,
        room: &BareJid,
        occupant: Occupant,
        joining: bool,
        in_room: bool,
        is_self: bool,
    ) -> Result<(), GatewayError> {
        if is_self {
            if joining {
                let pending = self.join_queue.remove(room).unwrap_or_default();
                let mut state = RoomState::new(room.clone());
                state.occupants = pending.users;
                if let Ok(self_jid) = room.with_resource_str(self.nick()) {
                    state.occupants.insert(self_jid, occupant);
                }
                self.rooms.insert(room.clone(), state);
                return self.emit_self_join(room).await;
            }
            if in_room {
                if let Ok(self_jid) = room.with_resource_str(self.nick()) {
                    if let Some(room_state) = self.rooms.get_mut(room) {
                        room_state.occupants.insert(self_jid, occupant);
                    }
                }
                return Ok(());
            }
            debug!(from = %from, "Stray self presence");
            return Ok(());
        }

        // Presence from the nick we are renaming to: the 303 path owns
        // this transition.
        if self.nick_change.target_nick().is_some()
            && from.resource().map(|r| r.as_str()) == self.nick_change.target_nick()
        {
            return Ok(());
        }

        let Ok(full) = from.clone().try_into_full() else {
            return Ok(());
        };

        if joining {
            if let Some(pending) = self.join_queue.get_mut(room) {
                pending.users.entry(full).or_insert(occupant);
            }
        } else if in_room {
            let is_new = self
                .rooms
                .get(room)
                .map(|r| !r.occupants.contains_key(&full))
                .unwrap_or(false);
            if let Some(room_state) = self.rooms.get_mut(room) {
                room_state.occupants.insert(full.clone(), occupant.clone());
            }

            if let Some(old) = self.changing_nick.remove(&full) {
                let old_jid = Jid::from(old);
                let old_nick = self.identities.nick_for(&old_jid, true);
                let host = host_from_jid(&old_jid);
                let new_nick = self.identities.nick_for(from, true);
                self.send_line(&reply::nick_change(&old_nick, &host, &new_nick))
                    .await?;
            } else if is_new {
                self.emit_join(from, room, &occupant).await?;
            }
        } else {
            debug!(from = %from, "Available presence for an unknown room");
        }
        Ok(())
    }

    /// JOIN line for a new occupant, plus the mode their role grants.
    async fn emit_join(
        &mut self,
        from: &Jid,
        room: &BareJid,
        occupant: &Occupant,
    ) -> Result<(), GatewayError> {
        let nick = self.identities.nick_for(from, true);
        let host = host_from_jid(from);
        let channel = self.channel_for(room);
        self.send_line(&reply::join(&nick, &host, &channel)).await?;

        if let Some(mode) = occupant.join_mode() {
            self.emit_user_mode(room, &[mode], &nick).await?;
        }
        Ok(())
    }

    /// The self-join block: JOIN, channel MODE, NAMES, end of NAMES.
    async fn emit_self_join(&mut self, room: &BareJid) -> Result<(), GatewayError> {
        let channel = self.channel_for(room);
        let nick = self.nick().to_string();
        let server = self.server().to_string();

        let mut lines = vec![
            reply::self_join(&nick, &channel),
            reply::channel_mode(&server, &channel, "+n"),
        ];
        {
            let Some(room_state) = self.rooms.get(room) else {
                return Ok(());
            };
            let identities = &mut self.identities;
            for (jid, occupant) in &room_state.occupants {
                let name = if jid.resource().as_str() == nick {
                    nick.clone()
                } else {
                    identities.nick_for(&Jid::from(jid.clone()), true)
                };
                lines.push(reply::rpl_name_reply(
                    &server,
                    &nick,
                    &channel,
                    &format!("{}{}", occupant.rank_sigil(), name),
                ));
            }
        }
        lines.push(reply::rpl_end_of_names(&server, &nick, &channel));

        for line in lines {
            self.send_line(&line).await?;
        }
        Ok(())
    }

    /// MODE lines when a known occupant's role changed, attributed to
    /// the gateway's synthetic room occupant.
    async fn emit_role_change(
        &mut self,
        from: &Jid,
        room: &BareJid,
        occupant: &Occupant,
    ) -> Result<(), GatewayError> {
        let Ok(full) = from.clone().try_into_full() else {
            return Ok(());
        };
        let changed = self
            .rooms
            .get(room)
            .and_then(|r| r.occupants.get(&full))
            .map(|existing| existing.role != occupant.role)
            .unwrap_or(false);
        if !changed {
            return Ok(());
        }

        let modes: &[&str] = match occupant.role {
            Role::Moderator => &["+o", "-v"],
            Role::Participant => &["-o", "+v"],
            Role::Visitor => &["-o", "-v"],
            Role::None => return Ok(()),
        };
        let taker = self.identities.nick_for(from, true);
        self.emit_user_mode(room, modes, &taker).await
    }

    async fn emit_user_mode(
        &mut self,
        room: &BareJid,
        modes: &[&str],
        taker: &str,
    ) -> Result<(), GatewayError> {
        let channel = self.channel_for(room);
        let giver_host = match room.with_resource_str(GATEWAY_NAME) {
            Ok(giver) => host_from_jid(&Jid::from(giver)),
            Err(_) => return Ok(()),
        };
        for mode in modes {
            self.send_line(&reply::user_mode(
                GATEWAY_NAME,
                &giver_host,
                &channel,
                mode,
                taker,
            ))
            .await?;
        }
        Ok(())
    }

    /// Error presence: either the conflict leg of a rename epoch, or a
    /// MUC error mapped to its numeric.
    async fn on_presence_error(
        &mut self,
        presence: &Presence,
        room: &BareJid,
    ) -> Result<(), GatewayError> {
        let error = stanza::stanza_error(&presence.payloads);
        let code = error.as_ref().and_then(stanza::legacy_error_code);

        if code == Some(409) && self.nick_change.awaits(room) {
            let outcome = self.nick_change.on_conflict(room);
            return self.apply_rename_outcome(outcome).await;
        }

        // A failed join leaves no queue entry behind.
        self.join_queue.remove(room);

        match code {
            Some(401) => self.channel_error(475, "Password required to join", room).await,
            Some(403) => self.channel_error(474, "Banned from channel", room).await,
            Some(404) => self.channel_error(404, "No such channel", room).await,
            Some(405) => self.channel_error(478, "Can't create MUC", room).await,
            Some(406) => self.channel_error(437, "Reserved nick required", room).await,
            Some(407) => self.channel_error(473, "Must be a member", room).await,
            Some(409) => self.channel_error(437, "Nick in use", room).await,
            Some(503) => self.channel_error(471, "Channel is full", room).await,
            _ => {
                let text = error
                    .as_ref()
                    .map(stanza::error_text)
                    .unwrap_or_default();
                self.send_line(&reply::xmpp_error(&format!("Got some error {text}")))
                    .await
            }
        }
    }
}

/// Build an occupant from a presence and its muc#user item.
fn occupant_from(presence: &Presence, user: Option<&MucUser>) -> Occupant {
    let item = user.and_then(|u| u.items.first());
    Occupant {
        role: item.map(|i| i.role.clone()).unwrap_or(Role::None),
        affiliation: item
            .map(|i| i.affiliation.clone())
            .unwrap_or(Affiliation::None),
        show: presence.show.clone(),
        status: presence.statuses.values().next().cloned(),
    }
}
