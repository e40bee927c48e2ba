//! Inbound XMPP messages: channel traffic, private chats, topics.

use chrono::Utc;
use jid::{BareJid, Jid};
use tracing::debug;
use xmpp_parsers::message::{Message, MessageType};

use crate::error::GatewayError;
use crate::identity::host_from_jid;
use crate::irc::reply;
use crate::room::Topic;
use crate::stanza;

use super::Session;

impl<S> Session<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    pub(crate) async fn handle_message(&mut self, message: Message) -> Result<(), GatewayError> {
        if message.type_ == MessageType::Error {
            return self.on_message_error(&message).await;
        }
        let Some(from) = message.from.clone() else {
            return Ok(());
        };
        let room = from.to_bare();

        let body = message.get_best_body(vec![]).map(|(_, b)| b.0.clone());
        let subject = message.get_best_subject(vec![]).map(|(_, s)| s.0.clone());
        let stamp = stanza::delay_stamp(&message.payloads)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string());

        if body.is_none() && subject.is_none() {
            return Ok(());
        }

        if message.type_ != MessageType::Groupchat {
            if let Some(body) = body {
                let in_room = self.rooms.contains_key(&room);
                return self
                    .relay_privmsg(&from, in_room, true, &body, stamp.as_deref())
                    .await;
            }
            return Ok(());
        }

        if let Some(subject) = subject {
            return self.on_topic(&from, &room, &subject).await;
        }

        if let Some(body) = body {
            // Echo suppression: our own live messages came from us; only
            // history (delay-stamped) copies are worth relaying back.
            let from_self = from.resource().map(|r| r.as_str()) == Some(self.nick());
            if !from_self || stamp.is_some() {
                return self
                    .relay_privmsg(&from, true, false, &body, stamp.as_deref())
                    .await;
            }
        }
        Ok(())
    }

    /// Fan a message body out as PRIVMSG lines, one per body line,
    /// with `/me` and history-stamp handling per line.
    pub(crate) async fn relay_privmsg(
        &mut self,
        from: &Jid,
        is_muc: bool,
        private: bool,
        text: &str,
        stamp: Option<&str>,
    ) -> Result<(), GatewayError> {
        let nick = self.identities.nick_for(from, is_muc);
        let host = host_from_jid(from);
        let target = if private {
            self.nick().to_string()
        } else {
            self.channel_for(&from.to_bare())
        };

        for raw in text.lines() {
            let me = reply::me_body(raw);
            let mut line = me.unwrap_or(raw).to_string();
            if let Some(stamp) = stamp {
                line = format!("[{stamp}] {line}");
            }
            if me.is_some() {
                line = reply::ctcp_action(&line);
            }
            self.send_line(&reply::privmsg(&nick, &host, &target, &line))
                .await?;
        }
        Ok(())
    }

    async fn on_topic(
        &mut self,
        from: &Jid,
        room: &BareJid,
        subject: &str,
    ) -> Result<(), GatewayError> {
        let nick = self.identities.nick_for(from, true);
        let host = host_from_jid(from);
        let channel = self.channel_for(room);
        self.send_line(&reply::topic(&nick, &host, &channel, subject))
            .await?;

        if let Some(room_state) = self.rooms.get_mut(room) {
            room_state.topic = Some(Topic {
                text: subject.to_string(),
                set_by: nick,
                set_at: Utc::now().timestamp(),
            });
        }
        Ok(())
    }

    async fn on_message_error(&mut self, message: &Message) -> Result<(), GatewayError> {
        let error = stanza::stanza_error(&message.payloads);
        let code = error.as_ref().and_then(stanza::legacy_error_code);

        if code == Some(403) {
            if let Some(from) = &message.from {
                let room = from.to_bare();
                let text = error.as_ref().map(stanza::error_text).unwrap_or_default();
                return self.channel_error(482, &text, &room).await;
            }
        }
        debug!(?code, "Unmapped message error");
        Ok(())
    }
}
