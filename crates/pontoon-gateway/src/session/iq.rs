//! Inbound iq routing and handlers.
//!
//! Results and errors are classified into an [`IqRoute`] keyed by the
//! payload namespace and the query id, then matched exhaustively, so
//! the set of handled combinations is reviewable in one place.

use std::collections::HashSet;

use jid::Jid;
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::stanza_error::StanzaError;

use crate::error::GatewayError;
use crate::irc::reply;
use crate::stanza::{self, NS_DISCO_INFO, NS_DISCO_ITEMS, NS_LAST, NS_VCARD, NS_VERSION};
use crate::GATEWAY_NAME;

use super::Session;

/// Channel-mode letters for the MUC disco features, in the stable
/// order mode strings are emitted in.
const MUC_FEATURE_MODES: &[(&str, char)] = &[
    ("muc_hidden", 's'),
    ("muc_membersonly", 'p'),
    ("muc_moderated", 'm'),
    ("muc_nonanonymous", 'A'),
    ("muc_open", 'F'),
    ("muc_passwordprotected", 'k'),
    ("muc_persistent", 'P'),
    ("muc_public", 'B'),
    ("muc_semianonymous", 'a'),
    ("muc_temporary", 'T'),
    ("muc_unmoderated", 'u'),
    ("muc_unsecured", 'U'),
];

/// Channel notice shown when a room stops answering liveness probes.
const DISCONNECT_WARNING: &str = "MUC IS DISCONNECTED YOUR TEXT WILL NOT SHOW ON CHANNEL. \
     YOU CAN WAIT UNTIL MUC CONNECTS AGAIN OR USE /PART TO LEAVE THIS MUC!";

/// Where an inbound iq goes.
#[derive(Debug)]
pub(crate) enum IqRoute {
    DiscoInfoResult(Element),
    DiscoItemsUsers(Element),
    DiscoItemsRooms(Element),
    VcardResult(Element),
    LastResult(Element),
    VersionResult(Element),
    RemoteError { id: String, error: StanzaError },
    /// get/set queries from remote entities; logged and ignored.
    Query,
    /// Empty result ack (role changes and the like).
    Ack,
    Unhandled(String),
}

/// Classify an iq by (payload namespace, kind, query id).
pub(crate) fn route_iq(iq: Iq) -> (Option<Jid>, IqRoute) {
    let route = match iq.payload {
        IqType::Result(Some(element)) => {
            if element.is("query", NS_DISCO_INFO) {
                IqRoute::DiscoInfoResult(element)
            } else if element.is("query", NS_DISCO_ITEMS) {
                match iq.id.as_str() {
                    "disco_muc_users" => IqRoute::DiscoItemsUsers(element),
                    "disco_muc_rooms" => IqRoute::DiscoItemsRooms(element),
                    other => IqRoute::Unhandled(format!("disco#items id={other}")),
                }
            } else if element.is("vCard", NS_VCARD) {
                IqRoute::VcardResult(element)
            } else if element.is("query", NS_LAST) {
                IqRoute::LastResult(element)
            } else if element.is("query", NS_VERSION) {
                IqRoute::VersionResult(element)
            } else {
                IqRoute::Unhandled(element.ns().to_string())
            }
        }
        IqType::Result(None) => IqRoute::Ack,
        IqType::Error(error) => IqRoute::RemoteError { id: iq.id, error },
        IqType::Get(_) | IqType::Set(_) => IqRoute::Query,
    };
    (iq.from, route)
}

impl<S> Session<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
{
    pub(crate) async fn handle_iq(&mut self, iq: Iq) -> Result<(), GatewayError> {
        let (from, route) = route_iq(iq);
        match route {
            IqRoute::DiscoInfoResult(element) => self.on_disco_info(from, element).await,
            IqRoute::DiscoItemsUsers(element) => self.on_disco_users(from, element).await,
            IqRoute::DiscoItemsRooms(element) => self.on_disco_rooms(element).await,
            IqRoute::VcardResult(element) => self.on_vcard(from, element).await,
            IqRoute::LastResult(element) => self.on_last_activity(from, element).await,
            IqRoute::VersionResult(element) => self.on_version(from, element).await,
            IqRoute::RemoteError { id, error } => self.on_iq_error(from, &id, error).await,
            IqRoute::Query => {
                debug!("Inbound iq query ignored");
                Ok(())
            }
            IqRoute::Ack => Ok(()),
            IqRoute::Unhandled(what) => {
                debug!(what = %what, "No iq handler for this namespace");
                Ok(())
            }
        }
    }

    /// disco#info result: either a liveness probe answer or the room
    /// feature set for a channel MODE reply.
    async fn on_disco_info(
        &mut self,
        from: Option<Jid>,
        element: Element,
    ) -> Result<(), GatewayError> {
        let Some(from) = from else {
            return Ok(());
        };
        let room = from.to_bare();

        if let Some(room_state) = self.rooms.get_mut(&room) {
            if room_state.liveness.probe_pending {
                room_state.liveness.on_reply();
                return Ok(());
            }
        }

        let is_muc = element.children().any(|child| {
            child.name() == "identity"
                && child.attr("category") == Some("conference")
                && child.attr("type") == Some("text")
        });
        if !is_muc {
            debug!(from = %from, "disco#info result is not a MUC room");
            return Ok(());
        }

        let features: HashSet<String> = element
            .children()
            .filter(|child| child.name() == "feature")
            .filter_map(|child| child.attr("var").map(str::to_string))
            .collect();
        let modes = room_mode_string(&features);

        let channel = self.channel_for(&room);
        let nick = self.nick().to_string();
        let server = self.server().to_string();
        self.send_line(&reply::rpl_channel_mode(&server, &nick, &channel, &modes))
            .await?;
        let started = self.hub.start_unix();
        self.send_line(&reply::rpl_creation_time(&server, &nick, &channel, started))
            .await
    }

    /// disco#items on a room: the WHO roster.
    async fn on_disco_users(
        &mut self,
        from: Option<Jid>,
        element: Element,
    ) -> Result<(), GatewayError> {
        let Some(from) = from else {
            return Ok(());
        };
        let room = from.to_bare();
        let channel = self.channel_for(&room);
        let nick = self.nick().to_string();
        let server = self.server().to_string();

        let mut lines = Vec::new();
        {
            let room_state = self.rooms.get(&room);
            let identities = &mut self.identities;
            for item in element
                .children()
                .filter(|child| child.is("item", NS_DISCO_ITEMS))
            {
                let Some(jid) = item.attr("jid").and_then(|raw| Jid::new(raw).ok()) else {
                    continue;
                };
                let resource = jid.resource().map(|r| r.as_str()).unwrap_or_default();
                let domain = jid.domain().as_str().to_string();
                let whonick = identities.nick_for(&jid, true);
                let flags = room_state
                    .and_then(|state| {
                        jid.clone()
                            .try_into_full()
                            .ok()
                            .and_then(|full| state.occupants.get(&full).map(|o| o.who_flags()))
                    })
                    .unwrap_or_else(|| "H".to_string());
                lines.push(reply::rpl_who_reply(
                    &server, &nick, &channel, resource, &domain, &whonick, &flags, resource,
                ));
            }
        }
        lines.push(reply::rpl_end_of_who(&server, &nick, &channel));

        for line in lines {
            self.send_line(&line).await?;
        }
        Ok(())
    }

    /// disco#items on the MUC service: the LIST reply.
    async fn on_disco_rooms(&mut self, element: Element) -> Result<(), GatewayError> {
        let nick = self.nick().to_string();
        let server = self.server().to_string();

        self.send_line(&reply::rpl_list_start(&server, &nick)).await?;
        let items: Vec<(String, String)> = element
            .children()
            .filter(|child| child.is("item", NS_DISCO_ITEMS))
            .filter_map(|item| {
                let jid = Jid::new(item.attr("jid")?).ok()?;
                let name = item.attr("name").unwrap_or("Unknown").to_string();
                Some((self.channel_for(&jid.to_bare()), name))
            })
            .collect();
        for (channel, name) in items {
            self.send_line(&reply::rpl_list_item(&server, &nick, &channel, &name))
                .await?;
        }
        self.send_line(&reply::rpl_list_end(&server, &nick)).await
    }

    /// vCard result: one NOTICE per field line, PHOTO skipped, EMAIL
    /// flattened to its non-empty children.
    async fn on_vcard(&mut self, from: Option<Jid>, element: Element) -> Result<(), GatewayError> {
        let Some(from) = from else {
            return Ok(());
        };
        let nick = self.nick().to_string();
        self.send_line(&reply::notice(
            &nick,
            &format!("** Vcard information for {from} **"),
        ))
        .await?;

        let mut notices = Vec::new();
        for field in element.children() {
            match field.name() {
                "PHOTO" => continue,
                "EMAIL" => {
                    for sub in field.children() {
                        let text = sub.text();
                        if !text.trim().is_empty() {
                            notices.push(format!("EMAIL {}: {}", sub.name(), text.trim()));
                        }
                    }
                }
                name => {
                    for line in field.text().lines() {
                        if !line.trim().is_empty() {
                            notices.push(format!("{name}: {}", line.trim()));
                        }
                    }
                }
            }
        }
        for text in notices {
            self.send_line(&reply::notice(&nick, &text)).await?;
        }
        Ok(())
    }

    async fn on_last_activity(
        &mut self,
        from: Option<Jid>,
        element: Element,
    ) -> Result<(), GatewayError> {
        let Some(from) = from else {
            return Ok(());
        };
        let seconds = element.attr("seconds").unwrap_or("unknown").to_string();
        let nick = self.nick().to_string();
        self.send_line(&reply::notice(
            &nick,
            &format!("** Last active information for {from} **"),
        ))
        .await?;
        self.send_line(&reply::notice(&nick, &format!("Idle {seconds} seconds")))
            .await
    }

    async fn on_version(&mut self, from: Option<Jid>, element: Element) -> Result<(), GatewayError> {
        let Some(from) = from else {
            return Ok(());
        };
        let nick = self.nick().to_string();
        self.send_line(&reply::notice(
            &nick,
            &format!("** Software version information for {from} **"),
        ))
        .await?;
        let fields: Vec<String> = element
            .children()
            .map(|child| format!("{}: {}", child.name(), child.text()))
            .collect();
        for text in fields {
            self.send_line(&reply::notice(&nick, &text)).await?;
        }
        Ok(())
    }

    /// Error replies to our own queries. WHOIS and role-change errors
    /// are dropped quietly; disco errors from joined rooms feed the
    /// liveness tracker.
    async fn on_iq_error(
        &mut self,
        from: Option<Jid>,
        id: &str,
        error: StanzaError,
    ) -> Result<(), GatewayError> {
        match id {
            "whois_vcard" | "whois_last" | "whois_version" | "muc_role" => {
                debug!(id, "Remote iq error dropped");
                return Ok(());
            }
            _ => {}
        }

        let Some(from) = from else {
            return Ok(());
        };
        let room = from.to_bare();
        let code = stanza::legacy_error_code(&error);

        if !self.rooms.contains_key(&room) {
            let code_text = code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string());
            return self
                .send_line(&reply::xmpp_error(&format!(
                    "iq error num {code_text} jid not room! jid {from}"
                )))
                .await;
        }

        let newly_disconnected = {
            let Some(room_state) = self.rooms.get_mut(&room) else {
                return Ok(());
            };
            if code == Some(404) {
                room_state.liveness.on_not_found()
            } else {
                room_state.liveness.probe_pending = false;
                false
            }
        };

        if newly_disconnected {
            self.channel_error(404, "MUC DISCONNECTED", &room).await?;
            if let Ok(warn_from) = room.with_resource_str(GATEWAY_NAME) {
                self.relay_privmsg(&Jid::from(warn_from), true, false, DISCONNECT_WARNING, None)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Map a room's disco features to its channel mode string, stable in
/// table order.
fn room_mode_string(features: &HashSet<String>) -> String {
    let mut modes = String::from("+");
    for (feature, letter) in MUC_FEATURE_MODES {
        if features.contains(*feature) {
            modes.push(*letter);
        }
    }
    modes
}
