//! Stanza classification and construction helpers.
//!
//! The hub parses raw elements into the three stanza kinds; sessions
//! use the helpers here to pick presences apart (MUC payloads, error
//! conditions, delay stamps) and to build the outbound stanzas the
//! translator needs. Raw payloads without a typed builder (muc#admin,
//! vCard, last activity, software version) are assembled with the
//! minidom builder.

use chrono::NaiveDateTime;
use jid::{BareJid, Jid};
use minidom::Element;
use tracing::debug;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::message::Message;
use xmpp_parsers::muc::user::MucUser;
use xmpp_parsers::muc::muc::History;
use xmpp_parsers::muc::Muc;
use xmpp_parsers::presence::{Presence, Type as PresenceType};
use xmpp_parsers::stanza_error::{DefinedCondition, StanzaError};

/// Namespace for the MUC join protocol.
pub const NS_MUC: &str = "http://jabber.org/protocol/muc";
/// Namespace for MUC user items and status codes.
pub const NS_MUC_USER: &str = "http://jabber.org/protocol/muc#user";
/// Namespace for MUC role/affiliation administration.
pub const NS_MUC_ADMIN: &str = "http://jabber.org/protocol/muc#admin";
/// Namespace for service discovery info.
pub const NS_DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
/// Namespace for service discovery items.
pub const NS_DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";
/// Namespace for vCard queries (XEP-0054).
pub const NS_VCARD: &str = "vcard-temp";
/// Namespace for last activity queries (XEP-0012).
pub const NS_LAST: &str = "jabber:iq:last";
/// Namespace for software version queries (XEP-0092).
pub const NS_VERSION: &str = "jabber:iq:version";
/// Namespace for delayed delivery stamps (XEP-0203).
pub const NS_DELAY: &str = "urn:xmpp:delay";
/// Namespace of the legacy delay form (XEP-0091).
pub const NS_DELAY_LEGACY: &str = "jabber:x:delay";

/// A stanza received over the component stream.
#[derive(Debug, Clone)]
pub enum Stanza {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Stanza {
    /// Parse a raw element into one of the three stanza kinds.
    /// Anything else (or a malformed stanza) is dropped with a log
    /// line, per the hub's never-crash policy.
    pub fn classify(element: Element) -> Option<Stanza> {
        let parsed = match element.name() {
            "message" => Message::try_from(element).map(Stanza::Message),
            "presence" => Presence::try_from(element).map(Stanza::Presence),
            "iq" => Iq::try_from(element).map(Stanza::Iq),
            other => {
                debug!(name = other, "Ignoring non-stanza element");
                return None;
            }
        };
        match parsed {
            Ok(stanza) => Some(stanza),
            Err(error) => {
                debug!(%error, "Dropping malformed stanza");
                None
            }
        }
    }

    /// The destination JID, used for hub dispatch.
    pub fn to(&self) -> Option<&Jid> {
        match self {
            Stanza::Message(message) => message.to.as_ref(),
            Stanza::Presence(presence) => presence.to.as_ref(),
            Stanza::Iq(iq) => iq.to.as_ref(),
        }
    }
}

/// True when the presence carries any `x` payload in a MUC namespace.
pub fn is_muc_presence(presence: &Presence) -> bool {
    presence
        .payloads
        .iter()
        .any(|payload| payload.name() == "x" && payload.ns().starts_with(NS_MUC))
}

/// Extract the muc#user payload, if any.
pub fn muc_user(presence: &Presence) -> Option<MucUser> {
    presence
        .payloads
        .iter()
        .find(|payload| payload.is("x", NS_MUC_USER))
        .and_then(|payload| MucUser::try_from(payload.clone()).ok())
}

/// Extract the `<error/>` child of an error presence or message.
pub fn stanza_error(payloads: &[Element]) -> Option<StanzaError> {
    payloads
        .iter()
        .find(|payload| payload.name() == "error")
        .and_then(|payload| StanzaError::try_from(payload.clone()).ok())
}

/// Map a defined condition back to the legacy numeric error code the
/// translator's tables are written in.
pub fn legacy_error_code(error: &StanzaError) -> Option<u16> {
    match error.defined_condition {
        DefinedCondition::NotAuthorized => Some(401),
        DefinedCondition::Forbidden => Some(403),
        DefinedCondition::ItemNotFound => Some(404),
        DefinedCondition::NotAllowed => Some(405),
        DefinedCondition::NotAcceptable => Some(406),
        DefinedCondition::RegistrationRequired => Some(407),
        DefinedCondition::Conflict => Some(409),
        DefinedCondition::ServiceUnavailable => Some(503),
        _ => None,
    }
}

/// Human-readable text of a stanza error, for ERROR relay lines.
pub fn error_text(error: &StanzaError) -> String {
    error
        .texts
        .values()
        .next()
        .cloned()
        .unwrap_or_else(|| format!("{:?}", error.defined_condition))
}

/// Extract a delay stamp from stanza payloads, accepting both the
/// XEP-0203 form and the legacy XEP-0091 `jabber:x:delay` one.
pub fn delay_stamp(payloads: &[Element]) -> Option<NaiveDateTime> {
    for payload in payloads {
        if payload.is("delay", NS_DELAY) {
            let stamp = payload.attr("stamp")?;
            if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(stamp) {
                return Some(parsed.naive_utc());
            }
        }
        if payload.is("x", NS_DELAY_LEGACY) {
            let stamp = payload.attr("stamp")?;
            if let Ok(parsed) = NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H:%M:%S") {
                return Some(parsed);
            }
        }
    }
    None
}

/// Join presence: directed to `room/nick`, carrying the MUC `x`
/// payload with the password (always present, possibly empty) and the
/// history cap.
pub fn muc_join(room: &BareJid, nick: &str, password: &str) -> Result<Presence, jid::Error> {
    let to = room.with_resource_str(nick)?;
    let muc = Muc::new()
        .with_password(password.to_string())
        .with_history(History::new().with_maxchars(10_000).with_maxstanzas(100));
    let mut presence = Presence::new(PresenceType::None).with_to(Jid::from(to));
    let payload: Element = muc.into();
    presence.payloads.push(payload);
    Ok(presence)
}

/// Leave presence with the PART reason as status.
pub fn muc_leave(room: &BareJid, nick: &str, reason: &str) -> Result<Presence, jid::Error> {
    let to = room.with_resource_str(nick)?;
    let mut presence = Presence::new(PresenceType::Unavailable).with_to(Jid::from(to));
    presence.set_status(String::new(), reason.to_string());
    Ok(presence)
}

/// Plain directed presence to `room/nick`, used for nick changes and
/// away states.
pub fn muc_presence(room: &BareJid, nick: &str) -> Result<Presence, jid::Error> {
    let to = room.with_resource_str(nick)?;
    Ok(Presence::new(PresenceType::None).with_to(Jid::from(to)))
}

/// MUC admin role change (`MODE ±o/±v`).
pub fn muc_role_iq(id: &str, room: &BareJid, nick: &str, role: &str) -> Iq {
    let item = Element::builder("item", NS_MUC_ADMIN)
        .attr("nick", nick)
        .attr("role", role)
        .build();
    let query = Element::builder("query", NS_MUC_ADMIN).append(item).build();
    Iq {
        from: None,
        to: Some(Jid::from(room.clone())),
        id: id.to_string(),
        payload: IqType::Set(query),
    }
}

/// disco#info get, used for channel modes and liveness probes.
pub fn disco_info_query(id: &str, to: Jid) -> Iq {
    Iq {
        from: None,
        to: Some(to),
        id: id.to_string(),
        payload: IqType::Get(Element::builder("query", NS_DISCO_INFO).build()),
    }
}

/// disco#items get, used for WHO and LIST.
pub fn disco_items_query(id: &str, to: Jid) -> Iq {
    Iq {
        from: None,
        to: Some(to),
        id: id.to_string(),
        payload: IqType::Get(Element::builder("query", NS_DISCO_ITEMS).build()),
    }
}

/// vCard get for WHOIS.
pub fn vcard_query(id: &str, to: Jid) -> Iq {
    Iq {
        from: None,
        to: Some(to),
        id: id.to_string(),
        payload: IqType::Get(Element::builder("vCard", NS_VCARD).build()),
    }
}

/// Last-activity get for WHOIS.
pub fn last_activity_query(id: &str, to: Jid) -> Iq {
    Iq {
        from: None,
        to: Some(to),
        id: id.to_string(),
        payload: IqType::Get(Element::builder("query", NS_LAST).build()),
    }
}

/// Software-version get for WHOIS.
pub fn version_query(id: &str, to: Jid) -> Iq {
    Iq {
        from: None,
        to: Some(to),
        id: id.to_string(),
        payload: IqType::Get(Element::builder("query", NS_VERSION).build()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xmpp_parsers::muc::user::Status;

    #[test]
    fn classify_sorts_stanza_kinds() {
        let message: Element = "<message xmlns='jabber:component:accept' to='a@b'/>"
            .parse()
            .unwrap();
        assert!(matches!(
            Stanza::classify(message),
            Some(Stanza::Message(_))
        ));

        let presence: Element = "<presence xmlns='jabber:component:accept'/>".parse().unwrap();
        assert!(matches!(
            Stanza::classify(presence),
            Some(Stanza::Presence(_))
        ));

        let other: Element = "<stream:features xmlns:stream='http://etherx.jabber.org/streams'/>"
            .parse()
            .unwrap();
        assert!(Stanza::classify(other).is_none());
    }

    #[test]
    fn muc_presence_detection_covers_both_namespaces() {
        let join: Element = "<presence xmlns='jabber:component:accept'>\
             <x xmlns='http://jabber.org/protocol/muc'/></presence>"
            .parse()
            .unwrap();
        let presence = Presence::try_from(join).unwrap();
        assert!(is_muc_presence(&presence));

        let user: Element = "<presence xmlns='jabber:component:accept'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='member' role='participant'/></x></presence>"
            .parse()
            .unwrap();
        let presence = Presence::try_from(user).unwrap();
        assert!(is_muc_presence(&presence));
        let user = muc_user(&presence).unwrap();
        assert_eq!(user.items.len(), 1);

        let plain = Presence::new(PresenceType::None);
        assert!(!is_muc_presence(&plain));
    }

    #[test]
    fn nick_change_marker_is_visible() {
        let raw: Element = "<presence xmlns='jabber:component:accept' type='unavailable'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='member' role='participant' nick='newbird'/>\
             <status code='303'/></x></presence>"
            .parse()
            .unwrap();
        let presence = Presence::try_from(raw).unwrap();
        let user = muc_user(&presence).unwrap();
        assert!(user.status.contains(&Status::NewNick));
        assert_eq!(user.items[0].nick.as_deref(), Some("newbird"));
    }

    #[test]
    fn legacy_codes_match_the_error_table() {
        let cases = [
            (DefinedCondition::NotAuthorized, 401),
            (DefinedCondition::Forbidden, 403),
            (DefinedCondition::ItemNotFound, 404),
            (DefinedCondition::NotAllowed, 405),
            (DefinedCondition::NotAcceptable, 406),
            (DefinedCondition::RegistrationRequired, 407),
            (DefinedCondition::Conflict, 409),
            (DefinedCondition::ServiceUnavailable, 503),
        ];
        for (condition, code) in cases {
            let error = StanzaError::new(
                xmpp_parsers::stanza_error::ErrorType::Cancel,
                condition,
                "en",
                "",
            );
            assert_eq!(legacy_error_code(&error), Some(code));
        }

        let unmapped = StanzaError::new(
            xmpp_parsers::stanza_error::ErrorType::Cancel,
            DefinedCondition::InternalServerError,
            "en",
            "",
        );
        assert_eq!(legacy_error_code(&unmapped), None);
    }

    #[test]
    fn delay_stamp_accepts_modern_and_legacy_forms() {
        let modern: Element =
            "<delay xmlns='urn:xmpp:delay' from='x@y' stamp='2009-03-01T12:30:00Z'/>"
                .parse()
                .unwrap();
        let stamp = delay_stamp(&[modern]).unwrap();
        assert_eq!(stamp.to_string(), "2009-03-01 12:30:00");

        let legacy: Element = "<x xmlns='jabber:x:delay' stamp='20090301T12:30:00'/>"
            .parse()
            .unwrap();
        let stamp = delay_stamp(&[legacy]).unwrap();
        assert_eq!(stamp.to_string(), "2009-03-01 12:30:00");

        assert_eq!(delay_stamp(&[]), None);
    }

    #[test]
    fn join_presence_carries_password_and_history() {
        let room: BareJid = "kitchen@muc.example.org".parse().unwrap();
        let presence = muc_join(&room, "alice", "hunter2").unwrap();
        assert_eq!(
            presence.to.as_ref().map(ToString::to_string).as_deref(),
            Some("kitchen@muc.example.org/alice")
        );
        let x = &presence.payloads[0];
        assert!(x.is("x", NS_MUC));
        assert_eq!(
            x.get_child("password", NS_MUC).map(|p| p.text()),
            Some("hunter2".to_string())
        );
        let history = x.get_child("history", NS_MUC).unwrap();
        assert_eq!(history.attr("maxchars"), Some("10000"));
        assert_eq!(history.attr("maxstanzas"), Some("100"));
    }

    #[test]
    fn role_iq_targets_the_room() {
        let room: BareJid = "kitchen@muc.example.org".parse().unwrap();
        let iq = muc_role_iq("mode1", &room, "cook", "moderator");
        assert_eq!(iq.id, "mode1");
        let IqType::Set(query) = &iq.payload else {
            panic!("expected a set iq");
        };
        assert!(query.is("query", NS_MUC_ADMIN));
        let item = query.get_child("item", NS_MUC_ADMIN).unwrap();
        assert_eq!(item.attr("nick"), Some("cook"));
        assert_eq!(item.attr("role"), Some("moderator"));
    }
}
