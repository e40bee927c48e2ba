//! Per-room session state: occupant roster, topic, liveness.

use std::collections::HashMap;

use jid::{BareJid, FullJid};
use xmpp_parsers::muc::user::{Affiliation, Role};
use xmpp_parsers::presence::Show;

/// One occupant of a MUC, as last seen in presence.
#[derive(Debug, Clone, PartialEq)]
pub struct Occupant {
    pub role: Role,
    pub affiliation: Affiliation,
    pub show: Option<Show>,
    pub status: Option<String>,
}

impl Occupant {
    /// WHO status flags: `H`ere or `G`one, with `@`/`+` appended for
    /// moderators and participants.
    pub fn who_flags(&self) -> String {
        let here = match self.show {
            Some(Show::Away) | Some(Show::Xa) | Some(Show::Dnd) => "G",
            _ => "H",
        };
        format!("{}{}", here, self.rank_sigil())
    }

    /// NAMES list prefix for this occupant's role.
    pub fn rank_sigil(&self) -> &'static str {
        match self.role {
            Role::Moderator => "@",
            Role::Participant => "+",
            _ => "",
        }
    }

    /// The mode granted on join, if the role carries one.
    pub fn join_mode(&self) -> Option<&'static str> {
        match self.role {
            Role::Moderator => Some("+o"),
            Role::Participant => Some("+v"),
            _ => None,
        }
    }
}

/// Room topic as last relayed, for TOPIC queries (332/333).
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// Liveness tracking for one room, driven by the PING-probe protocol.
///
/// `probe_pending` is set between sending a disco#info probe and any
/// reply. `disconnected` carries the escalation counter: a flagged
/// room is re-probed only every fifth PING cycle, a throttle rather
/// than a give-up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Liveness {
    pub probe_pending: bool,
    pub disconnected: Option<u8>,
}

impl Liveness {
    /// Advance one PING probe cycle. Returns true when a disco#info
    /// probe should be sent now.
    pub fn on_probe_cycle(&mut self) -> bool {
        if let Some(probes) = self.disconnected.as_mut() {
            if *probes < 5 {
                *probes += 1;
                return false;
            }
            *probes = 0;
            self.probe_pending = true;
            return true;
        }
        if self.probe_pending {
            return false;
        }
        self.probe_pending = true;
        true
    }

    /// A probe was answered; the room is reachable again.
    pub fn on_reply(&mut self) {
        self.probe_pending = false;
        self.disconnected = None;
    }

    /// A probe came back item-not-found. Returns true when the room
    /// was not already flagged, i.e. the user should be warned.
    pub fn on_not_found(&mut self) -> bool {
        self.probe_pending = false;
        if self.disconnected.is_none() {
            self.disconnected = Some(0);
            true
        } else {
            false
        }
    }
}

/// State of one joined MUC.
#[derive(Debug)]
pub struct RoomState {
    pub jid: BareJid,
    pub occupants: HashMap<FullJid, Occupant>,
    pub topic: Option<Topic>,
    pub liveness: Liveness,
}

impl RoomState {
    pub fn new(jid: BareJid) -> Self {
        Self {
            jid,
            occupants: HashMap::new(),
            topic: None,
            liveness: Liveness::default(),
        }
    }

    /// Move the local user's occupant entry from `/old` to `/new`
    /// after a committed nick change.
    pub fn rename_occupant(&mut self, old_nick: &str, new_nick: &str) {
        let Ok(old_jid) = self.jid.with_resource_str(old_nick) else {
            return;
        };
        let Ok(new_jid) = self.jid.with_resource_str(new_nick) else {
            return;
        };
        if let Some(occupant) = self.occupants.remove(&old_jid) {
            self.occupants.insert(new_jid, occupant);
        }
    }
}

/// Occupants accumulated between our join presence and the confirming
/// self-presence.
#[derive(Debug, Default)]
pub struct PendingJoin {
    pub users: HashMap<FullJid, Occupant>,
}
