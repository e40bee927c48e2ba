//! The multi-room nick-change coordinator.
//!
//! Renaming on IRC is atomic; renaming across N MUCs is not. The
//! coordinator tracks one rename epoch across every joined room and
//! settles it all-or-nothing: either every room confirmed the new nick
//! (status code 303) and the rename commits, or at least one room
//! reported a conflict (409) and the rooms that did change are rolled
//! back to the original nickname.

use std::collections::HashMap;

use jid::BareJid;

#[derive(Debug, Clone, Copy, Default)]
struct RoomResult {
    checked: bool,
    changed: bool,
}

#[derive(Debug)]
pub struct PendingRename {
    /// The nick the outstanding presences carry: the requested nick,
    /// or the original one while rolling back.
    target_nick: String,
    rooms: HashMap<BareJid, RoomResult>,
    rolling_back: bool,
}

/// What the session should do after feeding an event in.
#[derive(Debug, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Rooms are still outstanding.
    InFlight,
    /// Every room confirmed: emit the NICK line and commit.
    Committed { new_nick: String },
    /// Conflict settled the epoch: re-send presence with the original
    /// nick to `rooms` and emit the conflict ERROR line.
    RolledBack { rooms: Vec<BareJid> },
    /// A rollback epoch finished; nothing to emit.
    Settled,
}

/// Coordinator state machine: Idle → Pending → (Commit | Rollback) →
/// Idle.
#[derive(Debug, Default)]
pub enum NickChange {
    #[default]
    Idle,
    Pending(PendingRename),
}

impl NickChange {
    /// Open a rename epoch over the given rooms.
    pub fn begin<I>(&mut self, target_nick: &str, rooms: I)
    where
        I: IntoIterator<Item = BareJid>,
    {
        *self = NickChange::Pending(PendingRename {
            target_nick: target_nick.to_string(),
            rooms: rooms
                .into_iter()
                .map(|room| (room, RoomResult::default()))
                .collect(),
            rolling_back: false,
        });
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, NickChange::Pending(_))
    }

    /// True when `room` has an outstanding result in this epoch.
    pub fn awaits(&self, room: &BareJid) -> bool {
        match self {
            NickChange::Pending(pending) => pending.rooms.contains_key(room),
            NickChange::Idle => false,
        }
    }

    /// The nick the outstanding presences were sent with.
    pub fn target_nick(&self) -> Option<&str> {
        match self {
            NickChange::Pending(pending) => Some(&pending.target_nick),
            NickChange::Idle => None,
        }
    }

    /// Record a 303 confirmation from `room`.
    pub fn on_changed(&mut self, room: &BareJid) -> RenameOutcome {
        self.record(room, true)
    }

    /// Record a 409 conflict from `room`.
    pub fn on_conflict(&mut self, room: &BareJid) -> RenameOutcome {
        self.record(room, false)
    }

    fn record(&mut self, room: &BareJid, changed: bool) -> RenameOutcome {
        let NickChange::Pending(pending) = self else {
            return RenameOutcome::InFlight;
        };
        let Some(result) = pending.rooms.get_mut(room) else {
            return RenameOutcome::InFlight;
        };
        result.checked = true;
        result.changed = changed;

        if pending.rooms.values().any(|r| !r.checked) {
            return RenameOutcome::InFlight;
        }

        // Epoch settled: commit, finish a rollback, or start one.
        if pending.rooms.values().all(|r| r.changed) {
            let outcome = if pending.rolling_back {
                RenameOutcome::Settled
            } else {
                RenameOutcome::Committed {
                    new_nick: pending.target_nick.clone(),
                }
            };
            *self = NickChange::Idle;
            return outcome;
        }

        let changed_rooms: Vec<BareJid> = pending
            .rooms
            .iter()
            .filter(|(_, r)| r.changed)
            .map(|(room, _)| room.clone())
            .collect();

        if changed_rooms.is_empty() {
            *self = NickChange::Idle;
        } else {
            // The rooms that did rename get presence with the original
            // nick re-sent; their 303 replies settle this new epoch.
            pending.rooms = changed_rooms
                .iter()
                .cloned()
                .map(|room| (room, RoomResult::default()))
                .collect();
            pending.rolling_back = true;
        }
        RenameOutcome::RolledBack {
            rooms: changed_rooms,
        }
    }
}
