//! Nick derivation and the per-session identity map.
//!
//! IRC nicks are derived from JIDs: the resource for MUC occupants,
//! the node part otherwise. The derivation is lossy (` `, `!`, `:` and
//! `@` all collapse to `_`), so the map keeps the original JID for
//! every nick it ever produced and is the authoritative source for
//! PRIVMSG/WHOIS target resolution.

use std::collections::HashMap;

use jid::Jid;

/// Replace the characters IRC cannot carry in a nick with `_`.
pub fn fix_nick(nick: &str) -> String {
    nick.replace([' ', '!', ':', '@'], "_")
}

/// Build the host part of an IRC prefix from a JID, as
/// `node@domain/resource` with each part percent-encoded.
pub fn host_from_jid(jid: &Jid) -> String {
    let node = jid.node().map(|n| n.as_str()).unwrap_or_default();
    let domain = jid.domain().as_str();
    match jid.resource() {
        Some(resource) => format!(
            "{}@{}/{}",
            urlencoding::encode(node),
            urlencoding::encode(domain),
            urlencoding::encode(resource.as_str()),
        ),
        None => format!(
            "{}@{}",
            urlencoding::encode(node),
            urlencoding::encode(domain),
        ),
    }
}

/// Map from every derived nick to the JID it stands for.
///
/// Entries are never evicted: a nick stays resolvable for as long as
/// the session lives, even after its occupant left the room.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_nick: HashMap<String, Jid>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the IRC nick for a JID and record the mapping.
    ///
    /// `is_muc_jid` marks occupant JIDs (`room@service/nick`), whose
    /// nick is the resource; all other JIDs use the node part. A MUC
    /// JID without a resource is the room itself and is not recorded.
    pub fn nick_for(&mut self, jid: &Jid, is_muc_jid: bool) -> String {
        let node = jid.node().map(|n| n.as_str()).unwrap_or_default();

        if is_muc_jid {
            let Some(resource) = jid.resource() else {
                return fix_nick(node);
            };
            let nick = fix_nick(resource.as_str());
            self.by_nick.insert(nick.clone(), jid.clone());
            nick
        } else {
            let nick = fix_nick(node);
            self.by_nick.insert(nick.clone(), Jid::from(jid.to_bare()));
            nick
        }
    }

    /// Resolve a nick back to a JID.
    ///
    /// Falls back to parsing the nick as a literal JID when it was
    /// never derived here but looks like one.
    pub fn resolve(&self, nick: &str) -> Option<Jid> {
        if let Some(jid) = self.by_nick.get(nick) {
            return Some(jid.clone());
        }
        if nick.contains('@') {
            return Jid::new(nick).ok();
        }
        None
    }
}
