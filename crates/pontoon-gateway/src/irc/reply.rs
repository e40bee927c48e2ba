//! Outbound IRC formatters.
//!
//! One function per line shape. Server-origin lines are prefixed
//! `:<server>`, user-origin lines `:<nick>!<host>` where the host is a
//! percent-encoded JID (see [`crate::identity::host_from_jid`]). None
//! of these append the CR/LF pair; the session does that on write.

use crate::{GATEWAY_NAME, GATEWAY_VERSION};

/// The `NOTICE AUTH` preamble plus numerics 001-004, emitted once the
/// first NICK fixes the client's nickname.
pub fn registration_burst(
    server: &str,
    nick: &str,
    host: &str,
    port: u16,
    started: &str,
) -> Vec<String> {
    vec![
        "NOTICE AUTH :*** Looking up your hostname...".to_string(),
        "NOTICE AUTH :*** Found your hostname, welcome back".to_string(),
        "NOTICE AUTH :*** Checking ident".to_string(),
        "NOTICE AUTH :*** No identd (auth) response".to_string(),
        format!(
            ":{server} 001 {nick} :Welcome to {GATEWAY_NAME}, IRC to XMPP gateway {nick}!{host}"
        ),
        format!(
            ":{server} 002 {nick} :Your host is {server} [{server} port {port}] \
             running version {GATEWAY_NAME}-{GATEWAY_VERSION}"
        ),
        format!(":{server} 003 {nick} :This server was created {started}"),
        format!(":{server} 004 {nick} :{server} {GATEWAY_NAME}-{GATEWAY_VERSION} spmAFkPBaTuUovbn q"),
    ]
}

pub fn pong(server: &str) -> String {
    format!("PONG {server}")
}

/// Gateway-to-user notice. Deliberately unprefixed.
pub fn notice(nick: &str, text: &str) -> String {
    format!("NOTICE {nick} :{text}")
}

pub fn join(nick: &str, host: &str, channel: &str) -> String {
    format!(":{nick}!{host} JOIN :{channel}")
}

pub fn self_join(nick: &str, channel: &str) -> String {
    format!(":{nick} JOIN :{channel}")
}

pub fn part(nick: &str, host: &str, channel: &str, reason: &str) -> String {
    format!(":{nick}!{host} PART {channel} :{reason}")
}

pub fn nick_change(old_nick: &str, host: &str, new_nick: &str) -> String {
    format!(":{old_nick}!{host} NICK :{new_nick}")
}

pub fn self_nick_change(old_nick: &str, new_nick: &str) -> String {
    format!(":{old_nick} NICK :{new_nick}")
}

pub fn topic(nick: &str, host: &str, channel: &str, text: &str) -> String {
    format!(":{nick}!{host} TOPIC {channel} :{text}")
}

pub fn privmsg(nick: &str, host: &str, target: &str, text: &str) -> String {
    format!(":{nick}!{host} PRIVMSG {target} :{text}")
}

/// Channel mode line with a server prefix, e.g. the `+n` after a self
/// join.
pub fn channel_mode(server: &str, channel: &str, modes: &str) -> String {
    format!(":{server} MODE {channel} {modes}")
}

/// Channel user mode line (`+o`/`+v` and friends) attributed to the
/// occupant who caused it.
pub fn user_mode(
    giver_nick: &str,
    giver_host: &str,
    channel: &str,
    modes: &str,
    taker_nick: &str,
) -> String {
    format!(":{giver_nick}!{giver_host} MODE {channel} {modes} {taker_nick}")
}

/// Echo of a user mode change against the client itself.
pub fn self_mode(nick: &str, args: &str) -> String {
    format!(":{nick} MODE {nick} :{args}")
}

pub fn xmpp_error(message: &str) -> String {
    format!("ERROR :XMPP ERROR {message}")
}

pub fn gateway_error(message: &str) -> String {
    format!("ERROR :{GATEWAY_NAME} error {message}")
}

pub fn nick_conflict_error() -> String {
    "ERROR :Nick conflicts in some MUC wont change".to_string()
}

pub fn rpl_unaway(server: &str, nick: &str) -> String {
    format!(":{server} 305 {nick} :You are no longer marked as being away")
}

pub fn rpl_nowaway(server: &str, nick: &str) -> String {
    format!(":{server} 306 {nick} :You have been marked as being away")
}

pub fn rpl_whois_user(
    server: &str,
    nick: &str,
    whonick: &str,
    node: &str,
    domain: &str,
) -> String {
    format!(":{server} 311 {nick} {whonick} {node} {domain} * :{whonick}")
}

pub fn rpl_whois_server(server: &str, nick: &str, whonick: &str) -> String {
    format!(":{server} 312 {nick} {whonick} {server} :XMPP {GATEWAY_NAME}")
}

pub fn rpl_end_of_whois(server: &str, nick: &str, whonick: &str) -> String {
    format!(":{server} 318 {nick} {whonick} :End of /WHOIS list.")
}

pub fn rpl_end_of_who(server: &str, nick: &str, channel: &str) -> String {
    format!(":{server} 315 {nick} {channel} :End of /WHO list.")
}

/// 352: `<user>` is the occupant resource, `<host>` the room domain,
/// `<flags>` H/G with `@`/`+` appended per role.
pub fn rpl_who_reply(
    server: &str,
    nick: &str,
    channel: &str,
    user: &str,
    host: &str,
    whonick: &str,
    flags: &str,
    realname: &str,
) -> String {
    format!(":{server} 352 {nick} {channel} {user} {host} {server} {whonick} {flags} :0 {realname}")
}

pub fn rpl_list_start(server: &str, nick: &str) -> String {
    format!(":{server} 321 {nick} Channel :Users Name")
}

pub fn rpl_list_item(server: &str, nick: &str, channel: &str, name: &str) -> String {
    format!(":{server} 322 {nick} {channel} 0 :{name}")
}

pub fn rpl_list_end(server: &str, nick: &str) -> String {
    format!(":{server} 323 {nick} :End of /LIST")
}

pub fn rpl_channel_mode(server: &str, nick: &str, channel: &str, modes: &str) -> String {
    format!(":{server} 324 {nick} {channel} {modes}")
}

pub fn rpl_creation_time(server: &str, nick: &str, channel: &str, timestamp: i64) -> String {
    format!(":{server} 329 {nick} {channel} {timestamp}")
}

pub fn rpl_topic(server: &str, nick: &str, channel: &str, text: &str) -> String {
    format!(":{server} 332 {nick} {channel} :{text}")
}

pub fn rpl_topic_who_time(
    server: &str,
    nick: &str,
    channel: &str,
    who: &str,
    timestamp: i64,
) -> String {
    format!(":{server} 333 {nick} {channel} {who} {timestamp}")
}

pub fn rpl_name_reply(server: &str, nick: &str, channel: &str, member: &str) -> String {
    format!(":{server} 353 {nick} = {channel} :{member}")
}

pub fn rpl_end_of_names(server: &str, nick: &str, channel: &str) -> String {
    format!(":{server} 366 {nick} {channel} :End of /NAMES list.")
}

pub fn rpl_end_of_ban_list(server: &str, nick: &str, channel: &str) -> String {
    format!(":{server} 368 {nick} {channel} :End of Channel Ban List")
}

/// 403 in the shape used for channel-less failures (bad TOPIC target).
pub fn err_no_such_channel(server: &str, nick: &str) -> String {
    format!(":{server} 403 {nick} {server} :That channel doesn't exist")
}

pub fn err_password_mismatch(server: &str) -> String {
    format!(":{server} 464 :Password incorrect")
}

/// Channel-scoped numeric with the RFC-style text for its code.
pub fn channel_numeric(server: &str, number: u16, nick: &str, channel: &str) -> String {
    format!(
        ":{server} {number} {nick} {channel} :{}",
        channel_error_text(number)
    )
}

/// RFC-style descriptions for the channel error numerics.
pub fn channel_error_text(number: u16) -> &'static str {
    match number {
        403 => "No such channel",
        404 => "Cannot send to channel",
        437 => "Nick/channel is temporarily unavailable",
        467 => "Channel key already set",
        471 => "Cannot join channel (+l)",
        473 => "Cannot join channel (+i)",
        474 => "Cannot join channel (+b)",
        475 => "Cannot join channel (+k)",
        476 => "Bad Channel Mask",
        477 => "Channel doesn't support modes",
        478 => "Channel list is full",
        481 => "Permission Denied- You're not an IRC operator",
        482 => "You're not channel operator",
        _ => "No text",
    }
}

/// Wrap a message in a CTCP ACTION envelope.
pub fn ctcp_action(text: &str) -> String {
    format!("\u{1}ACTION {text}\u{1}")
}

/// Unwrap a CTCP ACTION into the `/me` form used on the XMPP side.
pub fn action_to_me(text: &str) -> Option<String> {
    let start = text.find("\u{1}ACTION ")?;
    let end = text.rfind('\u{1}')?;
    let inner = text.get(start + 8..end)?;
    Some(format!("/me {inner}"))
}

/// Strip a leading `/me ` (any case), the inverse of [`action_to_me`]
/// composed with [`ctcp_action`].
pub fn me_body(line: &str) -> Option<&str> {
    let head = line.get(..4)?;
    if head.eq_ignore_ascii_case("/me ") {
        Some(&line[4..])
    } else {
        None
    }
}
