//! End-to-end session tests: an IRC client on an in-memory duplex
//! stream, the component side faked through the hub channels.

use std::time::Duration;

use jid::BareJid;
use minidom::Element;
use pontoon_gateway::stanza::Stanza;
use pontoon_gateway::{GatewayConfig, HubHandle, Session, SessionRegistration};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

const SERVER: &str = "irc.example.org";
const MUC: &str = "muc.example.org";
const SESSION_JID: &str = "abc123@irc.example.org";

struct Harness {
    writer: WriteHalf<DuplexStream>,
    reader: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    to_session: mpsc::Sender<Stanza>,
    from_session: mpsc::Receiver<Element>,
}

impl Harness {
    fn spawn() -> Harness {
        Harness::spawn_with(false)
    }

    fn spawn_with(short_channels: bool) -> Harness {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);

        let bare_jid: BareJid = SESSION_JID.parse().unwrap();
        let registration = SessionRegistration {
            bare_jid,
            handle: HubHandle::detached(outbound_tx),
            inbound: inbound_rx,
        };
        let config = GatewayConfig {
            server: "127.0.0.1".to_string(),
            server_port: 5347,
            component_name: SERVER.to_string(),
            component_secret: "secret".to_string(),
            muc_server: MUC.to_string(),
            irc_port: 6667,
            short_channels,
        };
        tokio::spawn(Session::new(server, config, registration).run());

        let (read_half, write_half) = tokio::io::split(client);
        Harness {
            writer: write_half,
            reader: BufReader::new(read_half).lines(),
            to_session: inbound_tx,
            from_session: outbound_rx,
        }
    }

    async fn send_irc(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn expect_line(&mut self) -> String {
        timeout(Duration::from_secs(5), self.reader.next_line())
            .await
            .expect("timed out waiting for an IRC line")
            .expect("IRC stream error")
            .expect("IRC stream closed")
    }

    async fn next_stanza(&mut self) -> Element {
        timeout(Duration::from_secs(5), self.from_session.recv())
            .await
            .expect("timed out waiting for an outbound stanza")
            .expect("outbound channel closed")
    }

    async fn inject(&mut self, xml: &str) {
        let element: Element = xml.parse().expect("test stanza must parse");
        let stanza = Stanza::classify(element).expect("test stanza must classify");
        self.to_session.send(stanza).await.unwrap();
    }

    /// Register as `alice` and swallow the welcome block.
    async fn register(&mut self) {
        self.send_irc("NICK alice").await;
        for _ in 0..8 {
            self.expect_line().await;
        }
    }

    /// Join a room and confirm it with a self-presence carrying the
    /// given role; swallows the join burst and returns the outbound
    /// join presence.
    async fn join(&mut self, room: &str, role: &str) -> Element {
        self.send_irc(&format!("JOIN #{room}")).await;
        let presence = self.next_stanza().await;

        self.inject(&format!(
            "<presence xmlns='jabber:component:accept' \
             from='{room}/alice' to='{SESSION_JID}'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='member' role='{role}'/>\
             <status code='110'/></x></presence>"
        ))
        .await;
        // JOIN, MODE +n, 353, 366
        for _ in 0..4 {
            self.expect_line().await;
        }
        presence
    }

    /// PING/PONG round-trip, used to prove no other line is pending.
    async fn sync(&mut self) {
        self.send_irc("PING :keepalive").await;
        let line = self.expect_line().await;
        assert_eq!(line, format!("PONG {SERVER}"), "unexpected line: {line}");
    }
}

#[tokio::test]
async fn registration_emits_notice_auth_and_welcome() {
    let mut h = Harness::spawn();
    h.send_irc("NICK alice").await;

    for _ in 0..4 {
        let line = h.expect_line().await;
        assert!(line.starts_with("NOTICE AUTH :***"), "line: {line}");
    }
    let welcome = h.expect_line().await;
    assert!(
        welcome.starts_with(&format!(":{SERVER} 001 alice :Welcome")),
        "line: {welcome}"
    );
    let yourhost = h.expect_line().await;
    assert!(yourhost.contains("port 6667"), "line: {yourhost}");
    h.expect_line().await; // 003
    let myinfo = h.expect_line().await;
    assert!(myinfo.ends_with("spmAFkPBaTuUovbn q"), "line: {myinfo}");
}

#[tokio::test]
async fn commands_before_nick_are_ignored() {
    let mut h = Harness::spawn();
    h.send_irc("JOIN #kitchen@muc.example.org").await;
    h.send_irc("PASS hunter2").await;
    h.send_irc("NICK alice").await;
    let first = h.expect_line().await;
    assert!(first.starts_with("NOTICE AUTH"), "line: {first}");
}

#[tokio::test]
async fn join_sends_presence_and_replays_names() {
    let mut h = Harness::spawn();
    h.register().await;

    h.send_irc("JOIN #kitchen@muc.example.org hunter2").await;
    let presence = h.next_stanza().await;
    assert_eq!(presence.name(), "presence");
    assert_eq!(presence.attr("to"), Some("kitchen@muc.example.org/alice"));
    let x = presence
        .get_child("x", "http://jabber.org/protocol/muc")
        .expect("join presence carries the muc payload");
    assert_eq!(
        x.get_child("password", "http://jabber.org/protocol/muc")
            .map(|p| p.text()),
        Some("hunter2".to_string())
    );
    let history = x
        .get_child("history", "http://jabber.org/protocol/muc")
        .unwrap();
    assert_eq!(history.attr("maxchars"), Some("10000"));
    assert_eq!(history.attr("maxstanzas"), Some("100"));

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/alice' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='owner' role='moderator'/>\
         <status code='110'/></x></presence>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        ":alice JOIN :#kitchen@muc.example.org"
    );
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} MODE #kitchen@muc.example.org +n")
    );
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 353 alice = #kitchen@muc.example.org :@alice")
    );
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 366 alice #kitchen@muc.example.org :End of /NAMES list.")
    );
}

#[tokio::test]
async fn channel_privmsg_becomes_groupchat() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.send_irc("PRIVMSG #kitchen@muc.example.org :hello").await;
    let message = h.next_stanza().await;
    assert_eq!(message.name(), "message");
    assert_eq!(message.attr("type"), Some("groupchat"));
    assert_eq!(message.attr("to"), Some("kitchen@muc.example.org"));
    assert_eq!(
        message
            .get_child("body", "jabber:component:accept")
            .map(|b| b.text()),
        Some("hello".to_string())
    );
}

#[tokio::test]
async fn inbound_me_body_becomes_ctcp_action() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    // A new occupant speaks; first their join presence, then the body.
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='visitor'/></x></presence>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob JOIN :#kitchen@muc.example.org"
    );

    h.inject(&format!(
        "<message xmlns='jabber:component:accept' type='groupchat' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <body>/me waves</body></message>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob PRIVMSG #kitchen@muc.example.org \
         :\u{1}ACTION waves\u{1}"
    );
}

#[tokio::test]
async fn own_live_messages_are_suppressed_but_history_is_replayed() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    // Live echo of our own message: nothing.
    h.inject(&format!(
        "<message xmlns='jabber:component:accept' type='groupchat' \
         from='kitchen@muc.example.org/alice' to='{SESSION_JID}'>\
         <body>hello</body></message>"
    ))
    .await;

    // History copy with a delay stamp: relayed with the bracket prefix.
    h.inject(&format!(
        "<message xmlns='jabber:component:accept' type='groupchat' \
         from='kitchen@muc.example.org/alice' to='{SESSION_JID}'>\
         <body>old news</body>\
         <delay xmlns='urn:xmpp:delay' stamp='2009-03-01T12:30:00Z'/></message>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":alice!kitchen@muc.example.org/alice PRIVMSG #kitchen@muc.example.org \
         :[2009-03-01 12:30:00] old news"
    );
    h.sync().await;
}

#[tokio::test]
async fn subject_becomes_topic_and_is_stored() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.inject(&format!(
        "<message xmlns='jabber:component:accept' type='groupchat' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <subject>soup of the day</subject></message>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob TOPIC #kitchen@muc.example.org :soup of the day"
    );

    // The stored subject answers a TOPIC query.
    h.send_irc("TOPIC #kitchen@muc.example.org").await;
    let topic = h.expect_line().await;
    assert_eq!(
        topic,
        format!(":{SERVER} 332 alice #kitchen@muc.example.org :soup of the day")
    );
    let who_time = h.expect_line().await;
    assert!(
        who_time.starts_with(&format!(":{SERVER} 333 alice #kitchen@muc.example.org bob ")),
        "line: {who_time}"
    );
}

#[tokio::test]
async fn nick_conflict_rolls_back_and_keeps_the_old_nick() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("one@muc.example.org", "participant").await;
    h.join("two@muc.example.org", "participant").await;

    h.send_irc("NICK bob").await;
    let first = h.next_stanza().await;
    let second = h.next_stanza().await;
    let mut targets = vec![
        first.attr("to").unwrap().to_string(),
        second.attr("to").unwrap().to_string(),
    ];
    targets.sort();
    assert_eq!(
        targets,
        vec!["one@muc.example.org/bob", "two@muc.example.org/bob"]
    );

    // Room one confirms the rename.
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='unavailable' \
         from='one@muc.example.org/alice' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='participant' nick='bob'/>\
         <status code='303'/></x></presence>"
    ))
    .await;

    // Room two reports a conflict.
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='error' \
         from='two@muc.example.org/bob' to='{SESSION_JID}'>\
         <error type='cancel'>\
         <conflict xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></presence>"
    ))
    .await;

    // Room one gets rolled back to the original nick.
    let rollback = h.next_stanza().await;
    assert_eq!(rollback.name(), "presence");
    assert_eq!(rollback.attr("to"), Some("one@muc.example.org/alice"));

    assert_eq!(
        h.expect_line().await,
        "ERROR :Nick conflicts in some MUC wont change"
    );

    // The rollback confirmation settles quietly.
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='unavailable' \
         from='one@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='participant' nick='alice'/>\
         <status code='303'/></x></presence>"
    ))
    .await;

    // No NICK line was ever sent; the next line is the PONG sentinel.
    h.sync().await;

    // The session still answers to alice: a rename to the same nick is
    // a no-op, proving the nickname did not change.
    h.send_irc("NICK alice").await;
    h.sync().await;
}

#[tokio::test]
async fn committed_rename_emits_one_nick_line() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("one@muc.example.org", "participant").await;
    h.join("two@muc.example.org", "participant").await;

    h.send_irc("NICK bob").await;
    h.next_stanza().await;
    h.next_stanza().await;

    for room in ["one", "two"] {
        h.inject(&format!(
            "<presence xmlns='jabber:component:accept' type='unavailable' \
             from='{room}@muc.example.org/alice' to='{SESSION_JID}'>\
             <x xmlns='http://jabber.org/protocol/muc#user'>\
             <item affiliation='member' role='participant' nick='bob'/>\
             <status code='303'/></x></presence>"
        ))
        .await;
    }

    assert_eq!(h.expect_line().await, ":alice NICK :bob");
    h.sync().await;
}

#[tokio::test]
async fn five_pings_probe_rooms_and_a_404_flags_disconnect() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    for _ in 0..4 {
        h.send_irc("PING :keepalive").await;
        assert_eq!(h.expect_line().await, format!("PONG {SERVER}"));
    }
    h.send_irc("PING :keepalive").await;
    let probe = h.next_stanza().await;
    assert_eq!(probe.name(), "iq");
    assert_eq!(probe.attr("type"), Some("get"));
    assert_eq!(probe.attr("id"), Some("disco_room_info"));
    assert_eq!(probe.attr("to"), Some("kitchen@muc.example.org"));
    assert_eq!(h.expect_line().await, format!("PONG {SERVER}"));

    h.inject(&format!(
        "<iq xmlns='jabber:component:accept' type='error' id='disco_room_info' \
         from='kitchen@muc.example.org' to='{SESSION_JID}'>\
         <error type='cancel'>\
         <item-not-found xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></iq>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        format!(
            ":{SERVER} 404 alice #kitchen@muc.example.org :Cannot send to channel"
        )
    );
    assert_eq!(h.expect_line().await, "ERROR :XMPP ERROR MUC DISCONNECTED");
    let warning = h.expect_line().await;
    assert!(
        warning.starts_with(
            ":pontoon!kitchen@muc.example.org/pontoon PRIVMSG #kitchen@muc.example.org :MUC IS DISCONNECTED"
        ),
        "line: {warning}"
    );
}

#[tokio::test]
async fn join_error_maps_to_numeric_475() {
    let mut h = Harness::spawn();
    h.register().await;

    h.send_irc("JOIN #vault@muc.example.org").await;
    h.next_stanza().await;

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='error' \
         from='vault@muc.example.org/alice' to='{SESSION_JID}'>\
         <error type='auth'>\
         <not-authorized xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></presence>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 475 alice #vault@muc.example.org :Cannot join channel (+k)")
    );
    assert_eq!(
        h.expect_line().await,
        "ERROR :XMPP ERROR Password required to join"
    );

    // The failed join left no queue entry: joining again re-sends the
    // presence instead of being swallowed as a duplicate.
    h.send_irc("JOIN #vault@muc.example.org").await;
    let retry = h.next_stanza().await;
    assert_eq!(retry.attr("to"), Some("vault@muc.example.org/alice"));
}

#[tokio::test]
async fn occupant_part_and_role_changes_round_trip() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='participant'/></x></presence>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob JOIN :#kitchen@muc.example.org"
    );
    let voice = h.expect_line().await;
    assert_eq!(
        voice,
        ":pontoon!kitchen@muc.example.org/pontoon MODE #kitchen@muc.example.org +v bob"
    );

    // Promotion to moderator emits the +o/-v pair.
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='admin' role='moderator'/></x></presence>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":pontoon!kitchen@muc.example.org/pontoon MODE #kitchen@muc.example.org +o bob"
    );
    assert_eq!(
        h.expect_line().await,
        ":pontoon!kitchen@muc.example.org/pontoon MODE #kitchen@muc.example.org -v bob"
    );

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='unavailable' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='none'/></x></presence>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob PART #kitchen@muc.example.org :left"
    );
}

#[tokio::test]
async fn occupant_rename_becomes_a_nick_line() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='visitor'/></x></presence>"
    ))
    .await;
    h.expect_line().await; // JOIN

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' type='unavailable' \
         from='kitchen@muc.example.org/bob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='visitor' nick='rob'/>\
         <status code='303'/></x></presence>"
    ))
    .await;
    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/rob' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='visitor'/></x></presence>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        ":bob!kitchen@muc.example.org/bob NICK :rob"
    );
    h.sync().await;
}

#[tokio::test]
async fn quit_sends_unavailable_to_every_room() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("one@muc.example.org", "participant").await;

    h.send_irc("QUIT :bye").await;
    let leave = h.next_stanza().await;
    assert_eq!(leave.name(), "presence");
    assert_eq!(leave.attr("type"), Some("unavailable"));
    assert_eq!(leave.attr("to"), Some("one@muc.example.org/alice"));
}

#[tokio::test]
async fn who_query_renders_disco_items() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "moderator").await;

    h.send_irc("WHO #kitchen@muc.example.org").await;
    let query = h.next_stanza().await;
    assert_eq!(query.attr("id"), Some("disco_muc_users"));
    assert_eq!(query.attr("to"), Some("kitchen@muc.example.org"));

    h.inject(&format!(
        "<iq xmlns='jabber:component:accept' type='result' id='disco_muc_users' \
         from='kitchen@muc.example.org' to='{SESSION_JID}'>\
         <query xmlns='http://jabber.org/protocol/disco#items'>\
         <item jid='kitchen@muc.example.org/alice'/></query></iq>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        format!(
            ":{SERVER} 352 alice #kitchen@muc.example.org alice muc.example.org \
             {SERVER} alice H@ :0 alice"
        )
    );
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 315 alice #kitchen@muc.example.org :End of /WHO list.")
    );
}

#[tokio::test]
async fn channel_mode_query_maps_disco_features() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.send_irc("MODE #kitchen@muc.example.org").await;
    let query = h.next_stanza().await;
    assert_eq!(query.attr("id"), Some("disco_room_info"));

    h.inject(&format!(
        "<iq xmlns='jabber:component:accept' type='result' id='disco_room_info' \
         from='kitchen@muc.example.org' to='{SESSION_JID}'>\
         <query xmlns='http://jabber.org/protocol/disco#info'>\
         <identity category='conference' type='text' name='kitchen'/>\
         <feature var='muc_public'/>\
         <feature var='muc_persistent'/></query></iq>"
    ))
    .await;

    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 324 alice #kitchen@muc.example.org +PB")
    );
    let creation = h.expect_line().await;
    assert!(
        creation.starts_with(&format!(":{SERVER} 329 alice #kitchen@muc.example.org ")),
        "line: {creation}"
    );
}

#[tokio::test]
async fn mode_o_sends_muc_admin_role() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "moderator").await;

    h.send_irc("MODE #kitchen@muc.example.org +o bob").await;
    let iq = h.next_stanza().await;
    assert_eq!(iq.name(), "iq");
    assert_eq!(iq.attr("type"), Some("set"));
    let query = iq
        .get_child("query", "http://jabber.org/protocol/muc#admin")
        .expect("muc#admin query");
    let item = query
        .get_child("item", "http://jabber.org/protocol/muc#admin")
        .unwrap();
    assert_eq!(item.attr("nick"), Some("bob"));
    assert_eq!(item.attr("role"), Some("moderator"));
}

#[tokio::test]
async fn private_privmsg_resolves_through_the_identity_map() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/loud!bird' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='visitor'/></x></presence>"
    ))
    .await;
    assert_eq!(
        h.expect_line().await,
        ":loud_bird!kitchen@muc.example.org/loud%21bird JOIN :#kitchen@muc.example.org"
    );

    // The lossy nick still resolves to the exact occupant JID.
    h.send_irc("PRIVMSG loud_bird :psst").await;
    let message = h.next_stanza().await;
    assert_eq!(message.attr("type"), Some("chat"));
    assert_eq!(message.attr("to"), Some("kitchen@muc.example.org/loud!bird"));
}

#[tokio::test]
async fn non_utf8_input_is_reported_and_dropped() {
    let mut h = Harness::spawn();
    h.register().await;

    h.writer.write_all(b"PRIVMSG x :\xff\xfe\r\n").await.unwrap();
    let line = h.expect_line().await;
    assert!(
        line.starts_with("ERROR :pontoon error Input from IRC client was not in utf-8"),
        "line: {line}"
    );
    h.sync().await;
}

#[tokio::test]
async fn short_channel_mode_expands_and_contracts_names() {
    let mut h = Harness::spawn_with(true);
    h.register().await;

    // `#kitchen` expands to the configured MUC service.
    h.send_irc("JOIN #kitchen").await;
    let presence = h.next_stanza().await;
    assert_eq!(presence.attr("to"), Some("kitchen@muc.example.org/alice"));

    h.inject(&format!(
        "<presence xmlns='jabber:component:accept' \
         from='kitchen@muc.example.org/alice' to='{SESSION_JID}'>\
         <x xmlns='http://jabber.org/protocol/muc#user'>\
         <item affiliation='member' role='participant'/>\
         <status code='110'/></x></presence>"
    ))
    .await;
    assert_eq!(h.expect_line().await, ":alice JOIN :#kitchen");
}

#[tokio::test]
async fn away_round_trip_sets_and_clears_presence() {
    let mut h = Harness::spawn();
    h.register().await;
    h.join("kitchen@muc.example.org", "participant").await;

    h.send_irc("AWAY :lunch").await;
    let away = h.next_stanza().await;
    assert_eq!(away.name(), "presence");
    assert_eq!(away.attr("to"), Some("kitchen@muc.example.org/alice"));
    assert_eq!(
        away.get_child("show", "jabber:component:accept").map(|s| s.text()),
        Some("away".to_string())
    );
    assert_eq!(
        away.get_child("status", "jabber:component:accept").map(|s| s.text()),
        Some("lunch".to_string())
    );
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 306 alice :You have been marked as being away")
    );

    h.send_irc("AWAY").await;
    let back = h.next_stanza().await;
    assert!(back.get_child("show", "jabber:component:accept").is_none());
    assert_eq!(
        h.expect_line().await,
        format!(":{SERVER} 305 alice :You are no longer marked as being away")
    );
}
