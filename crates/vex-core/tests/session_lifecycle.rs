//! Session lifecycle tests.
//!
//! Drives the Sans-IO engine directly: no transport, no runtime, a plain
//! clock. Server behavior is scripted by feeding JSON frames back in.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::{Value, json};
use vex_core::{
    AuthError, Call, CallError, Ed25519Keyring, Environment, Keyring, Notification, Reply,
    Session, SessionAction, SessionConfig, SessionEvent, SessionFault, SessionState,
};
use vex_proto::{ChatRequest, Frame, HistoryRequest, Request, ZERO_MESSAGE_ID};

#[derive(Clone, Default)]
struct TestEnv {
    counter: Arc<AtomicU64>,
}

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // Unique per call: counter in the leading bytes, which UUID version
        // and variant bits never overwrite.
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = if i < 4 { (n >> (8 * i)) as u8 } else { 0 };
        }
    }
}

type Actions = Vec<SessionAction<u32>>;

fn server_keys() -> Ed25519Keyring {
    Ed25519Keyring::from_secret([42; 32])
}

fn impostor_keys() -> Ed25519Keyring {
    Ed25519Keyring::from_secret([66; 32])
}

fn client_keys() -> Ed25519Keyring {
    Ed25519Keyring::from_secret([1; 32])
}

struct Harness {
    session: Session<TestEnv, Ed25519Keyring, u32>,
    now: Instant,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    fn with_config(config: SessionConfig) -> Self {
        let session = Session::new(TestEnv::default(), client_keys(), config);
        Self { session, now: Instant::now() }
    }

    fn state(&self) -> SessionState {
        self.session.state()
    }

    fn advance(&mut self, by: Duration) -> Actions {
        self.now += by;
        self.session.handle(SessionEvent::Tick { now: self.now })
    }

    fn connect(&mut self) -> Actions {
        let mut actions = self.session.start(self.now);
        actions.extend(self.session.handle(SessionEvent::TransportOpened { now: self.now }));
        actions
    }

    fn drop_transport(&mut self) -> Actions {
        self.session.handle(SessionEvent::TransportClosed {
            now: self.now,
            reason: "peer went away".into(),
        })
    }

    /// Drops the transport and waits out the reconnect delay.
    fn reconnect(&mut self) -> Actions {
        let mut actions = self.drop_transport();
        actions.extend(self.advance(Duration::from_secs(5)));
        actions.extend(self.session.handle(SessionEvent::TransportOpened { now: self.now }));
        actions
    }

    fn receive(&mut self, frame: Value) -> Actions {
        self.session.handle(SessionEvent::TextReceived { text: frame.to_string(), now: self.now })
    }

    fn call(&mut self, call: Call, waiter: u32) -> Actions {
        self.session.handle(SessionEvent::Call { call, waiter, now: self.now })
    }

    fn authenticate(&mut self, waiter: u32) -> Actions {
        let mut actions = self.session.handle(SessionEvent::Authenticate { waiter, now: self.now });
        let challenge = find_sent(&actions, "challenge");
        actions.extend(self.server_handshake(&challenge, &server_keys()));
        actions
    }

    /// Plays the server's half of the handshake, signing with `server`.
    fn server_handshake(&mut self, challenge: &Frame, server: &Ed25519Keyring) -> Actions {
        let mut actions = self.respond_to_challenge(challenge, server);

        actions.extend(self.receive(json!({
            "type": "challenge",
            "transmissionID": "server-challenge",
            "challenge": "server-nonce",
            "pubkey": server.public_key_hex(),
        })));
        let answer = find_sent(&actions, "response");
        assert_eq!(answer.transmission_id(), Some("server-challenge"));
        actions.extend(self.reply_success(&answer, json!(null)));
        actions
    }

    fn respond_to_challenge(&mut self, challenge: &Frame, server: &Ed25519Keyring) -> Actions {
        let nonce = challenge.str_field("challenge").unwrap();
        self.receive(json!({
            "type": "response",
            "transmissionID": challenge.transmission_id().unwrap(),
            "response": server.sign_hex(nonce),
            "pubkey": server.public_key_hex(),
        }))
    }

    fn reply_success(&mut self, request: &Frame, data: Value) -> Actions {
        self.receive(json!({
            "type": "success",
            "transmissionID": request.transmission_id().unwrap(),
            "data": data,
        }))
    }

    /// Connects, authenticates and discards the resulting actions.
    fn ready(&mut self) {
        self.connect();
        let actions = self.authenticate(0);
        assert_eq!(self.state(), SessionState::Authenticated, "{actions:?}");
    }

    fn join(&mut self, channel_id: &str, waiter: u32) -> Actions {
        let mut actions = self.call(Call::Join { channel_id: channel_id.into() }, waiter);
        let join = find_sent(&actions, "channel");
        actions.extend(self.reply_success(&join, json!({ "channelID": channel_id })));
        actions
    }
}

fn sent<'a>(actions: &'a Actions, kind: &'a str) -> impl Iterator<Item = &'a Frame> + 'a {
    actions.iter().filter_map(move |action| match action {
        SessionAction::Send(frame) if frame.kind() == kind => Some(frame),
        _ => None,
    })
}

fn find_sent(actions: &Actions, kind: &str) -> Frame {
    sent(actions, kind).next().cloned().unwrap_or_else(|| panic!("no {kind} sent in {actions:?}"))
}

fn outcome(actions: &Actions, waiter: u32) -> Option<&Result<Reply, CallError>> {
    actions.iter().find_map(|action| match action {
        SessionAction::Complete { waiter: w, outcome } if *w == waiter => Some(outcome),
        _ => None,
    })
}

fn notifications(actions: &Actions) -> Vec<&Notification> {
    actions
        .iter()
        .filter_map(|action| match action {
            SessionAction::Notify(notification) => Some(notification),
            _ => None,
        })
        .collect()
}

fn ready_count(actions: &Actions) -> usize {
    notifications(actions).iter().filter(|n| matches!(n, Notification::Ready)).count()
}

#[test]
fn ready_fires_exactly_once() {
    let mut h = Harness::new();

    let actions = h.connect();
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Connect)));
    assert_eq!(ready_count(&actions), 1);
    assert_eq!(h.state(), SessionState::Open);

    let actions = h.reconnect();
    assert_eq!(ready_count(&actions), 0);
}

#[test]
fn first_connect_waits_for_caller_to_authenticate() {
    let mut h = Harness::new();

    let actions = h.connect();

    assert_eq!(sent(&actions, "challenge").count(), 0);
    assert_eq!(h.state(), SessionState::Open);
}

#[test]
fn reconnect_authenticates_automatically() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.reconnect();

    assert_eq!(sent(&actions, "challenge").count(), 1);
    assert_eq!(h.state(), SessionState::Authenticating);
}

#[test]
fn reconnect_waits_out_delay() {
    let mut h = Harness::new();
    h.connect();
    h.drop_transport();
    assert_eq!(h.state(), SessionState::Reconnecting);

    let early = h.advance(Duration::from_millis(4900));
    assert!(!early.iter().any(|a| matches!(a, SessionAction::Connect)));

    let due = h.advance(Duration::from_millis(100));
    assert!(due.iter().any(|a| matches!(a, SessionAction::Connect)));
    assert_eq!(h.state(), SessionState::Connecting);
}

#[test]
fn authenticate_resolves_with_server_key() {
    let mut h = Harness::new();
    h.connect();

    let actions = h.authenticate(7);

    assert_eq!(
        outcome(&actions, 7),
        Some(&Ok(Reply::Authenticated { server_key: server_keys().public_key_hex() }))
    );
    assert!(h.session.info().authed);
}

#[test]
fn authenticate_when_already_authenticated_is_immediate() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.session.handle(SessionEvent::Authenticate { waiter: 9, now: h.now });

    assert!(matches!(outcome(&actions, 9), Some(Ok(Reply::Authenticated { .. }))));
    assert_eq!(sent(&actions, "challenge").count(), 0);
}

#[test]
fn concurrent_authenticate_calls_share_one_handshake() {
    let mut h = Harness::new();
    h.connect();

    let first = h.session.handle(SessionEvent::Authenticate { waiter: 1, now: h.now });
    let second = h.session.handle(SessionEvent::Authenticate { waiter: 2, now: h.now });
    assert_eq!(sent(&second, "challenge").count(), 0);

    let challenge = find_sent(&first, "challenge");
    let actions = h.server_handshake(&challenge, &server_keys());

    assert!(matches!(outcome(&actions, 1), Some(Ok(Reply::Authenticated { .. }))));
    assert!(matches!(outcome(&actions, 2), Some(Ok(Reply::Authenticated { .. }))));
}

#[test]
fn authenticate_while_disconnected_fails() {
    let mut h = Harness::new();

    let actions = h.session.handle(SessionEvent::Authenticate { waiter: 1, now: h.now });

    assert_eq!(
        outcome(&actions, 1),
        Some(&Err(CallError::NotConnected { state: SessionState::Disconnected }))
    );
}

#[test]
fn first_verified_key_is_pinned_and_reused() {
    let mut h = Harness::new();
    h.ready();
    assert_eq!(h.session.info().server_key, Some(server_keys().public_key_hex()));

    // An impostor after reconnect presents its own key; the pin holds.
    let actions = h.reconnect();
    let challenge = find_sent(&actions, "challenge");
    let actions = h.respond_to_challenge(&challenge, &impostor_keys());

    assert!(notifications(&actions).iter().any(|n| matches!(
        n,
        Notification::Fault(SessionFault::Authentication(CallError::Auth(
            AuthError::SignatureMismatch
        )))
    )));
    assert_eq!(h.session.info().server_key, Some(server_keys().public_key_hex()));
}

#[test]
fn configured_key_rejects_other_signers() {
    let config =
        SessionConfig { server_key: Some(server_keys().public_key_hex()), ..Default::default() };
    let mut h = Harness::with_config(config);
    h.connect();

    let actions = h.session.handle(SessionEvent::Authenticate { waiter: 3, now: h.now });
    let challenge = find_sent(&actions, "challenge");
    let actions = h.respond_to_challenge(&challenge, &impostor_keys());

    assert_eq!(outcome(&actions, 3), Some(&Err(CallError::Auth(AuthError::SignatureMismatch))));
    assert_eq!(h.state(), SessionState::Open);
    assert_eq!(h.session.info().server_key, Some(server_keys().public_key_hex()));
}

#[test]
fn failed_handshake_can_be_retried() {
    let mut h = Harness::new();
    h.connect();

    let actions = h.session.handle(SessionEvent::Authenticate { waiter: 1, now: h.now });
    let challenge = find_sent(&actions, "challenge");
    let nonce = challenge.str_field("challenge").unwrap();
    // Claims the real server's key but cannot sign with it.
    let actions = h.receive(json!({
        "type": "response",
        "transmissionID": challenge.transmission_id().unwrap(),
        "response": impostor_keys().sign_hex(nonce),
        "pubkey": server_keys().public_key_hex(),
    }));
    assert_eq!(outcome(&actions, 1), Some(&Err(CallError::Auth(AuthError::SignatureMismatch))));
    assert_eq!(h.session.info().server_key, None);

    let actions = h.authenticate(2);
    assert!(matches!(outcome(&actions, 2), Some(Ok(Reply::Authenticated { .. }))));
}

#[test]
fn unanswered_challenge_times_out() {
    let mut h = Harness::new();
    h.connect();
    h.session.handle(SessionEvent::Authenticate { waiter: 4, now: h.now });

    let before = h.advance(Duration::from_millis(9900));
    assert_eq!(outcome(&before, 4), None);

    let actions = h.advance(Duration::from_millis(100));
    assert_eq!(
        outcome(&actions, 4),
        Some(&Err(CallError::Timeout { elapsed: Duration::from_secs(10) }))
    );
    assert_eq!(h.state(), SessionState::Open);
}

#[test]
fn server_rejection_of_our_proof_fails_auth() {
    let mut h = Harness::new();
    h.connect();
    h.session.handle(SessionEvent::Authenticate { waiter: 5, now: h.now });

    let actions = h.receive(json!({
        "type": "challenge",
        "transmissionID": "server-challenge",
        "challenge": "server-nonce",
        "pubkey": server_keys().public_key_hex(),
    }));
    let answer = find_sent(&actions, "response");
    let signature = hex::decode(answer.str_field("response").unwrap()).unwrap();
    assert!(server_keys().verify(b"server-nonce", &signature, &client_keys().public_key()));

    let actions = h.receive(json!({
        "type": "error",
        "transmissionID": "server-challenge",
        "Code": "E_AUTH",
        "Message": "unknown key",
    }));

    assert_eq!(
        outcome(&actions, 5),
        Some(&Err(CallError::Auth(AuthError::Rejected {
            code: "E_AUTH".into(),
            message: "unknown key".into()
        })))
    );
}

#[test]
fn reply_claims_once_and_duplicate_goes_to_broadcast() {
    let mut h = Harness::new();
    h.ready();

    let request =
        Request::Chat(ChatRequest::Create { channel_id: "c".into(), message: "hi".into() });
    let actions = h.call(Call::Rpc(request), 11);
    let sent_frame = find_sent(&actions, "chat");
    let id = sent_frame.transmission_id().unwrap().to_owned();

    let actions = h.reply_success(&sent_frame, json!(null));
    assert!(matches!(outcome(&actions, 11), Some(Ok(Reply::Frame(_)))));

    let actions = h.receive(json!({
        "type": "chat",
        "transmissionID": id,
        "channelID": "c",
        "message": "hi",
    }));
    assert!(outcome(&actions, 11).is_none());
    assert!(matches!(notifications(&actions)[..], [Notification::Chat(_)]));
}

#[test]
fn error_reply_fails_caller_with_code() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.call(Call::Rpc(Request::Chat(ChatRequest::Create {
        channel_id: "c".into(),
        message: "hi".into(),
    })), 12);
    let request = find_sent(&actions, "chat");

    let actions = h.receive(json!({
        "type": "error",
        "transmissionID": request.transmission_id().unwrap(),
        "Code": "E_PERM",
        "Message": "not a member",
    }));

    let Some(Err(err)) = outcome(&actions, 12) else { panic!("expected failure: {actions:?}") };
    assert_eq!(err.code(), Some("E_PERM"));
}

#[test]
fn history_defaults_to_full_range() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.call(Call::Rpc(Request::History(HistoryRequest::since("c", None))), 13);

    let request = find_sent(&actions, "historyReq_v2");
    assert_eq!(request.method(), Some("RETRIEVE"));
    assert_eq!(request.str_field("topMessage"), Some(ZERO_MESSAGE_ID));
}

#[test]
fn join_is_idempotent() {
    let mut h = Harness::new();
    h.ready();
    h.join("chan-1", 1);

    let actions = h.call(Call::Join { channel_id: "chan-1".into() }, 2);

    assert_eq!(outcome(&actions, 2), Some(&Ok(Reply::AlreadyJoined)));
    assert_eq!(sent(&actions, "channel").count(), 0);
}

#[test]
fn failed_join_is_not_recorded() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.call(Call::Join { channel_id: "secret".into() }, 1);
    let join = find_sent(&actions, "channel");
    h.receive(json!({
        "type": "error",
        "transmissionID": join.transmission_id().unwrap(),
        "Code": "E_PERM",
        "Message": "private",
    }));

    assert!(h.session.ledger().is_empty());
}

#[test]
fn leave_forgets_channel() {
    let mut h = Harness::new();
    h.ready();
    h.join("chan-1", 1);

    let actions = h.call(Call::Leave { channel_id: "chan-1".into() }, 2);
    let leave = find_sent(&actions, "channel");
    assert_eq!(leave.method(), Some("LEAVE"));
    h.reply_success(&leave, json!(null));

    assert!(h.session.ledger().is_empty());
}

#[test]
fn transport_loss_fails_outstanding_calls_and_keeps_ledger() {
    let mut h = Harness::new();
    h.ready();
    h.join("chan-1", 1);
    h.call(Call::Rpc(Request::Chat(ChatRequest::Create {
        channel_id: "chan-1".into(),
        message: "in flight".into(),
    })), 2);
    assert_eq!(h.session.outstanding(), 1);

    let actions = h.drop_transport();

    assert_eq!(outcome(&actions, 2), Some(&Err(CallError::ConnectionLost)));
    assert_eq!(h.session.outstanding(), 0);
    assert_eq!(h.session.ledger().joined(), ["chan-1"]);
    assert_eq!(h.state(), SessionState::Reconnecting);
}

#[test]
fn call_while_reconnecting_fails_not_connected() {
    let mut h = Harness::new();
    h.ready();
    h.drop_transport();

    let actions = h.call(Call::Rpc(Request::Ping), 3);

    assert_eq!(
        outcome(&actions, 3),
        Some(&Err(CallError::NotConnected { state: SessionState::Reconnecting }))
    );
}

#[test]
fn replay_rejoins_sequentially_after_reauth() {
    let mut h = Harness::new();
    h.ready();
    h.join("chan-1", 1);
    h.join("chan-2", 2);

    let actions = h.reconnect();
    assert_eq!(sent(&actions, "channel").count(), 0, "no joins before re-auth");

    let challenge = find_sent(&actions, "challenge");
    let actions = h.server_handshake(&challenge, &server_keys());
    let joins: Vec<Frame> = sent(&actions, "channel").cloned().collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].str_field("channelID"), Some("chan-1"));

    let actions = h.reply_success(&joins[0], json!(null));
    let joins: Vec<Frame> = sent(&actions, "channel").cloned().collect();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].str_field("channelID"), Some("chan-2"));

    let actions = h.reply_success(&joins[0], json!(null));
    assert_eq!(sent(&actions, "channel").count(), 0);
    assert_eq!(h.session.ledger().joined(), ["chan-1", "chan-2"]);
    assert!(!h.session.ledger().is_replaying());
}

#[test]
fn failed_rejoin_is_reported_and_replay_continues() {
    let mut h = Harness::new();
    h.ready();
    h.join("gone", 1);
    h.join("kept", 2);

    let actions = h.reconnect();
    let challenge = find_sent(&actions, "challenge");
    let actions = h.server_handshake(&challenge, &server_keys());
    let join = find_sent(&actions, "channel");

    let actions = h.receive(json!({
        "type": "error",
        "transmissionID": join.transmission_id().unwrap(),
        "Code": "E_NOCHAN",
        "Message": "deleted",
    }));

    assert!(notifications(&actions).iter().any(|n| matches!(
        n,
        Notification::Fault(SessionFault::ReplayFailed { channel_id, .. }) if channel_id == "gone"
    )));
    assert_eq!(find_sent(&actions, "channel").str_field("channelID"), Some("kept"));
}

#[test]
fn drop_during_replay_restores_ledger() {
    let mut h = Harness::new();
    h.ready();
    h.join("a", 1);
    h.join("b", 2);

    let actions = h.reconnect();
    let challenge = find_sent(&actions, "challenge");
    h.server_handshake(&challenge, &server_keys());
    assert!(h.session.ledger().is_replaying());

    h.drop_transport();

    assert!(!h.session.ledger().is_replaying());
    assert_eq!(h.session.ledger().joined(), ["a", "b"]);
}

#[test]
fn automatic_reauth_failure_is_a_fault() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.reconnect();
    let challenge = find_sent(&actions, "challenge");
    let actions = h.receive(json!({
        "type": "error",
        "transmissionID": challenge.transmission_id().unwrap(),
        "Code": "E_BUSY",
        "Message": "try later",
    }));

    assert!(notifications(&actions).iter().any(|n| matches!(
        n,
        Notification::Fault(SessionFault::Authentication(CallError::Auth(
            AuthError::Rejected { .. }
        )))
    )));
    assert_eq!(h.state(), SessionState::Open);
}

#[test]
fn heartbeat_degrades_without_closing() {
    let mut h = Harness::new();
    h.ready();

    let mut degraded = Vec::new();
    for _ in 0..4 {
        let actions = h.advance(Duration::from_secs(10));
        assert_eq!(sent(&actions, "ping").count(), 1);
        assert!(!actions.iter().any(|a| matches!(a, SessionAction::Close { .. })));
        degraded.extend(notifications(&actions).into_iter().filter_map(|n| match n {
            Notification::LivenessDegraded { missed } => Some(*missed),
            _ => None,
        }));
    }

    assert_eq!(degraded, vec![3]);
    assert_eq!(h.state(), SessionState::Authenticated);
}

#[test]
fn pong_keeps_liveness_confirmed() {
    let mut h = Harness::new();
    h.ready();

    for _ in 0..5 {
        let actions = h.advance(Duration::from_secs(10));
        let ping = find_sent(&actions, "ping");
        let actions =
            h.receive(json!({ "type": "pong", "transmissionID": ping.transmission_id() }));
        assert!(notifications(&actions).is_empty());
    }

    let actions = h.advance(Duration::from_secs(10));
    assert!(
        !notifications(&actions)
            .iter()
            .any(|n| matches!(n, Notification::LivenessDegraded { .. }))
    );
}

#[test]
fn heartbeat_stops_when_connection_drops() {
    let mut h = Harness::new();
    h.ready();
    h.drop_transport();

    let actions = h.advance(Duration::from_secs(4));
    assert_eq!(sent(&actions, "ping").count(), 0);
}

#[test]
fn malformed_frames_are_faults_not_disconnects() {
    let mut h = Harness::new();
    h.ready();

    for garbage in ["{not json", "[]", r#"{"kind":"chat"}"#, r#"{"type":"chat","channelID":7}"#] {
        let text = garbage.into();
        let actions = h.session.handle(SessionEvent::TextReceived { text, now: h.now });
        assert!(
            matches!(
                notifications(&actions)[..],
                [Notification::Fault(SessionFault::MalformedFrame(_))]
            ),
            "{garbage}: {actions:?}"
        );
    }

    assert_eq!(h.state(), SessionState::Authenticated);
}

#[test]
fn pushes_update_caches() {
    let mut h = Harness::new();
    h.ready();

    h.receive(json!({ "type": "channelList", "data": [{ "channelID": "a", "name": "A" }] }));
    h.receive(json!({ "type": "onlineList", "channelID": "a", "data": [{ "userID": "u-2" }] }));
    h.receive(json!({ "type": "clientInfo", "client": { "userID": "u-1", "username": "me" } }));
    h.receive(json!({ "type": "history", "messageID": "m-1", "channelID": "a", "message": "old" }));

    let actions = h.call(Call::RetrieveChannels, 1);
    assert!(matches!(outcome(&actions, 1), Some(Ok(Reply::Channels(list))) if list.len() == 1));
    assert_eq!(sent(&actions, "channel").count(), 0);

    let actions = h.call(Call::ActiveUsers { channel_id: "a".into() }, 2);
    assert!(matches!(
        outcome(&actions, 2),
        Some(Ok(Reply::OnlineUsers(users))) if users[0].user_id == "u-2"
    ));

    let actions = h.call(Call::ActiveUsers { channel_id: "b".into() }, 3);
    assert_eq!(find_sent(&actions, "channel").method(), Some("ACTIVE"));

    assert_eq!(h.session.info().client.map(|u| u.username), Some("me".to_owned()));
    assert_eq!(h.session.cache().history().len(), 1);
}

#[test]
fn unsolicited_replies_are_dropped_quietly() {
    let mut h = Harness::new();
    h.ready();

    for frame in [
        json!({ "type": "success", "transmissionID": "never-sent" }),
        json!({ "type": "pong" }),
        json!({ "type": "brandNewPush", "data": 1 }),
    ] {
        assert!(h.receive(frame).is_empty());
    }
}

#[test]
fn register_signs_user_id_and_records_account() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.call(Call::RegisterIdentity { user_id: "u-1".into() }, 1);
    let register = find_sent(&actions, "identity");
    assert_eq!(register.method(), Some("REGISTER"));
    assert_eq!(register.str_field("uuid"), Some("u-1"));

    let signature = hex::decode(register.str_field("signed").unwrap()).unwrap();
    assert!(client_keys().verify(b"u-1", &signature, &client_keys().public_key()));

    h.reply_success(&register, json!({ "userID": "u-1", "username": "alice" }));
    assert_eq!(h.session.info().client.map(|u| u.user_id), Some("u-1".to_owned()));
}

#[test]
fn logout_disconnects_without_reconnecting() {
    let mut h = Harness::new();
    h.ready();
    h.call(Call::Rpc(Request::Ping), 1);

    let actions = h.session.handle(SessionEvent::Logout);
    assert!(actions.iter().any(|a| matches!(a, SessionAction::Close { .. })));
    assert_eq!(outcome(&actions, 1), Some(&Err(CallError::ConnectionLost)));
    assert_eq!(h.state(), SessionState::Disconnected);

    // The transport's own close report after logout changes nothing.
    let actions = h.drop_transport();
    assert!(actions.is_empty());

    let actions = h.advance(Duration::from_secs(60));
    assert!(!actions.iter().any(|a| matches!(a, SessionAction::Connect)));
}

#[test]
fn state_changes_are_published() {
    let mut h = Harness::new();

    let actions = h.connect();
    let states: Vec<SessionState> = notifications(&actions)
        .into_iter()
        .filter_map(|n| match n {
            Notification::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect();

    assert_eq!(states, vec![SessionState::Connecting, SessionState::Open]);
}

#[test]
fn rejected_rechallenge_leaves_authenticated() {
    let mut h = Harness::new();
    h.ready();

    let actions = h.receive(json!({
        "type": "challenge",
        "transmissionID": "server-rechallenge",
        "challenge": "second-nonce",
        "pubkey": server_keys().public_key_hex(),
    }));
    find_sent(&actions, "response");
    let actions = h.receive(json!({
        "type": "error",
        "transmissionID": "server-rechallenge",
        "Code": "E_AUTH",
        "Message": "revoked",
    }));

    assert_eq!(h.state(), SessionState::Open);
    assert!(!h.session.info().authed);
    let published = notifications(&actions);
    assert!(published.contains(&&Notification::StateChanged(SessionState::Open)));
    assert!(
        published
            .iter()
            .any(|n| matches!(n, Notification::Fault(SessionFault::Authentication(_))))
    );

    // Heartbeat stopped with the state change.
    let actions = h.advance(Duration::from_secs(30));
    assert_eq!(sent(&actions, "ping").count(), 0);

    // auth() starts a fresh handshake instead of succeeding on stale flags.
    let actions = h.session.handle(SessionEvent::Authenticate { waiter: 9, now: h.now });
    assert!(outcome(&actions, 9).is_none());
    assert_eq!(sent(&actions, "challenge").count(), 1);
    assert_eq!(h.state(), SessionState::Authenticating);
}
