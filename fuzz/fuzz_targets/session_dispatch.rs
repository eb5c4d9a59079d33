//! Fuzz target for the session engine's event handling
//!
//! Drives a `Session` with arbitrary transport events, inbound frames, calls
//! and clock ticks. Inbound frames are built from fuzzer choices so that many
//! of them reuse transmission ids the session actually issued.
//!
//! # Invariants
//!
//! - Handling never panics
//! - Every call waiter is completed at most once
//! - No transmission id is claimed twice: completions never exceed calls

#![no_main]

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};
use vex_core::{
    Call, Ed25519Keyring, Environment, Session, SessionAction, SessionConfig, SessionEvent,
};

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Open,
    Close,
    Fail,
    Tick { millis: u16 },
    Raw(String),
    Reply { id: u8, kind: ReplyKind },
    Push { kind: u8, channel: u8 },
    Join(u8),
    Leave(u8),
    Authenticate,
    Logout,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum ReplyKind {
    Success,
    Error,
    Pong,
    Response,
}

#[derive(Clone)]
struct FuzzEnv {
    counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl Environment for FuzzEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = if i < 8 { (n >> (8 * i)) as u8 } else { 0 };
        }
    }
}

fuzz_target!(|steps: Vec<Step>| {
    let env = FuzzEnv { counter: Default::default() };
    let mut session: Session<FuzzEnv, Ed25519Keyring, u32> =
        Session::new(env, Ed25519Keyring::from_secret([7; 32]), SessionConfig::default());

    let mut now = Instant::now();
    let mut issued: Vec<String> = Vec::new();
    let mut completed: HashSet<u32> = HashSet::new();
    let mut next_waiter = 0u32;

    let mut run = |actions: Vec<SessionAction<u32>>, issued: &mut Vec<String>| {
        for action in actions {
            match action {
                SessionAction::Send(frame) => {
                    if let Some(id) = frame.transmission_id() {
                        issued.push(id.to_owned());
                    }
                },
                SessionAction::Complete { waiter, .. } => {
                    assert!(completed.insert(waiter), "waiter {waiter} completed twice");
                },
                _ => {},
            }
        }
    };

    let start = session.start(now);
    run(start, &mut issued);

    for step in steps.into_iter().take(256) {
        let at = now;
        let event = match step {
            Step::Open => SessionEvent::TransportOpened { now: at },
            Step::Close => SessionEvent::TransportClosed { now: at, reason: "fuzz".into() },
            Step::Fail => SessionEvent::TransportFailed { now: at, reason: "fuzz".into() },
            Step::Tick { millis } => {
                now = at + Duration::from_millis(u64::from(millis) * 10);
                SessionEvent::Tick { now }
            },
            Step::Raw(text) => SessionEvent::TextReceived { text, now: at },
            Step::Reply { id, kind } => {
                let id: Value = issued
                    .get(usize::from(id) % issued.len().max(1))
                    .map_or(Value::Null, |id| json!(id));
                let frame = match kind {
                    ReplyKind::Success => {
                        json!({ "type": "success", "transmissionID": id, "data": null })
                    },
                    ReplyKind::Error => {
                        json!({ "type": "error", "transmissionID": id, "Code": "E_FUZZ" })
                    },
                    ReplyKind::Pong => json!({ "type": "pong", "transmissionID": id }),
                    ReplyKind::Response => json!({
                        "type": "response",
                        "transmissionID": id,
                        "response": "00",
                        "pubkey": "00",
                    }),
                };
                SessionEvent::TextReceived { text: frame.to_string(), now: at }
            },
            Step::Push { kind, channel } => {
                let channel = channel.to_string();
                let frame = match kind % 5 {
                    0 => json!({ "type": "chat", "channelID": channel, "message": "m" }),
                    1 => json!({ "type": "channelList", "data": [{ "channelID": channel }] }),
                    2 => json!({ "type": "onlineList", "channelID": channel, "data": [] }),
                    3 => json!({
                        "type": "challenge",
                        "transmissionID": "srv",
                        "challenge": "n",
                        "pubkey": "00",
                    }),
                    _ => json!({ "type": "history", "messageID": channel }),
                };
                SessionEvent::TextReceived { text: frame.to_string(), now: at }
            },
            Step::Join(channel) => {
                next_waiter += 1;
                let call = Call::Join { channel_id: channel.to_string() };
                SessionEvent::Call { call, waiter: next_waiter, now: at }
            },
            Step::Leave(channel) => {
                next_waiter += 1;
                let call = Call::Leave { channel_id: channel.to_string() };
                SessionEvent::Call { call, waiter: next_waiter, now: at }
            },
            Step::Authenticate => {
                next_waiter += 1;
                SessionEvent::Authenticate { waiter: next_waiter, now: at }
            },
            Step::Logout => SessionEvent::Logout,
        };

        let actions = session.handle(event);
        run(actions, &mut issued);
    }
});
