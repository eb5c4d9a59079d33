//! Session lifecycle state machine.
//!
//! Owns everything that outlives a single request: connection state, the
//! correlation table, the handshake, the heartbeat, the subscription ledger
//! and the push caches. Uses the action pattern: every method takes the
//! current time and returns actions for the driver to execute. No I/O happens
//! here, which keeps reconnect and replay logic testable with a plain clock.
//!
//! # State Machine
//!
//! ```text
//!                 start               opened
//! Disconnected ───────> Connecting ───────────> Open
//!                         ^     │
//!                    delay│     │failed
//!                         │     v
//!                       Reconnecting <── lost ── Open, Authenticating, Authenticated
//!
//!                auth()            both proofs
//!         Open ───────────> Authenticating ───────────> Authenticated
//!          ^ ^                │                             │
//!          │ └──── failed ────┘                             │
//!          └────────────────────── proof revoked ───────────┘
//!
//! logout: any state ──> Disconnected (no reconnect)
//! ```
//!
//! The first successful open of the session's lifetime emits
//! [`Notification::Ready`] and waits for the application to authenticate.
//! Every later open is a reconnect: the engine re-authenticates on its own
//! and then replays the subscription ledger.

use std::time::Duration;

use tracing::{debug, info, warn};
use vex_proto::{ChannelRequest, Frame, IdentityRequest, Request, TransmissionId};

use crate::{
    auth::Authenticator,
    cache::BroadcastCache,
    correlation::CorrelationTable,
    env::Environment,
    error::CallError,
    event::{Call, Notification, Reply, SessionAction, SessionEvent, SessionFault, SessionInfo},
    heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_LIVENESS_THRESHOLD, Heartbeat},
    keyring::Keyring,
    ledger::SubscriptionLedger,
};

/// Wait between losing the transport and reconnecting.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time the server has to answer our challenge.
pub const DEFAULT_CHALLENGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not connected and not trying to be
    Disconnected,
    /// Transport connect in progress
    Connecting,
    /// Transport open, handshake not started
    Open,
    /// Handshake in progress
    Authenticating,
    /// Both proofs complete
    Authenticated,
    /// Transport lost; waiting out the reconnect delay
    Reconnecting,
}

impl SessionState {
    /// Whether a transport is open in this state.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Open | Self::Authenticating | Self::Authenticated)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server key to trust; `None` pins the first key that verifies
    pub server_key: Option<String>,
    /// Wait before reconnecting after the transport is lost
    pub reconnect_delay: Duration,
    /// Interval between liveness pings
    pub heartbeat_interval: Duration,
    /// Deadline for the server to answer our challenge
    pub challenge_timeout: Duration,
    /// Unanswered pings before liveness is reported degraded
    pub liveness_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_key: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            challenge_timeout: DEFAULT_CHALLENGE_TIMEOUT,
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
        }
    }
}

/// What an outstanding request is for.
#[derive(Debug)]
pub(crate) enum Transaction<W> {
    /// Application call.
    Call { waiter: W, kind: CallKind },
    /// Our challenge to the server.
    Challenge { nonce: String },
    /// Our answer to the server's challenge.
    Answer,
    /// Heartbeat ping.
    Ping,
    /// Join re-issued by ledger replay.
    Rejoin { channel_id: String },
}

/// Post-processing for a successful application call.
#[derive(Debug)]
pub(crate) enum CallKind {
    Plain,
    Register,
    Join(String),
    Leave(String),
}

/// Session state machine.
///
/// Generic over the environment (clock and RNG), the keyring, and the waiter
/// type the driver uses to deliver call results. The engine never inspects a
/// waiter; it only hands it back inside [`SessionAction::Complete`].
pub struct Session<E: Environment, K: Keyring, W> {
    pub(crate) env: E,
    pub(crate) keyring: K,
    pub(crate) config: SessionConfig,
    pub(crate) state: SessionState,
    pub(crate) table: CorrelationTable<E::Instant, Transaction<W>>,
    pub(crate) ledger: SubscriptionLedger,
    pub(crate) auth: Authenticator,
    pub(crate) auth_waiters: Vec<W>,
    pub(crate) challenge: Option<TransmissionId>,
    pub(crate) heartbeat: Heartbeat<E::Instant>,
    pub(crate) cache: BroadcastCache,
    /// Successful transport opens over the session's lifetime.
    opened: u64,
    disconnected_at: Option<E::Instant>,
}

impl<E, K, W> Session<E, K, W>
where
    E: Environment,
    K: Keyring,
{
    /// Create a session in [`SessionState::Disconnected`].
    pub fn new(env: E, keyring: K, config: SessionConfig) -> Self {
        Self {
            auth: Authenticator::new(config.server_key.clone()),
            heartbeat: Heartbeat::new(config.heartbeat_interval, config.liveness_threshold),
            env,
            keyring,
            config,
            state: SessionState::Disconnected,
            table: CorrelationTable::new(),
            ledger: SubscriptionLedger::new(),
            auth_waiters: Vec::new(),
            challenge: None,
            cache: BroadcastCache::new(),
            opened: 0,
            disconnected_at: None,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Subscription ledger
    pub fn ledger(&self) -> &SubscriptionLedger {
        &self.ledger
    }

    /// Push caches
    pub fn cache(&self) -> &BroadcastCache {
        &self.cache
    }

    /// Handshake state, including the pinned server key
    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Keyring
    pub fn keyring(&self) -> &K {
        &self.keyring
    }

    /// Requests awaiting a reply
    pub fn outstanding(&self) -> usize {
        self.table.len()
    }

    /// Snapshot for `info()`.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            state: self.state,
            authed: self.state == SessionState::Authenticated,
            client: self.cache.client().cloned(),
            server_key: self.auth.pinned_key().map(str::to_owned),
            channels: self.ledger.channels(),
            outstanding: self.table.len(),
        }
    }

    /// Begin connecting. No-op unless [`SessionState::Disconnected`].
    pub fn start(&mut self, _now: E::Instant) -> Vec<SessionAction<W>> {
        let mut actions = Vec::new();
        if self.state != SessionState::Disconnected {
            return actions;
        }

        info!("session starting");
        self.disconnected_at = None;
        self.transition(SessionState::Connecting, &mut actions);
        actions.push(SessionAction::Connect);
        actions
    }

    /// Process one event.
    pub fn handle(&mut self, event: SessionEvent<W, E::Instant>) -> Vec<SessionAction<W>> {
        let mut actions = Vec::new();

        match event {
            SessionEvent::TransportOpened { now } => self.on_opened(now, &mut actions),
            SessionEvent::TransportClosed { now, reason } => {
                if self.state != SessionState::Disconnected {
                    info!(%reason, "transport closed");
                }
                self.on_lost(now, &mut actions);
            },
            SessionEvent::TransportFailed { now, reason } => {
                if !matches!(self.state, SessionState::Disconnected | SessionState::Reconnecting) {
                    warn!(%reason, "transport failed");
                    actions.push(SessionAction::Notify(Notification::Fault(
                        SessionFault::Transport(reason),
                    )));
                }
                self.on_lost(now, &mut actions);
            },
            SessionEvent::TextReceived { text, now } => self.handle_text(&text, now, &mut actions),
            SessionEvent::Tick { now } => self.on_tick(now, &mut actions),
            SessionEvent::Call { call, waiter, now } => {
                self.on_call(call, waiter, now, &mut actions);
            },
            SessionEvent::Authenticate { waiter, now } => {
                self.on_authenticate(waiter, now, &mut actions);
            },
            SessionEvent::Logout => self.on_logout(&mut actions),
        }

        actions
    }

    fn on_opened(&mut self, now: E::Instant, actions: &mut Vec<SessionAction<W>>) {
        if self.state != SessionState::Connecting {
            warn!(state = ?self.state, "transport opened in unexpected state");
            return;
        }

        self.opened += 1;
        self.transition(SessionState::Open, actions);

        if self.opened == 1 {
            info!("session ready");
            actions.push(SessionAction::Notify(Notification::Ready));
        } else {
            info!(connection = self.opened, "reconnected, re-authenticating");
            self.begin_auth(now, actions);
        }
    }

    fn on_lost(&mut self, now: E::Instant, actions: &mut Vec<SessionAction<W>>) {
        if matches!(self.state, SessionState::Disconnected | SessionState::Reconnecting) {
            return;
        }

        self.abandon_connection(actions);
        self.disconnected_at = Some(now);
        self.transition(SessionState::Reconnecting, actions);
    }

    fn on_logout(&mut self, actions: &mut Vec<SessionAction<W>>) {
        if self.state == SessionState::Disconnected {
            return;
        }

        info!("logging out");
        self.abandon_connection(actions);
        self.disconnected_at = None;
        actions.push(SessionAction::Close { reason: "logout".to_owned() });
        self.transition(SessionState::Disconnected, actions);
    }

    /// Drops all per-connection state and fails everything outstanding.
    fn abandon_connection(&mut self, actions: &mut Vec<SessionAction<W>>) {
        self.heartbeat.stop();
        self.auth.reset();
        self.challenge = None;
        self.ledger.abort_replay();

        let lost = self.table.drain();
        if !lost.is_empty() {
            debug!(count = lost.len(), "failing outstanding requests");
        }
        for (_, transaction) in lost {
            if let Transaction::Call { waiter, .. } = transaction {
                actions.push(complete(waiter, Err(CallError::ConnectionLost)));
            }
        }
        for waiter in self.auth_waiters.drain(..) {
            actions.push(complete(waiter, Err(CallError::ConnectionLost)));
        }
    }

    fn on_tick(&mut self, now: E::Instant, actions: &mut Vec<SessionAction<W>>) {
        if self.state == SessionState::Reconnecting
            && let Some(since) = self.disconnected_at
            && now - since >= self.config.reconnect_delay
        {
            info!("reconnecting");
            self.disconnected_at = None;
            self.transition(SessionState::Connecting, actions);
            actions.push(SessionAction::Connect);
        }

        for expired in self.table.expire(now) {
            match expired.transaction {
                Transaction::Challenge { .. } => {
                    warn!(elapsed = ?expired.elapsed, "server did not answer challenge");
                    self.challenge = None;
                    self.fail_auth(CallError::Timeout { elapsed: expired.elapsed }, actions);
                },
                Transaction::Call { waiter, .. } => {
                    actions.push(complete(
                        waiter,
                        Err(CallError::Timeout { elapsed: expired.elapsed }),
                    ));
                },
                Transaction::Ping => debug!(id = %expired.id, "ping expired"),
                Transaction::Answer | Transaction::Rejoin { .. } => {
                    debug!(id = %expired.id, "transaction expired");
                },
            }
        }

        if self.state == SessionState::Authenticated
            && let Some(pulse) = self.heartbeat.tick(now)
        {
            if pulse.degraded {
                warn!(missed = pulse.missed, "server liveness degraded");
                actions.push(SessionAction::Notify(Notification::LivenessDegraded {
                    missed: pulse.missed,
                }));
            }
            let lifetime = self.heartbeat.interval();
            self.issue(Request::Ping, Transaction::Ping, now, Some(lifetime), actions);
        }
    }

    fn on_call(
        &mut self,
        call: Call,
        waiter: W,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        let (request, kind) = match call {
            Call::Rpc(request) => (request, CallKind::Plain),
            Call::RegisterIdentity { user_id } => {
                let request = Request::Identity(IdentityRequest::Register {
                    pubkey: self.keyring.public_key_hex(),
                    signed: self.keyring.sign_hex(&user_id),
                    uuid: user_id,
                });
                (request, CallKind::Register)
            },
            Call::Join { channel_id } => {
                if self.ledger.contains(&channel_id) {
                    debug!(channel = %channel_id, "already joined");
                    actions.push(complete(waiter, Ok(Reply::AlreadyJoined)));
                    return;
                }
                let request =
                    Request::Channel(ChannelRequest::Join { channel_id: channel_id.clone() });
                (request, CallKind::Join(channel_id))
            },
            Call::Leave { channel_id } => {
                let request =
                    Request::Channel(ChannelRequest::Leave { channel_id: channel_id.clone() });
                (request, CallKind::Leave(channel_id))
            },
            Call::RetrieveChannels => {
                if let Some(channels) = self.cache.channels() {
                    actions.push(complete(waiter, Ok(Reply::Channels(channels.to_vec()))));
                    return;
                }
                (Request::Channel(ChannelRequest::Retrieve), CallKind::Plain)
            },
            Call::ActiveUsers { channel_id } => {
                if let Some(users) = self.cache.online(&channel_id) {
                    actions.push(complete(waiter, Ok(Reply::OnlineUsers(users.to_vec()))));
                    return;
                }
                (Request::Channel(ChannelRequest::Active { channel_id }), CallKind::Plain)
            },
        };

        if !self.state.is_connected() {
            actions.push(complete(waiter, Err(CallError::NotConnected { state: self.state })));
            return;
        }

        self.issue(request, Transaction::Call { waiter, kind }, now, None, actions);
    }

    fn on_authenticate(
        &mut self,
        waiter: W,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        match self.state {
            SessionState::Authenticated => {
                let server_key = self.auth.pinned_key().unwrap_or_default().to_owned();
                actions.push(complete(waiter, Ok(Reply::Authenticated { server_key })));
            },
            SessionState::Authenticating => self.auth_waiters.push(waiter),
            SessionState::Open => {
                self.auth_waiters.push(waiter);
                self.begin_auth(now, actions);
            },
            state => actions.push(complete(waiter, Err(CallError::NotConnected { state }))),
        }
    }

    /// Sends our challenge unless one is already outstanding.
    pub(crate) fn begin_auth(&mut self, now: E::Instant, actions: &mut Vec<SessionAction<W>>) {
        self.transition(SessionState::Authenticating, actions);
        if self.challenge.is_some() {
            return;
        }

        let nonce = self.env.nonce();
        let challenge = self.auth.challenge(&self.keyring, nonce.clone());
        let timeout = Some(self.config.challenge_timeout);
        let transaction = Transaction::Challenge { nonce };
        self.challenge =
            self.issue(Request::Challenge(challenge), transaction, now, timeout, actions);
    }

    /// Enters `Authenticated` once both proofs are in.
    pub(crate) fn maybe_authenticated(
        &mut self,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        if self.state != SessionState::Authenticating || !self.auth.is_complete() {
            return;
        }

        let server_key = self.auth.pinned_key().unwrap_or_default().to_owned();
        info!(server_key = %server_key, "session authenticated");
        self.transition(SessionState::Authenticated, actions);

        for waiter in self.auth_waiters.drain(..) {
            actions.push(complete(
                waiter,
                Ok(Reply::Authenticated { server_key: server_key.clone() }),
            ));
        }

        self.heartbeat.start(now);

        let first = self.ledger.begin_replay();
        if first.is_some() {
            info!(channels = self.ledger.len(), "replaying subscriptions");
        }
        self.rejoin(first, now, actions);
    }

    /// Fails the current handshake attempt.
    ///
    /// With callers waiting, they receive the error. Without (automatic
    /// re-auth after reconnect, or a server re-challenge), it goes to the
    /// fault stream. Either way the session drops back to `Open`, which also
    /// stops the heartbeat, and the pinned key is untouched.
    pub(crate) fn fail_auth(&mut self, error: CallError, actions: &mut Vec<SessionAction<W>>) {
        if let Some(id) = self.challenge.take() {
            self.table.claim(id.as_str());
        }
        self.auth.reset_server_proof();

        if matches!(self.state, SessionState::Authenticating | SessionState::Authenticated) {
            self.transition(SessionState::Open, actions);
        }

        if self.auth_waiters.is_empty() {
            warn!(%error, "authentication failed");
            actions.push(SessionAction::Notify(Notification::Fault(SessionFault::Authentication(
                error,
            ))));
        } else {
            for waiter in self.auth_waiters.drain(..) {
                actions.push(complete(waiter, Err(error.clone())));
            }
        }
    }

    /// Issues ledger rejoins until one is on the wire or the queue is empty.
    pub(crate) fn rejoin(
        &mut self,
        mut next: Option<String>,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        while let Some(channel_id) = next.take() {
            let request = Request::Channel(ChannelRequest::Join { channel_id: channel_id.clone() });
            let transaction = Transaction::Rejoin { channel_id: channel_id.clone() };
            if self.issue(request, transaction, now, None, actions).is_some() {
                return;
            }

            actions.push(SessionAction::Notify(Notification::Fault(SessionFault::ReplayFailed {
                channel_id: channel_id.clone(),
                reason: "rejoin could not be sent".to_owned(),
            })));
            next = self.ledger.complete_replay(&channel_id, false);
        }
    }

    /// Sends `request` under a fresh transmission id.
    pub(crate) fn issue(
        &mut self,
        request: Request,
        transaction: Transaction<W>,
        now: E::Instant,
        timeout: Option<Duration>,
        actions: &mut Vec<SessionAction<W>>,
    ) -> Option<TransmissionId> {
        let id = self.env.transmission_id();
        self.issue_as(id, request, transaction, now, timeout, actions)
    }

    /// Sends `request` under a given transmission id.
    ///
    /// Returns the id on success. On failure, a call transaction's waiter is
    /// completed with the error; other transactions are dropped.
    pub(crate) fn issue_as(
        &mut self,
        id: TransmissionId,
        request: Request,
        transaction: Transaction<W>,
        now: E::Instant,
        timeout: Option<Duration>,
        actions: &mut Vec<SessionAction<W>>,
    ) -> Option<TransmissionId> {
        if self.table.contains(id.as_str()) {
            warn!(%id, "transmission id already outstanding");
            fail(transaction, CallError::Protocol(format!("transmission id {id} in use")), actions);
            return None;
        }

        let frame = match Frame::request(&id, &request) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "failed to encode request");
                fail(transaction, err.into(), actions);
                return None;
            },
        };

        debug!(%id, kind = frame.kind(), method = ?frame.method(), "sending request");
        if let Err(err) = self.table.register(id.clone(), transaction, now, timeout) {
            warn!(%err, "failed to register request");
            return None;
        }
        actions.push(SessionAction::Send(frame));
        Some(id)
    }

    pub(crate) fn transition(&mut self, next: SessionState, actions: &mut Vec<SessionAction<W>>) {
        if self.state == next {
            return;
        }

        debug!(from = ?self.state, to = ?next, "session state change");
        if self.state == SessionState::Authenticated {
            self.heartbeat.stop();
        }
        self.state = next;
        actions.push(SessionAction::Notify(Notification::StateChanged(next)));
    }
}

fn complete<W>(waiter: W, outcome: Result<Reply, CallError>) -> SessionAction<W> {
    SessionAction::Complete { waiter, outcome }
}

fn fail<W>(transaction: Transaction<W>, error: CallError, actions: &mut Vec<SessionAction<W>>) {
    if let Transaction::Call { waiter, .. } = transaction {
        actions.push(complete(waiter, Err(error)));
    }
}
