//! Inbound frame dispatch.
//!
//! Every text frame from the transport enters here. A frame is a reply if and
//! only if its `transmissionID` claims a live transaction, whatever its
//! declared `type`; everything else is a push and is routed by `type`.
//! Malformed input is reported and dropped. It never closes the connection.

use tracing::{debug, info, warn};
use vex_proto::{
    ApiError, Challenge, ChallengeResponse, Frame, Inbound, Request, TransmissionId, User,
};

use crate::{
    env::Environment,
    error::{AuthError, CallError},
    event::{Notification, Reply, SessionAction, SessionFault},
    keyring::Keyring,
    session::{CallKind, Session, Transaction},
};

impl<E, K, W> Session<E, K, W>
where
    E: Environment,
    K: Keyring,
{
    pub(crate) fn handle_text(
        &mut self,
        text: &str,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "dropping malformed frame");
                actions.push(notify_fault(SessionFault::MalformedFrame(err.to_string())));
                return;
            },
        };

        if let Some(id) = frame.transmission_id()
            && let Some(transaction) = self.table.claim(id)
        {
            debug!(id, kind = frame.kind(), "reply claimed");
            self.resolve(transaction, frame, now, actions);
            return;
        }

        self.route(frame, now, actions);
    }

    fn resolve(
        &mut self,
        transaction: Transaction<W>,
        frame: Frame,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        match transaction {
            Transaction::Call { waiter, kind } => {
                let outcome = self.settle_call(kind, frame);
                actions.push(SessionAction::Complete { waiter, outcome });
            },
            Transaction::Challenge { nonce } => {
                self.on_challenge_reply(&nonce, &frame, now, actions);
            },
            Transaction::Answer => self.on_answer_reply(&frame, now, actions),
            Transaction::Ping => self.heartbeat.confirm(),
            Transaction::Rejoin { channel_id } => {
                self.on_rejoin_reply(channel_id, &frame, now, actions);
            },
        }
    }

    /// Turns a reply into the caller's outcome, updating engine state on
    /// success.
    fn settle_call(&mut self, kind: CallKind, frame: Frame) -> Result<Reply, CallError> {
        if frame.is_error() {
            return Err(api_error(&frame).into());
        }

        match kind {
            CallKind::Plain => {},
            CallKind::Register => {
                let user: User = frame.decode_data()?;
                info!(user_id = %user.user_id, "identity registered");
                self.cache.set_client(user);
            },
            CallKind::Join(channel_id) => {
                if self.ledger.insert(&channel_id) {
                    info!(channel = %channel_id, "joined channel");
                }
            },
            CallKind::Leave(channel_id) => {
                if self.ledger.remove(&channel_id) {
                    info!(channel = %channel_id, "left channel");
                }
            },
        }

        Ok(Reply::Frame(frame))
    }

    fn on_challenge_reply(
        &mut self,
        nonce: &str,
        frame: &Frame,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        self.challenge = None;

        if frame.is_error() {
            self.fail_auth(AuthError::from(api_error(frame)).into(), actions);
            return;
        }

        let response: ChallengeResponse = match frame.decode() {
            Ok(response) => response,
            Err(err) => {
                self.fail_auth(err.into(), actions);
                return;
            },
        };

        match self.auth.verify_response(&self.keyring, nonce, &response) {
            Ok(_) => {
                debug!("server proved possession of its key");
                self.maybe_authenticated(now, actions);
            },
            Err(err) => {
                warn!(%err, presented = %response.pubkey, "server failed verification");
                self.fail_auth(err.into(), actions);
            },
        }
    }

    fn on_answer_reply(
        &mut self,
        frame: &Frame,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        if frame.is_error() {
            self.auth.revoke_client_proof();
            self.fail_auth(AuthError::from(api_error(frame)).into(), actions);
            return;
        }

        debug!("server accepted our proof");
        self.auth.accept();
        self.maybe_authenticated(now, actions);
    }

    fn on_rejoin_reply(
        &mut self,
        channel_id: String,
        frame: &Frame,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        let joined = !frame.is_error();
        if joined {
            debug!(channel = %channel_id, "rejoined channel");
        } else {
            let reason = CallError::from(api_error(frame)).to_string();
            warn!(channel = %channel_id, %reason, "rejoin failed");
            actions.push(notify_fault(SessionFault::ReplayFailed {
                channel_id: channel_id.clone(),
                reason,
            }));
        }

        let next = self.ledger.complete_replay(&channel_id, joined);
        if next.is_none() && !self.ledger.is_replaying() {
            info!(channels = self.ledger.len(), "subscription replay complete");
        }
        self.rejoin(next, now, actions);
    }

    /// Routes a frame no transaction claimed.
    fn route(&mut self, frame: Frame, now: E::Instant, actions: &mut Vec<SessionAction<W>>) {
        let inbound = match Inbound::from_frame(&frame) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(kind = frame.kind(), %err, "dropping undecodable frame");
                actions.push(notify_fault(SessionFault::MalformedFrame(err.to_string())));
                return;
            },
        };

        let notification = match inbound {
            Inbound::Chat(message) => Notification::Chat(message),
            Inbound::ChannelList { data } => {
                self.cache.set_channels(data.clone());
                Notification::ChannelList(data)
            },
            Inbound::OnlineList { channel_id, data } => {
                self.cache.set_online(channel_id.clone(), data.clone());
                Notification::OnlineList { channel_id, users: data }
            },
            Inbound::ClientInfo { client } => {
                self.cache.set_client(client.clone());
                Notification::ClientInfo(client)
            },
            Inbound::History(message) => {
                self.cache.push_history(message.clone());
                Notification::History(message)
            },
            Inbound::Challenge(challenge) => {
                self.answer_challenge(&frame, &challenge, now, actions);
                return;
            },
            Inbound::Success { .. }
            | Inbound::Error(_)
            | Inbound::Pong
            | Inbound::Response(_)
            | Inbound::Unknown => {
                debug!(
                    kind = frame.kind(),
                    id = ?frame.transmission_id(),
                    "dropping unsolicited frame"
                );
                return;
            },
        };

        actions.push(SessionAction::Notify(notification));
    }

    /// Signs a server nonce and correlates our answer to the server's id.
    fn answer_challenge(
        &mut self,
        frame: &Frame,
        challenge: &Challenge,
        now: E::Instant,
        actions: &mut Vec<SessionAction<W>>,
    ) {
        if !self.state.is_connected() {
            debug!(state = ?self.state, "ignoring challenge while not connected");
            return;
        }

        let response = self.auth.answer(&self.keyring, challenge);
        let id = match frame.transmission_id() {
            Some(id) => TransmissionId::new(id),
            None => self.env.transmission_id(),
        };

        debug!(%id, "answering server challenge");
        self.issue_as(id, Request::Response(response), Transaction::Answer, now, None, actions);
    }
}

/// Error envelope body; missing fields become empty strings.
fn api_error(frame: &Frame) -> ApiError {
    frame.decode().unwrap_or_default()
}

fn notify_fault<W>(fault: SessionFault) -> SessionAction<W> {
    SessionAction::Notify(Notification::Fault(fault))
}
