//! Fan-out of session notifications to application subscribers.
//!
//! Each notification kind gets its own broadcast channel so a subscriber only
//! sees what it asked for. Slow subscribers lag and lose old items; they never
//! block the runtime. Readiness is a watch channel so late subscribers still
//! observe a `Ready` that already happened.

use tokio::sync::{broadcast, watch};
use vex_core::{Notification, SessionFault, SessionState};
use vex_proto::{Channel, ChatMessage, User};

/// Connection lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// First connection is open.
    Ready,
    /// Session moved to a new state.
    StateChanged(SessionState),
    /// Heartbeat pings are going unanswered.
    LivenessDegraded {
        /// Consecutive unanswered pings.
        missed: u32,
    },
}

/// Online users of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineList {
    /// Channel the list describes.
    pub channel_id: String,
    /// Users currently online.
    pub users: Vec<User>,
}

/// Publishing side, owned by the runtime.
#[derive(Debug)]
pub(crate) struct Notifier {
    chat: broadcast::Sender<ChatMessage>,
    channel_lists: broadcast::Sender<Vec<Channel>>,
    online_lists: broadcast::Sender<OnlineList>,
    client_info: broadcast::Sender<User>,
    history: broadcast::Sender<ChatMessage>,
    lifecycle: broadcast::Sender<Lifecycle>,
    faults: broadcast::Sender<SessionFault>,
    ready: watch::Sender<bool>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            chat: broadcast::channel(capacity).0,
            channel_lists: broadcast::channel(capacity).0,
            online_lists: broadcast::channel(capacity).0,
            client_info: broadcast::channel(capacity).0,
            history: broadcast::channel(capacity).0,
            lifecycle: broadcast::channel(capacity).0,
            faults: broadcast::channel(capacity).0,
            ready: watch::channel(false).0,
        }
    }

    /// Subscribing side, handed to clients.
    pub(crate) fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            chat: self.chat.clone(),
            channel_lists: self.channel_lists.clone(),
            online_lists: self.online_lists.clone(),
            client_info: self.client_info.clone(),
            history: self.history.clone(),
            lifecycle: self.lifecycle.clone(),
            faults: self.faults.clone(),
            ready: self.ready.subscribe(),
        }
    }

    /// Route a notification to its channel.
    ///
    /// Sending with no subscribers is not an error.
    pub(crate) fn publish(&self, notification: Notification) {
        match notification {
            Notification::Ready => {
                self.ready.send_replace(true);
                let _ = self.lifecycle.send(Lifecycle::Ready);
            },
            Notification::StateChanged(state) => {
                let _ = self.lifecycle.send(Lifecycle::StateChanged(state));
            },
            Notification::LivenessDegraded { missed } => {
                let _ = self.lifecycle.send(Lifecycle::LivenessDegraded { missed });
            },
            Notification::Chat(message) => {
                let _ = self.chat.send(message);
            },
            Notification::ChannelList(channels) => {
                let _ = self.channel_lists.send(channels);
            },
            Notification::OnlineList { channel_id, users } => {
                let _ = self.online_lists.send(OnlineList { channel_id, users });
            },
            Notification::ClientInfo(user) => {
                let _ = self.client_info.send(user);
            },
            Notification::History(message) => {
                let _ = self.history.send(message);
            },
            Notification::Fault(fault) => {
                let _ = self.faults.send(fault);
            },
        }
    }
}

/// Subscription handles for every notification kind.
///
/// Every call returns a fresh receiver that sees items published from that
/// point on.
#[derive(Debug, Clone)]
pub struct Subscriptions {
    chat: broadcast::Sender<ChatMessage>,
    channel_lists: broadcast::Sender<Vec<Channel>>,
    online_lists: broadcast::Sender<OnlineList>,
    client_info: broadcast::Sender<User>,
    history: broadcast::Sender<ChatMessage>,
    lifecycle: broadcast::Sender<Lifecycle>,
    faults: broadcast::Sender<SessionFault>,
    ready: watch::Receiver<bool>,
}

impl Subscriptions {
    /// Live chat messages.
    pub fn chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat.subscribe()
    }

    /// Pushed channel lists.
    pub fn channel_lists(&self) -> broadcast::Receiver<Vec<Channel>> {
        self.channel_lists.subscribe()
    }

    /// Pushed online-user lists.
    pub fn online_lists(&self) -> broadcast::Receiver<OnlineList> {
        self.online_lists.subscribe()
    }

    /// Pushed account records.
    pub fn client_info(&self) -> broadcast::Receiver<User> {
        self.client_info.subscribe()
    }

    /// Pushed history messages.
    pub fn history(&self) -> broadcast::Receiver<ChatMessage> {
        self.history.subscribe()
    }

    /// Lifecycle changes.
    pub fn lifecycle(&self) -> broadcast::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    /// Faults with no caller to report to.
    pub fn faults(&self) -> broadcast::Receiver<SessionFault> {
        self.faults.subscribe()
    }

    /// Readiness flag; flips to `true` once and stays there.
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }
}
