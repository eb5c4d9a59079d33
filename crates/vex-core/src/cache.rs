//! Last-seen values of server pushes.
//!
//! Pushes replace their slot wholesale. Nothing here is cleared on reconnect:
//! stale data is better than none, and the server re-pushes on rejoin.
//! History pushes are the exception to wholesale replacement: they accumulate,
//! bounded by [`HISTORY_CAPACITY`].

use std::collections::{HashMap, VecDeque};

use vex_proto::{Channel, ChatMessage, User};

/// History pushes kept; older ones are evicted first.
pub const HISTORY_CAPACITY: usize = 1024;

/// Cached broadcast state.
#[derive(Debug, Clone, Default)]
pub struct BroadcastCache {
    channels: Option<Vec<Channel>>,
    online: HashMap<String, Vec<User>>,
    client: Option<User>,
    history: VecDeque<ChatMessage>,
}

impl BroadcastCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last channel list, if one was pushed and it was non-empty.
    pub fn channels(&self) -> Option<&[Channel]> {
        self.channels.as_deref().filter(|list| !list.is_empty())
    }

    /// Replace the channel list.
    pub fn set_channels(&mut self, channels: Vec<Channel>) {
        self.channels = Some(channels);
    }

    /// Last online list for `channel_id`.
    pub fn online(&self, channel_id: &str) -> Option<&[User]> {
        self.online.get(channel_id).map(Vec::as_slice)
    }

    /// Replace one channel's online list.
    pub fn set_online(&mut self, channel_id: String, users: Vec<User>) {
        self.online.insert(channel_id, users);
    }

    /// Our own account record.
    pub fn client(&self) -> Option<&User> {
        self.client.as_ref()
    }

    /// Replace our own account record.
    pub fn set_client(&mut self, user: User) {
        self.client = Some(user);
    }

    /// Most recent history pushes, oldest first.
    pub fn history(&self) -> &VecDeque<ChatMessage> {
        &self.history
    }

    /// Append one history push, evicting the oldest at capacity.
    pub fn push_history(&mut self, message: ChatMessage) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(message);
    }
}
