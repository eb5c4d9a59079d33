//! Subscription ledger.
//!
//! The client's memory of which channels it has joined. The server forgets
//! subscriptions when the socket drops, so after every reconnect the ledger is
//! replayed as a sequence of joins.
//!
//! # Invariants
//!
//! - A channel id appears at most once across `joined`, `replay` and
//!   `in_flight`.
//! - Replay preserves ledger order: channels are rejoined in the order they
//!   were first joined.
//! - Interrupting a replay (transport drop mid-replay) loses nothing:
//!   [`abort_replay`](SubscriptionLedger::abort_replay) folds pending entries
//!   back into `joined` in their original order.

use std::collections::VecDeque;

/// Ordered set of joined channel ids plus replay progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionLedger {
    joined: Vec<String>,
    /// Leading entries of `joined` rejoined by the current replay.
    resumed: usize,
    replay: VecDeque<String>,
    in_flight: Option<String>,
}

impl SubscriptionLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful join. Returns false if already tracked.
    pub fn insert(&mut self, channel_id: &str) -> bool {
        if self.contains(channel_id) {
            return false;
        }
        self.joined.push(channel_id.to_owned());
        true
    }

    /// Records a successful leave. Returns false if the channel was unknown.
    ///
    /// A channel still waiting to be replayed is dropped from the queue; a
    /// channel whose rejoin is in flight is not re-added when the rejoin
    /// completes.
    pub fn remove(&mut self, channel_id: &str) -> bool {
        let before = self.len();
        if let Some(pos) = self.joined.iter().position(|c| c == channel_id) {
            self.joined.remove(pos);
            if pos < self.resumed {
                self.resumed -= 1;
            }
        }
        self.replay.retain(|c| c != channel_id);
        if self.in_flight.as_deref() == Some(channel_id) {
            self.in_flight = None;
        }
        self.len() != before
    }

    /// Whether the channel is joined or being rejoined.
    pub fn contains(&self, channel_id: &str) -> bool {
        self.joined.iter().any(|c| c == channel_id)
            || self.replay.iter().any(|c| c == channel_id)
            || self.in_flight.as_deref() == Some(channel_id)
    }

    /// Channels currently confirmed joined, in join order.
    pub fn joined(&self) -> &[String] {
        &self.joined
    }

    /// Every tracked channel, confirmed or pending, in ledger order.
    pub fn channels(&self) -> Vec<String> {
        let (resumed, rest) = self.joined.split_at(self.resumed);
        resumed.iter().chain(&self.in_flight).chain(&self.replay).chain(rest).cloned().collect()
    }

    /// Number of tracked channels.
    pub fn len(&self) -> usize {
        self.joined.len() + self.replay.len() + usize::from(self.in_flight.is_some())
    }

    /// True when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while a replay is running.
    pub fn is_replaying(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Moves every joined channel into the replay queue and returns the first
    /// one to rejoin. `None` if there is nothing to replay.
    pub fn begin_replay(&mut self) -> Option<String> {
        self.abort_replay();
        self.replay.extend(self.joined.drain(..));
        self.advance()
    }

    /// Settles the in-flight rejoin and returns the next channel to rejoin.
    ///
    /// A failed rejoin (`joined == false`) drops the channel from the ledger.
    pub fn complete_replay(&mut self, channel_id: &str, joined: bool) -> Option<String> {
        if self.in_flight.as_deref() == Some(channel_id)
            && let Some(settled) = self.in_flight.take()
            && joined
        {
            self.joined.insert(self.resumed, settled);
            self.resumed += 1;
        }
        self.advance()
    }

    /// Stops a replay, folding pending channels back in ledger order.
    pub fn abort_replay(&mut self) {
        let tail = self.joined.split_off(self.resumed);
        self.joined.extend(self.in_flight.take());
        self.joined.extend(self.replay.drain(..));
        self.joined.extend(tail);
        self.resumed = 0;
    }

    fn advance(&mut self) -> Option<String> {
        if self.in_flight.is_some() {
            return None;
        }
        self.in_flight = self.replay.pop_front();
        if self.in_flight.is_none() {
            self.resumed = 0;
        }
        self.in_flight.clone()
    }
}
