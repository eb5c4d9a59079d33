//! Liveness heartbeat.
//!
//! Pure bookkeeping: the session decides when to send pings and what a missed
//! ping means. The monitor never closes the connection; a dead socket is
//! detected by the transport, not here.

use std::{ops::Sub, time::Duration};

/// Interval between pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Consecutive unanswered pings before liveness is reported degraded.
pub const DEFAULT_LIVENESS_THRESHOLD: u32 = 3;

/// Result of a due ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// Consecutive pings that went unanswered before this one
    pub missed: u32,
    /// Whether `missed` has reached the threshold
    pub degraded: bool,
}

/// Heartbeat state for one authenticated connection.
#[derive(Debug, Clone)]
pub struct Heartbeat<I> {
    interval: Duration,
    threshold: u32,
    started_at: Option<I>,
    last_ping: Option<I>,
    confirmed: bool,
    missed: u32,
}

impl<I> Heartbeat<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Stopped monitor.
    pub fn new(interval: Duration, threshold: u32) -> Self {
        Self {
            interval,
            threshold,
            started_at: None,
            last_ping: None,
            confirmed: true,
            missed: 0,
        }
    }

    /// Starts pinging; the first ping is due one interval from `now`.
    ///
    /// Liveness starts confirmed: the handshake that just completed is
    /// evidence the server is alive.
    pub fn start(&mut self, now: I) {
        self.started_at = Some(now);
        self.last_ping = None;
        self.confirmed = true;
        self.missed = 0;
    }

    /// Stops pinging.
    pub fn stop(&mut self) {
        self.started_at = None;
        self.last_ping = None;
    }

    /// Whether the monitor is running.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Marks the server alive (a pong arrived).
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Consecutive unanswered pings.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// Ping interval; also the lifetime of each ping transaction.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns a ping if one is due at `now`.
    ///
    /// Accounting happens here, not when the pong arrives: the miss counter
    /// moves only at ping boundaries.
    pub fn tick(&mut self, now: I) -> Option<Pulse> {
        let since = self.last_ping.or(self.started_at)?;
        if now - since < self.interval {
            return None;
        }

        if self.confirmed {
            self.missed = 0;
        } else {
            self.missed += 1;
        }
        self.confirmed = false;
        self.last_ping = Some(now);

        Some(Pulse { missed: self.missed, degraded: self.missed >= self.threshold })
    }
}
