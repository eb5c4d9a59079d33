//! Environment abstraction for deterministic testing.
//!
//! Decouples the session engine from system resources (time, randomness).
//! Production uses the system clock and OS entropy; tests use tokio's
//! pausable clock and a seeded RNG so every run replays identically.

use std::time::Duration;

use vex_proto::TransmissionId;

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// The specific instant type used by this environment.
    ///
    /// Production and simulation both use `tokio::time::Instant` so the
    /// runtime's timers and the engine agree on the clock; unit tests of the
    /// engine may use `std::time::Instant` directly.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    ///
    /// # Invariants
    ///
    /// - Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Given the same RNG seed, this produces the same sequence of bytes
    /// - Uses cryptographically secure RNG
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fresh correlation token (v4 UUID).
    fn transmission_id(&self) -> TransmissionId {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        TransmissionId::from_random(bytes)
    }

    /// Fresh challenge nonce (v4 UUID string).
    fn nonce(&self) -> String {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
    }
}
