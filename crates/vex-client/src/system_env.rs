//! Production environment using the tokio clock and OS randomness.

use vex_core::Environment;

/// Production environment.
///
/// Uses `tokio::time::Instant` so the engine and the runtime's timers read the
/// same clock, and getrandom for cryptographic randomness.
///
/// # Security
///
/// The RNG uses getrandom which provides OS-level cryptographic randomness.
/// Suitable for challenge nonces, transmission ids and key generation.
///
/// # Panics
///
/// Panics if the OS RNG fails. A client without functioning randomness would
/// send predictable challenge nonces, which defeats the handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - nonces would be predictable");
    }
}
