//! End-to-end scenario wiring.
//!
//! A [`Scenario`] is one [`Client`] connected to one [`SimServer`] over a
//! memory link, on a seeded environment. Meant for paused-clock tokio tests.

use std::time::Duration;

use tokio::sync::broadcast;
use vex_client::{Client, ClientConfig, ClientError};
use vex_core::{Ed25519Keyring, SessionConfig};

use crate::{SimEnv, SimServer, sim_transport::memory_link};

/// Host name the simulated client dials.
pub const SIM_HOST: &str = "sim.local";

/// Client and server over a memory link.
#[derive(Debug)]
pub struct Scenario {
    /// The client under test.
    pub client: Client,
    /// The scripted server.
    pub server: SimServer,
}

impl Scenario {
    /// Default session timings, client seed `seed`.
    pub fn start(seed: u64) -> Self {
        Self::with_session(seed, SessionConfig::default())
    }

    /// Custom session timings, client seed `seed`.
    pub fn with_session(seed: u64, session: SessionConfig) -> Self {
        let config = ClientConfig::new(SIM_HOST).insecure().with_session(session);
        Self::with_config(seed, config)
    }

    /// Fully custom client configuration, client seed `seed`.
    pub fn with_config(seed: u64, config: ClientConfig) -> Self {
        let (connector, listener) = memory_link();
        let server = SimServer::start(listener);

        let env = SimEnv::with_seed(seed);
        let keyring = Ed25519Keyring::generate(&env);
        let client = Client::with_connector(config, keyring, connector, env);

        Self { client, server }
    }

    /// Wait for the first connection, register, authenticate.
    ///
    /// # Errors
    ///
    /// Whatever the client returns for any of the three steps.
    pub async fn login(&self) -> Result<(), ClientError> {
        self.client.wait_ready().await?;
        self.client.register().await?;
        self.client.auth().await?;
        Ok(())
    }
}

/// Let every task run until idle, then advance virtual time by `duration`.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Let every task run until idle.
pub async fn settle() {
    advance(Duration::from_millis(1)).await;
}

/// Everything currently buffered in a notification receiver.
///
/// Stops at the first gap, so a lagged receiver returns what it had before
/// falling behind.
pub fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        items.push(item);
    }
    items
}
