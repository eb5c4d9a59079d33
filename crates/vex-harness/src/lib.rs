//! Deterministic simulation harness for the Vex client.
//!
//! In-memory implementations of the transport and environment seams, plus a
//! scripted server, so the real [`vex_client::Client`] runtime can be driven
//! end to end on tokio's paused clock.

#![forbid(unsafe_code)]

pub mod scenario;
pub mod sim_env;
pub mod sim_server;
pub mod sim_transport;

pub use scenario::{SIM_HOST, Scenario, advance, drain, settle};
pub use sim_env::SimEnv;
pub use sim_server::SimServer;
pub use sim_transport::{
    MemoryConnector, MemoryListener, MemoryTransport, ServerConnection, memory_link,
};
