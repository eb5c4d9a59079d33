//! Async client for the Vex chat protocol.
//!
//! [`Client`] spawns a runtime task that owns a [`vex_core::Session`] and a
//! WebSocket, and exposes the session as async methods plus typed
//! notification streams. The transport is pluggable through [`Connector`] so
//! the same runtime runs against an in-memory server in tests.

pub mod client;
pub mod config;
pub mod error;
pub mod notify;
mod runtime;
pub mod system_env;
pub mod transport;

pub use client::{Channels, Client, ClientInfo, Files, Messages, Permissions, Users};
pub use config::ClientConfig;
pub use error::{ClientError, TransportError};
pub use notify::{Lifecycle, OnlineList, Subscriptions};
pub use system_env::SystemEnv;
pub use transport::{Connector, Transport, WsConnector, WsTransport};
