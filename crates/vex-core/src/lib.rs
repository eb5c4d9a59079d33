//! Sans-IO session engine for the Vex chat protocol.
//!
//! The engine multiplexes many request/response calls and unsolicited pushes
//! over one WebSocket text stream, authenticates both ends with Ed25519
//! challenge/response, keeps the server alive-checked, and transparently
//! recovers subscriptions after the transport drops.
//!
//! Nothing in this crate performs I/O. A driver (see `vex-client`) feeds
//! [`SessionEvent`]s into a [`Session`] and executes the returned
//! [`SessionAction`]s. Time and randomness come from an [`Environment`], so
//! the same code runs against the system clock in production and a seeded,
//! pausable clock in tests.

pub mod auth;
pub mod cache;
pub mod correlation;
mod dispatch;
pub mod env;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod keyring;
pub mod ledger;
pub mod session;

pub use auth::Authenticator;
pub use cache::BroadcastCache;
pub use correlation::{CorrelationTable, Expired};
pub use env::Environment;
pub use error::{AuthError, CallError, CorrelationError};
pub use event::{
    Call, Notification, Reply, SessionAction, SessionEvent, SessionFault, SessionInfo,
};
pub use heartbeat::{Heartbeat, Pulse};
pub use keyring::{Ed25519Keyring, Keyring};
pub use ledger::SubscriptionLedger;
pub use session::{Session, SessionConfig, SessionState};
