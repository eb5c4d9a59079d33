//! Error types for the session engine.
//!
//! Every failure the engine can observe is routed somewhere: to the waiter of
//! the call it belongs to ([`CallError`]), or, when no caller is waiting, to
//! the fault stream as a [`SessionFault`](crate::SessionFault). Nothing is
//! swallowed silently and nothing panics.

use std::time::Duration;

use thiserror::Error;
use vex_proto::{ApiError, ProtocolError, TransmissionId};

use crate::session::SessionState;

/// Failures of the challenge/response handshake.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Server's signature did not verify under the pinned (or presented) key
    #[error("server signature did not verify")]
    SignatureMismatch,

    /// Key material was not valid hex or not a valid Ed25519 key
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Server answered our proof with an `error` envelope
    #[error("server rejected authentication: {code}: {message}")]
    Rejected {
        /// Server error code
        code: String,
        /// Server error message
        message: String,
    },
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        Self::Rejected { code: err.code, message: err.message }
    }
}

/// Outcome of a failed call, delivered to its waiter.
///
/// `Clone` so one failure (a lost connection, a failed handshake) can be fanned
/// out to every waiter it affects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Server answered with an `error` envelope
    #[error("server error {code}: {message}")]
    Server {
        /// Machine-readable code (e.g. `E_PERM`)
        code: String,
        /// Human-readable message
        message: String,
    },

    /// No reply before the call's deadline
    #[error("request timed out after {elapsed:?}")]
    Timeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Transport dropped before a reply arrived
    #[error("connection lost before a reply arrived")]
    ConnectionLost,

    /// Call issued while no transport is open
    #[error("not connected (session is {state:?})")]
    NotConnected {
        /// State at the time of the call
        state: SessionState,
    },

    /// Handshake failed
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Request could not be encoded or reply could not be understood
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CallError {
    /// Returns true if this error may succeed on retry.
    ///
    /// Transient errors come from the transport or the clock. Server
    /// rejections and protocol violations will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectionLost | Self::NotConnected { .. })
    }

    /// Server error code, if the server produced this failure.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } | Self::Auth(AuthError::Rejected { code, .. }) => Some(code),
            _ => None,
        }
    }
}

impl From<ApiError> for CallError {
    fn from(err: ApiError) -> Self {
        Self::Server { code: err.code, message: err.message }
    }
}

impl From<ProtocolError> for CallError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Correlation table misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// The id already has a live transaction
    #[error("transmission id {0} is already outstanding")]
    DuplicateId(TransmissionId),
}
