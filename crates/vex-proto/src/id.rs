//! Correlation tokens.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Message id meaning "from the beginning" in history requests.
pub const ZERO_MESSAGE_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Token attached to a request and echoed by the server on its reply.
///
/// Rendered on the wire as an RFC-4122 version 4 UUID string in the
/// `transmissionID` field. Server-originated ids are accepted verbatim, so the
/// inner value is an arbitrary string rather than a parsed UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransmissionId(String);

impl TransmissionId {
    /// Builds a v4 UUID id from 16 bytes of entropy.
    ///
    /// The version and variant bits are overwritten, so any byte pattern
    /// yields a well-formed UUID.
    pub fn from_random(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
    }

    /// Wraps an id received from the server.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the wire representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TransmissionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransmissionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
