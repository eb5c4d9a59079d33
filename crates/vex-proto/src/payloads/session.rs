//! Authentication and reply-envelope payloads.

use serde::{Deserialize, Serialize};

/// Proof-of-possession request: "sign this nonce".
///
/// Sent by either side. `pubkey` is the presenter's hex-encoded public key,
/// which the responder may use to verify when it has nothing pinned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Random nonce (a UUID string); signed as UTF-8 bytes
    pub challenge: String,
    /// Hex-encoded public key of the challenger
    pub pubkey: String,
}

/// Answer to a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Hex-encoded detached signature over the nonce
    pub response: String,
    /// Hex-encoded public key of the responder
    pub pubkey: String,
}

/// Body of an `error` reply envelope.
///
/// The capitalized field names are what the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code (e.g. `E_PERM`)
    #[serde(rename = "Code", default)]
    pub code: String,
    /// Human-readable explanation
    #[serde(rename = "Message", default)]
    pub message: String,
}
