//! Protocol error types.

use thiserror::Error;

/// Result alias for wire operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while parsing, validating or encoding frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Text was not valid JSON.
    #[error("malformed JSON: {0}")]
    Malformed(String),

    /// JSON was valid but the top level was not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object has no `type` field, or it is not a string.
    #[error("frame has no string `type` discriminator")]
    MissingType,

    /// Frame or its `data` field did not match the expected shape.
    #[error("invalid {expected} payload: {reason}")]
    InvalidPayload {
        /// Name of the shape the caller asked for
        expected: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Request could not be encoded as a JSON object.
    #[error("failed to encode request: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub(crate) fn invalid<T>(error: &serde_json::Error) -> Self {
        Self::InvalidPayload { expected: short_type_name::<T>(), reason: error.to_string() }
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
