//! Wire format for the Vex chat protocol.
//!
//! Every message on the socket is one JSON text frame: an object with a string
//! `type` discriminator and, on requests and correlated replies, a
//! `transmissionID` correlation token. This crate owns three layers:
//!
//! - [`Frame`]: a validated, untyped JSON object. Parsing only checks framing
//!   (object, string `type`); it never interprets the payload.
//! - [`Request`]: every frame the client originates, serialized with serde's
//!   tag attributes so the `type`/`method` pairs come straight from the enum.
//! - [`Inbound`]: every frame the server pushes or replies with, decoded on
//!   demand from a [`Frame`].
//!
//! Records shared by both directions (users, channels, files, permissions,
//! chat messages) live in [`payloads::records`].

pub mod errors;
mod frame;
mod id;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use id::{TransmissionId, ZERO_MESSAGE_ID};
pub use payloads::{
    Inbound,
    records::{Channel, ChatMessage, FileRecord, Permission, User},
    requests::{
        ChannelRequest, ChatRequest, FileRequest, HistoryRequest, IdentityRequest,
        PermissionGrant, PermissionRequest, Request, UserRequest,
    },
    session::{ApiError, Challenge, ChallengeResponse},
};
