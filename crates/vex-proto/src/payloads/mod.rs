//! Typed frame payloads.
//!
//! Outbound frames are [`Request`](requests::Request)s; inbound frames decode
//! into [`Inbound`]. The two are deliberately separate enums: the client
//! never needs to parse its own requests, and the server sends several kinds
//! (`success`, `pong`, pushes) the client never sends.

pub mod records;
pub mod requests;
pub mod session;

use serde::Deserialize;
use serde_json::Value;

use self::{
    records::{Channel, ChatMessage, User},
    session::{ApiError, Challenge, ChallengeResponse},
};
use crate::{Frame, Result};

/// Every frame the server sends.
///
/// # Invariants
///
/// - Decoding is keyed on the frame's `type` string. Unknown types decode to
///   [`Inbound::Unknown`] instead of failing, so a newer server does not
///   break an older client.
/// - A known type with a malformed body is an error. The dispatcher reports
///   it as a fault and drops the frame.
///
/// Whether a frame is a *reply* is not decided here. Any kind can be a reply
/// if its `transmissionID` matches an outstanding request; the variants below
/// only matter for frames no request claimed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// Positive reply envelope
    #[serde(rename = "success")]
    Success {
        /// Reply body, `null` when the server sent none
        #[serde(default)]
        data: Value,
    },

    /// Negative reply envelope
    #[serde(rename = "error")]
    Error(ApiError),

    /// Heartbeat reply
    #[serde(rename = "pong")]
    Pong,

    /// Server asks us to prove possession of our key
    #[serde(rename = "challenge")]
    Challenge(Challenge),

    /// Server's answer to our challenge
    #[serde(rename = "response")]
    Response(ChallengeResponse),

    /// Live chat broadcast
    #[serde(rename = "chat")]
    Chat(ChatMessage),

    /// Full list of channels visible to us
    #[serde(rename = "channelList")]
    ChannelList {
        /// Channels
        data: Vec<Channel>,
    },

    /// Users online in one channel
    #[serde(rename = "onlineList")]
    OnlineList {
        /// Channel the list describes
        #[serde(rename = "channelID")]
        channel_id: String,
        /// Online users
        data: Vec<User>,
    },

    /// Our own account record, pushed after registration or changes
    #[serde(rename = "clientInfo")]
    ClientInfo {
        /// Account record
        client: User,
    },

    /// One message replayed from history
    #[serde(rename = "history")]
    History(ChatMessage),

    /// Any type this client does not know
    #[serde(other)]
    Unknown,
}

impl Inbound {
    /// Decodes a validated frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        frame.decode()
    }
}
