//! Client-originated requests.
//!
//! Each request type maps to a `type` on the wire and, where the server
//! multiplexes several verbs under one type, a `method`. Both are driven by
//! serde tag attributes so adding a verb is one enum variant.

use serde::Serialize;

use super::session::{Challenge, ChallengeResponse};
use crate::ZERO_MESSAGE_ID;

/// Every frame the client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Account creation and registration
    #[serde(rename = "identity")]
    Identity(IdentityRequest),

    /// Ask the peer to prove possession of its key
    #[serde(rename = "challenge")]
    Challenge(Challenge),

    /// Prove possession of our key
    #[serde(rename = "response")]
    Response(ChallengeResponse),

    /// Channel management
    #[serde(rename = "channel")]
    Channel(ChannelRequest),

    /// Channel permission grants
    #[serde(rename = "channelPerm")]
    Permission(PermissionRequest),

    /// Moderation
    #[serde(rename = "user")]
    User(UserRequest),

    /// File management
    #[serde(rename = "file")]
    File(FileRequest),

    /// Chat
    #[serde(rename = "chat")]
    Chat(ChatRequest),

    /// Message history
    #[serde(rename = "historyReq_v2")]
    History(HistoryRequest),

    /// Liveness ping
    #[serde(rename = "ping")]
    Ping,
}

/// `identity` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum IdentityRequest {
    /// Allocate a new account id
    Create,
    /// Bind a public key to an allocated account id
    Register {
        /// Hex-encoded public key
        pubkey: String,
        /// Hex-encoded signature over the account id
        signed: String,
        /// The account id being claimed
        uuid: String,
    },
}

/// `channel` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum ChannelRequest {
    /// Create a channel
    Create {
        /// Display name
        name: String,
        /// Restrict membership to permission grants
        #[serde(rename = "privateChannel")]
        private_channel: bool,
    },
    /// Subscribe to a channel
    Join {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
    },
    /// Unsubscribe from a channel
    Leave {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
    },
    /// Delete a channel
    Delete {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
    },
    /// List visible channels
    Retrieve,
    /// List users currently online in a channel
    Active {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
    },
}

/// Who a permission grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGrant {
    /// Grantee
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Channel
    #[serde(rename = "channelID")]
    pub channel_id: String,
}

/// `channelPerm` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum PermissionRequest {
    /// Grant access
    Create {
        /// Grant to add
        permission: PermissionGrant,
    },
    /// Revoke access
    Delete {
        /// Grant to remove
        permission: PermissionGrant,
    },
}

/// `user` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum UserRequest {
    /// Change a user's power level
    Update {
        /// Target account
        #[serde(rename = "userID")]
        user_id: String,
        /// New level
        #[serde(rename = "powerLevel")]
        power_level: i64,
    },
    /// Ban a user
    Ban {
        /// Target account
        #[serde(rename = "userID")]
        user_id: String,
    },
    /// Disconnect a user
    Kick {
        /// Target account
        #[serde(rename = "userID")]
        user_id: String,
    },
}

/// `file` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum FileRequest {
    /// Upload a file
    Create {
        /// Channel the file is shared in
        #[serde(rename = "channelID")]
        channel_id: String,
        /// Hex-encoded file contents
        file: String,
        /// Original file name
        #[serde(rename = "fileName")]
        file_name: String,
    },
    /// List files shared in a channel
    Retrieve {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
    },
    /// Delete a file
    Delete {
        /// Target file
        #[serde(rename = "fileID")]
        file_id: String,
    },
}

/// `chat` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum ChatRequest {
    /// Post a message
    Create {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
        /// Message body
        message: String,
    },
}

/// `historyReq_v2` verbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum HistoryRequest {
    /// Fetch messages posted after `top_message`
    Retrieve {
        /// Target channel
        #[serde(rename = "channelID")]
        channel_id: String,
        /// Last message the caller already has
        #[serde(rename = "topMessage")]
        top_message: String,
    },
}

impl HistoryRequest {
    /// History of `channel_id` after `after`, or from the beginning when
    /// `after` is `None`.
    pub fn since(channel_id: impl Into<String>, after: Option<&str>) -> Self {
        Self::Retrieve {
            channel_id: channel_id.into(),
            top_message: after.unwrap_or(ZERO_MESSAGE_ID).to_owned(),
        }
    }
}
