//! Record shapes shared by replies and pushes.
//!
//! Servers in the wild omit fields they consider irrelevant to a given reply,
//! so everything except the primary id is `#[serde(default)]`.

use serde::{Deserialize, Serialize};

/// An account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    /// Server-side ordinal
    #[serde(default)]
    pub index: i64,
    /// Hex-encoded public signing key
    #[serde(default)]
    pub pubkey: String,
    /// Display name
    #[serde(default)]
    pub username: String,
    /// Moderation level; higher is more privileged
    #[serde(rename = "powerLevel", default)]
    pub power_level: i64,
    /// Account id
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Whether the account is banned
    #[serde(default)]
    pub banned: bool,
}

/// A chat channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Channel {
    /// Server-side ordinal
    #[serde(default)]
    pub index: i64,
    /// Channel id
    #[serde(rename = "channelID")]
    pub channel_id: String,
    /// Account id of the channel admin
    #[serde(default)]
    pub admin: String,
    /// Whether anyone may join without a permission grant
    #[serde(default)]
    pub public: bool,
    /// Display name
    #[serde(default)]
    pub name: String,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileRecord {
    /// Server-side ordinal
    #[serde(default)]
    pub index: i64,
    /// File id
    #[serde(rename = "fileID")]
    pub file_id: String,
    /// Original file name
    #[serde(rename = "fileName", default)]
    pub file_name: String,
    /// Account id of the uploader
    #[serde(rename = "ownerID", default)]
    pub owner_id: String,
    /// Download location; filled in by the client from its configured host
    #[serde(default)]
    pub url: String,
}

/// A channel permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permission {
    /// Grantee
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Channel the grant applies to
    #[serde(rename = "channelID")]
    pub channel_id: String,
    /// Level granted within the channel
    #[serde(rename = "powerLevel", default)]
    pub power_level: i64,
}

/// A chat message, as pushed live or replayed from history.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-side ordinal
    #[serde(default)]
    pub index: i64,
    /// Author display name
    #[serde(default)]
    pub username: String,
    /// Message id
    #[serde(rename = "messageID", default)]
    pub message_id: String,
    /// Verb the message was sent with (usually `CREATE`)
    #[serde(default)]
    pub method: String,
    /// Message body
    #[serde(default)]
    pub message: String,
    /// Channel the message was posted to
    #[serde(rename = "channelID", default)]
    pub channel_id: String,
    /// Author account id
    #[serde(rename = "userID", default)]
    pub user_id: String,
}
