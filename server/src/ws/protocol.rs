//! JSON wire messages exchanged over `/ws`, one object per text frame,
//! discriminated by a `type` tag.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

pub const ERR_INVALID_FORMAT: &str = "invalid message format";
pub const ERR_UNKNOWN_TYPE: &str = "unknown message type";
pub const ERR_NOT_PAIRED: &str = "not in a pairing";
pub const ERR_PARTNER_OFFLINE: &str = "partner is offline";
pub const ERR_PARTNER_UNREACHABLE: &str = "partner is unreachable";
pub const ERR_UPLOAD_FIELDS: &str = "photo_id and s3_url are required";
pub const ERR_RECORD_UPDATE: &str = "failed to update record";
pub const ERR_INTERNAL: &str = "internal error";

/// Client → server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    TriggerPhoto {
        /// Capture time in ms since the epoch; omitted or 0 means "now".
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    PhotoUploaded {
        #[serde(default)]
        photo_id: String,
        #[serde(default)]
        s3_url: String,
    },
    /// Any tag this server does not understand.
    #[serde(other)]
    Unknown,
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    TakePhoto {
        initiator_id: String,
        timestamp: i64,
    },
    PartnerStatus {
        online: bool,
    },
    PairStatus {
        data: PairStatusData,
    },
    PairCreated {
        data: PairCreatedData,
    },
    PairDeleted {},
    Error {
        message: String,
    },
}

/// Payload of `pair_status`, sent to a connection right after it registers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PairStatusData {
    pub has_pair: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PairCreatedData {
    pub pair_id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub created_at: String,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn pair_status(pair_id: Option<String>) -> Self {
        ServerMessage::PairStatus {
            data: PairStatusData {
                has_pair: pair_id.is_some(),
                pair_id,
            },
        }
    }

    /// Short tag used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::TakePhoto { .. } => "take_photo",
            ServerMessage::PartnerStatus { .. } => "partner_status",
            ServerMessage::PairStatus { .. } => "pair_status",
            ServerMessage::PairCreated { .. } => "pair_created",
            ServerMessage::PairDeleted {} => "pair_deleted",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Text(serde_json::to_string(self)?.into()))
    }
}

/// Decode one inbound frame payload. Any JSON object parses; one without a
/// `type` tag (or with a null tag) is `Unknown`.
pub fn decode(data: &[u8]) -> Result<ClientMessage, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    if value.is_object() && value.get("type").map_or(true, serde_json::Value::is_null) {
        return Ok(ClientMessage::Unknown);
    }
    serde_json::from_value(value)
}
