//! The single wire unit exchanged between client and server.
//!
//! A frame is a flat envelope: a type code plus five string fields. Routed
//! payloads (credentials, user lists, user records) travel as JSON documents
//! inside `content` or `extra` rather than as dedicated frame shapes, so the
//! envelope never changes when the payload vocabulary grows.

use serde::{Deserialize, Serialize};

use crate::types::{FrameKind, UserStatus};
use crate::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    /// "HH:MM:SS" in the producer's local time. Stamped on encode when empty;
    /// inbound values are carried but never authoritative.
    pub timestamp: String,
    /// Opaque inner JSON used for structured payloads.
    pub extra: String,
}

/// Serialized shape of a frame payload. All string fields default to empty
/// when absent on decode.
#[derive(Serialize, Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    receiver: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    extra: String,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            sender: String::new(),
            receiver: String::new(),
            content: String::new(),
            timestamp: current_timestamp(),
            extra: String::new(),
        }
    }

    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(FrameKind::Ok)
        }
    }

    pub fn ok_with_extra(content: impl Into<String>, extra: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: extra.into(),
            ..Self::new(FrameKind::Ok)
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(FrameKind::Error)
        }
    }

    pub fn global(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            ..Self::new(FrameKind::MsgGlobal)
        }
    }

    pub fn private(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            content: content.into(),
            ..Self::new(FrameKind::MsgPrivate)
        }
    }

    pub fn user_status(username: impl Into<String>, status: UserStatus) -> Self {
        Self {
            sender: username.into(),
            content: status.as_str().to_owned(),
            ..Self::new(FrameKind::UserStatus)
        }
    }

    /// ONLINE_LIST frame whose `extra` is a JSON array of usernames.
    pub fn online_list(users: &[String]) -> Result<Self, ProtocolError> {
        let extra = serde_json::to_string(users).map_err(ProtocolError::Encode)?;
        Ok(Self {
            extra,
            ..Self::new(FrameKind::OnlineList)
        })
    }

    pub(crate) fn to_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let wire = WireFrame {
            kind: self.kind.code(),
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            content: self.content.clone(),
            timestamp: if self.timestamp.is_empty() {
                current_timestamp()
            } else {
                self.timestamp.clone()
            },
            extra: self.extra.clone(),
        };
        serde_json::to_vec(&wire).map_err(ProtocolError::Encode)
    }

    pub(crate) fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WireFrame = serde_json::from_slice(payload).map_err(ProtocolError::Decode)?;
        let kind = FrameKind::from_code(wire.kind).ok_or(ProtocolError::UnknownType(wire.kind))?;
        Ok(Self {
            kind,
            sender: wire.sender,
            receiver: wire.receiver,
            content: wire.content,
            timestamp: wire.timestamp,
            extra: wire.extra,
        })
    }
}

/// "HH:MM:SS" in the server's local time.
pub fn current_timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
