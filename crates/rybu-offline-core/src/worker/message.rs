//! Messages posted to the worker by its pages.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::CacheResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Promote a waiting worker immediately. No reply.
    SkipWaiting,
    /// Re-fetch the manifest into the live bucket. Replies with `UpdateReply`.
    UpdateCache,
    /// Any other `type`; ignored
    #[serde(other)]
    Unknown,
}

impl Message {
    pub fn from_json(json: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Outcome of an `UPDATE_CACHE` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateReply {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Caller-supplied channel for the reply
pub type ReplyPort = oneshot::Sender<UpdateReply>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_messages() {
        assert_eq!(Message::from_json(r#"{"type":"SKIP_WAITING"}"#).unwrap(), Message::SkipWaiting);
        assert_eq!(Message::from_json(r#"{"type":"UPDATE_CACHE"}"#).unwrap(), Message::UpdateCache);
    }

    #[test]
    fn test_unknown_type_is_ignored_not_rejected() {
        assert_eq!(Message::from_json(r#"{"type":"PING"}"#).unwrap(), Message::Unknown);
    }

    #[test]
    fn test_missing_type_is_an_error() {
        assert!(Message::from_json(r#"{"kind":"SKIP_WAITING"}"#).is_err());
    }

    #[test]
    fn test_reply_serialization() {
        let ok = serde_json::to_string(&UpdateReply::success()).unwrap();
        assert_eq!(ok, r#"{"success":true}"#);

        let failed = serde_json::to_string(&UpdateReply::failure("offline")).unwrap();
        assert_eq!(failed, r#"{"success":false,"error":"offline"}"#);
    }
}
