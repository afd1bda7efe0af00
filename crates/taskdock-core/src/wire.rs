//! Wire shapes for the dashboard server's REST and WebSocket contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Status;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("push payload decode failed: {0}")]
    Decode(String),
}

/// A status-change notification from the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub name: String,
    pub status: Status,
}

/// Decode one text frame from the push channel.
///
/// Malformed frames surface as `WireError` so the channel handler can drop
/// and log them without tearing down the subscription.
pub fn decode_push_event(text: &str) -> Result<PushEvent, WireError> {
    serde_json::from_str(text).map_err(|err| WireError::Decode(err.to_string()))
}

/// Response body of `GET /drives`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveList {
    #[serde(default)]
    pub drives: Vec<String>,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Response body of `GET /list?path=`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirListing {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub files: Vec<DirEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_push_event() {
        let event = decode_push_event(r#"{"name":"jellyfin","status":"running"}"#)
            .expect("valid payload");
        assert_eq!(event.name, "jellyfin");
        assert_eq!(event.status, Status::Running);
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(decode_push_event("not json").is_err());
        assert!(decode_push_event(r#"{"name":"x"}"#).is_err());
        assert!(decode_push_event(r#"{"name":"x","status":"rebooting"}"#).is_err());
    }

    #[test]
    fn decode_error_names_the_problem() {
        let err = decode_push_event("{").expect_err("must fail");
        let WireError::Decode(message) = err;
        assert!(!message.is_empty());
    }

    #[test]
    fn directory_listing_tolerates_missing_fields() {
        let listing: DirListing = serde_json::from_str("{}").expect("deserialize");
        assert!(listing.files.is_empty());
        assert!(listing.path.is_empty());
    }
}
