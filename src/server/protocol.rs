#![forbid(unsafe_code)]

// Wire frames for the duplex chat stream.

use serde::{Deserialize, Serialize};

/// Client-to-server frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// A chat message addressed to the caller's room.
    Message { body: String },
}

/// Server-to-client frames. Errors are never framed mid-stream; a failing
/// stream simply terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// A chat message from another participant in the room.
    Message { sender: String, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"message","body":"hi"}"#).unwrap();
        let ClientFrame::Message { body } = frame;
        assert_eq!(body, "hi");
    }

    #[test]
    fn server_frame_serializes_tagged() {
        let json = serde_json::to_string(&ServerFrame::Message {
            sender: "alice".to_string(),
            body: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"message","sender":"alice","body":"hi"}"#);
    }

    #[test]
    fn unknown_frame_type_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe"}"#).is_err());
    }
}
