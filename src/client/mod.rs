//! Remote chat-completion collaborator.
//!
//! The core only needs one request/response exchange; [`ChatBackend`] is the
//! seam, [`HttpChatBackend`] the production implementation.

pub mod http;

pub use http::HttpChatBackend;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque correlation token issued by the remote service.
///
/// Servers issue either numeric or string tokens; the token is echoed back
/// in whichever form it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionToken {
    Number(i64),
    Text(String),
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SessionToken {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

/// Outbound request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// `None` on the first turn of a session.
    pub session_id: Option<SessionToken>,
    pub message: String,
}

/// A successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: Option<SessionToken>,
    pub message: String,
}

/// One request/response exchange with a chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `request`. Transport failures, non-success statuses and replies
    /// without a message are errors.
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_null_session_on_first_turn() {
        let request = ChatRequest {
            session_id: None,
            message: "hi".into(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"session_id": null, "message": "hi"})
        );
    }

    #[test]
    fn session_token_keeps_its_wire_shape() {
        let numeric: SessionToken = serde_json::from_str("12").unwrap();
        assert_eq!(numeric, SessionToken::Number(12));
        assert_eq!(serde_json::to_string(&numeric).unwrap(), "12");

        let text: SessionToken = serde_json::from_str(r#""s1""#).unwrap();
        assert_eq!(text, SessionToken::from("s1"));
        assert_eq!(text.to_string(), "s1");
    }
}
