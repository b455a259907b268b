//! reqwest-backed chat client.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ChatBackend, ChatReply, ChatRequest, SessionToken};
use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::session::DEFAULT_REQUEST_TIMEOUT;
use crate::util::timeout::whole_millis;

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Posts `{session_id, message}` to `{base_url}/chat`.
#[derive(Debug, Clone)]
pub struct HttpChatBackend {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpChatBackend {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            client: shared_client().clone(),
            endpoint: format!("{}/chat", base_url.as_ref().trim_end_matches('/')),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        Self::new(&config.api_base_url).with_timeout(config.request_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    session_id: Option<SessionToken>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn send(&self, request: &ChatRequest) -> Result<ChatReply> {
        debug!(
            endpoint = %self.endpoint,
            has_session = request.session_id.is_some(),
            "sending chat request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(status_to_error(status.as_u16(), &body));
        }
        parse_reply(&body)
    }
}

impl HttpChatBackend {
    fn map_transport_error(&self, error: reqwest::Error) -> ParleyError {
        if error.is_timeout() {
            ParleyError::Timeout(whole_millis(self.timeout))
        } else {
            ParleyError::Network(error)
        }
    }
}

/// Decode a success body. An absent or empty `message` is invalid.
fn parse_reply(body: &str) -> Result<ChatReply> {
    let wire: WireReply = serde_json::from_str(body)
        .map_err(|e| ParleyError::InvalidResponse(format!("malformed reply: {e}")))?;
    match wire.message {
        Some(message) if !message.is_empty() => Ok(ChatReply {
            session_id: wire.session_id,
            message,
        }),
        _ => Err(ParleyError::InvalidResponse(
            "Invalid response from server".into(),
        )),
    }
}

/// Map a non-success status to an API error, preferring the server's own
/// `error` or `detail` text.
pub fn status_to_error(status: u16, body: &str) -> ParleyError {
    let message = extract_error_message(body)
        .unwrap_or_else(|| format!("Request failed with status code {status}"));
    ParleyError::api(status, message)
}

fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    ["error", "detail"].iter().find_map(|field| match value.get(field)? {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        assert_eq!(
            HttpChatBackend::new("http://localhost:8000/").endpoint(),
            "http://localhost:8000/chat"
        );
    }

    #[test]
    fn parse_reply_requires_message() {
        let reply = parse_reply(r#"{"session_id": 3, "message": "hello"}"#).unwrap();
        assert_eq!(reply.message, "hello");
        assert_eq!(reply.session_id, Some(SessionToken::Number(3)));

        for body in [r#"{"session_id": "s1"}"#, r#"{"message": ""}"#, "not json"] {
            assert!(matches!(
                parse_reply(body),
                Err(ParleyError::InvalidResponse(_))
            ));
        }
    }

    #[test]
    fn status_errors_use_server_text() {
        let err = status_to_error(500, r#"{"detail": "Internal server error: boom"}"#);
        assert!(matches!(
            err,
            ParleyError::Api { status: 500, ref message } if message == "Internal server error: boom"
        ));

        let err = status_to_error(502, "<html>bad gateway</html>");
        assert_eq!(err.description(), "Request failed with status code 502");

        let err = status_to_error(400, r#"{"error": {"message": "bad input"}}"#);
        assert_eq!(err.description(), "bad input");
    }
}
