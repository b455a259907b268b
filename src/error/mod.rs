//! Error types for Parley.

use thiserror::Error;

/// Primary error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Corrupt persisted data: {0}")]
    CorruptData(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Saved data could not be decoded; recovered by starting fresh.
    CorruptPersistedData,
    /// The chat-completion exchange failed; recovered with a fallback reply.
    RemoteRequestFailed,
    Storage,
    Configuration,
}

impl ParleyError {
    /// Create an API error from a status code and description.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CorruptData(_) => ErrorCategory::CorruptPersistedData,
            Self::Api { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::InvalidResponse(_) => ErrorCategory::RemoteRequestFailed,
            Self::Storage(_) | Self::Serialization(_) => ErrorCategory::Storage,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether retrying the same remote exchange could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Human-readable description shown next to (not inside) the transcript.
    pub fn description(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            Self::Timeout(ms) => format!("timeout of {ms}ms exceeded"),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ParleyError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_failures_share_a_category() {
        assert_eq!(
            ParleyError::Timeout(10).category(),
            ErrorCategory::RemoteRequestFailed
        );
        assert_eq!(
            ParleyError::api(500, "boom").category(),
            ErrorCategory::RemoteRequestFailed
        );
        assert_eq!(
            ParleyError::InvalidResponse("no message".into()).category(),
            ErrorCategory::RemoteRequestFailed
        );
        assert_eq!(
            ParleyError::CorruptData("bad".into()).category(),
            ErrorCategory::CorruptPersistedData
        );
    }

    #[test]
    fn retryable_statuses() {
        assert!(ParleyError::api(503, "down").is_retryable());
        assert!(ParleyError::api(429, "slow down").is_retryable());
        assert!(!ParleyError::api(404, "Session not found").is_retryable());
        assert!(!ParleyError::CorruptData("x".into()).is_retryable());
    }

    #[test]
    fn description_prefers_server_message() {
        assert_eq!(
            ParleyError::api(404, "Session not found").description(),
            "Session not found"
        );
        assert_eq!(
            ParleyError::Timeout(500).description(),
            "timeout of 500ms exceeded"
        );
    }

    #[test]
    fn io_errors_become_storage_errors() {
        let err: ParleyError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, ParleyError::Storage(ref m) if m.contains("disk full")));
    }
}
