//! Gateway and REST error types.

use nodus_tickrate::RpcError;
use thiserror::Error;

/// Errors that can occur talking to the chat platform.
#[derive(Debug, Error)]
pub enum DiscordError {
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The task service failed to run the request.
    #[error("Task service error: {0}")]
    Rpc(#[from] RpcError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Invalid gateway URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The platform API rejected a request.
    #[error("API error{}: {message}", code.map(|c| format!(" {}", c)).unwrap_or_default())]
    Api {
        /// Platform error code, when present.
        code: Option<i64>,
        /// Error message.
        message: String,
    },

    /// The platform answered with something unexpected.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Gateway not connected.
    #[error("Gateway not connected")]
    NotConnected,
}

impl DiscordError {
    /// Create an API error.
    pub fn api(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Check if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Rpc(e) => e.is_transient(),
            Self::WebSocket(_) | Self::NotConnected => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            DiscordError::api(Some(50001), "Missing Access").to_string(),
            "API error 50001: Missing Access"
        );
        assert_eq!(DiscordError::api(None, "nope").to_string(), "API error: nope");
    }

    #[test]
    fn test_retriable() {
        assert!(DiscordError::Rpc(RpcError::NotConnected).is_retriable());
        assert!(!DiscordError::Rpc(RpcError::Remote("x".into())).is_retriable());
        assert!(!DiscordError::api(None, "x").is_retriable());
    }
}
