//! Task service error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the task service client.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No live connection; nothing was registered or sent.
    #[error("Socket is not connected")]
    NotConnected,

    /// The service answered with an explicit `error` message.
    #[error("Remote task error: {0}")]
    Remote(String),

    /// The service answered with a type the client does not know.
    #[error("Unknown response type: {raw}")]
    UnknownResponse {
        /// The full message as received.
        raw: serde_json::Value,
    },

    /// A frame that could not be parsed was attributed to this request.
    #[error("Malformed frame: {raw}")]
    MalformedFrame {
        /// The frame contents, lossily decoded.
        raw: String,
    },

    /// The request was dropped from the in-flight table without an answer,
    /// which happens when the connection is lost.
    #[error("Request {id} discarded before a response arrived")]
    Discarded {
        /// Correlation id of the request.
        id: String,
    },

    /// Script discovery found nothing to run.
    #[error("No task scripts found in {0}")]
    NoScripts(PathBuf),

    /// A task script could not be found or read.
    #[error("Task script error ({name}): {message}")]
    Script {
        /// Script file name.
        name: String,
        /// What went wrong.
        message: String,
    },
}

impl RpcError {
    /// Create a script error.
    pub fn script(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Script {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether a later retry could succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Discarded { .. } | Self::Io(_))
    }
}
