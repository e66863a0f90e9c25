//! Error types for the kiosk bridge

use thiserror::Error;

/// Bridge-wide error type.
///
/// Variants carry owned strings rather than `#[from]` sources so the error is
/// `Clone`: every caller awaiting the shared connection attempt must receive
/// the same rejection.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("transport not available: the hosting environment did not provide one")]
    TransportUnavailable,

    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(std::time::Duration),

    #[error("slot '{0}' not found on remote object")]
    SlotNotFound(String),

    #[error("slot '{slot}' timed out after {timeout:?}")]
    OperationTimedOut {
        slot: String,
        timeout: std::time::Duration,
    },

    #[error("remote call '{slot}' failed: {message}")]
    RemoteCallFailed { slot: String, message: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
