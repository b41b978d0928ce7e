//! Error types for the Forge SDK
//!
//! Every failure surfaces as a variant of [`Error`]. The taxonomy mirrors the
//! call lifecycle: connecting, transporting bytes, waiting on the engine, and
//! the engine rejecting the request itself.

use thiserror::Error;

/// SDK errors
#[derive(Error, Debug)]
pub enum Error {
    /// The session transport is unusable: not yet established, already
    /// closed, or broken underneath us. Never retried by the SDK.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An execution exceeded its allotted time. The session stays usable;
    /// the remote operation may still be running on the engine side.
    #[error("Execution timed out after {0:?}")]
    ExecuteTimeout(std::time::Duration),

    /// The engine accepted the request but reported an application-level
    /// failure. Carries the engine's diagnostic text verbatim.
    #[error("Query error: {0}")]
    Query(String),

    /// Establishing the session failed (spawn, handshake, or endpoint).
    #[error("Connection error: {0}")]
    Connect(String),

    /// A response value could not be decoded into the requested type.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl Error {
    /// True when the error indicates the session itself is gone, as opposed
    /// to a single call failing.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Decode(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            Error::Transport(format!("Connection to engine failed: {}", error))
        } else {
            Error::Transport(error.to_string())
        }
    }
}

/// Result type alias used throughout the SDK
pub type Result<T> = std::result::Result<T, Error>;
