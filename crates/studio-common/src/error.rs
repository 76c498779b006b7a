//! The signaling core's error taxonomy.
//!
//! Unlike a REST API, almost none of these ever become an HTTP response —
//! the WebSocket channel has no HTTP response to carry once it's upgraded.
//! Session-local errors become a wire-level `{"type":"error",...}` frame and
//! the connection stays open; only configuration failures at startup ever
//! abort the process.

use thiserror::Error;

/// Errors arising from handling a single inbound message on an established
/// connection. All of these are locally recovered: the offending connection
/// receives an `error` message and is never closed because of one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("malformed message: {0}")]
    MalformedFrame(String),

    #[error("{}", .reasons.join("; "))]
    Validation { reasons: Vec<String> },

    #[error("{0}")]
    StateViolation(String),

    #[error("Target peer \"{0}\" is not connected")]
    TargetNotConnected(String),

    #[error("peer id \"{0}\" is already registered")]
    PeerIdTaken(String),

    #[error("{0}")]
    StreamRejected(String),

    #[error("message exceeds maximum size of {limit} bytes")]
    MessageTooLarge { limit: usize },
}

impl SignalingError {
    /// The human-readable text placed in the `message` field of the wire-level
    /// `error` reply.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}

/// Error raised while loading or validating the station manifest at startup.
/// Always fatal: the process refuses to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid station manifest: {0}")]
    InvalidManifest(String),
}

pub type SignalingResult<T> = Result<T, SignalingError>;
