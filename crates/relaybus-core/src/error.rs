//! Error handling for RelayBus
//!
//! Provides error types for every layer of the bus:
//! - Dispatch errors (scope lifecycle)
//! - Codec errors (envelope encoding, framing)
//! - Transport errors (role negotiation, sockets, outbound queue)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Dispatch error type
///
/// Raised by local delivery paths that refuse work.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The scope was shut down and no longer accepts tracked dispatches
    #[error("Scope '{scope}' has been shut down")]
    ScopeClosed {
        /// Name of the closed scope.
        scope: String,
    },

    /// Generic dispatch error
    #[error("Dispatch error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Codec error type
///
/// Represents failures turning envelopes into wire frames and back.
#[derive(Error, Debug)]
pub enum CodecError {
    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A complete frame was not valid UTF-8
    #[error("Frame is not valid UTF-8 ({len} bytes)")]
    InvalidUtf8 {
        /// Length of the rejected frame in bytes.
        len: usize,
    },

    /// A frame grew past the configured maximum without a terminator
    #[error("Frame exceeds {limit} bytes ({buffered} bytes buffered)")]
    FrameTooLarge {
        /// The configured maximum frame size.
        limit: usize,
        /// Bytes buffered when the limit was hit.
        buffered: usize,
    },
}

/// Transport error type
///
/// Represents errors of the cross-process bridge.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connecting to the configured address timed out
    #[error("Connection to {address} timed out after {timeout_ms}ms")]
    ConnectionTimeout {
        /// The address that was dialled.
        address: String,
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// No hub was reachable and the address could not be bound
    #[error("Failed to bind {address} after {attempts} attempts: {reason}")]
    BindFailed {
        /// The address that could not be bound.
        address: String,
        /// Number of bind attempts made.
        attempts: u32,
        /// The last bind failure.
        reason: String,
    },

    /// The bridge role was already decided
    #[error("Bridge role already decided as {current}")]
    RoleAlreadyDecided {
        /// The role that was decided first.
        current: String,
    },

    /// The outbound queue is at capacity
    #[error("Outbound queue is full ({capacity} frames)")]
    QueueFull {
        /// The queue capacity.
        capacity: usize,
    },

    /// The bridge has been shut down
    #[error("Bridge is closed")]
    Closed,

    /// Framing failure on a connection
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main error type for RelayBus
#[derive(Error, Debug)]
pub enum Error {
    /// Dispatch error
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Codec error
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a codec error
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Error::Codec(_) | Error::Transport(TransportError::Codec(_)))
    }

    /// Check if the bus refused work because it is shutting down
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Error::Dispatch(DispatchError::ScopeClosed { .. })
                | Error::Transport(TransportError::Closed)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(CodecError::Json(err))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
