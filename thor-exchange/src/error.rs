//! Error types for the exchange layer.
//!
//! Synchronous failures (`ChannelClosed`, `Transport`, `InvalidState`) are
//! returned directly from the call that triggered them. `Timeout` and
//! `Cancelled` are delivered asynchronously through a [`ResponseFuture`].
//!
//! [`ResponseFuture`]: crate::ResponseFuture

use std::time::Duration;

use thiserror::Error;

use crate::envelope::Status;

/// Errors that can occur in the exchange layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Operation attempted on a channel that has already been closed.
    #[error("channel {channel} is closed")]
    ChannelClosed {
        /// Display form of the channel.
        channel: String,
    },

    /// The underlying transport channel failed to send.
    #[error("transport failure: {message}")]
    Transport {
        /// Details about the transport failure.
        message: String,
    },

    /// No response arrived before the request's deadline.
    #[error("request {id} timed out after {elapsed:?} (sent: {sent})")]
    Timeout {
        /// Id of the request that timed out.
        id: u64,
        /// Time between registration and the timeout firing.
        elapsed: Duration,
        /// Whether the transport confirmed the request left the local buffer.
        sent: bool,
    },

    /// The pending request was cancelled before a response arrived.
    #[error("request {id} cancelled: {reason}")]
    Cancelled {
        /// Id of the cancelled request.
        id: u64,
        /// Why the request was cancelled.
        reason: String,
    },

    /// Operation needs a live client or channel that was never initialized.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Details about the invalid state.
        message: String,
    },

    /// A pending future with this id is already registered.
    #[error("duplicate request id: {id}")]
    DuplicateId {
        /// The conflicting request id.
        id: u64,
    },

    /// The remote peer answered with a non-OK status.
    #[error("remote error ({status:?}): {message}")]
    Remote {
        /// Status carried by the response.
        status: Status,
        /// Error message carried by the response.
        message: String,
    },

    /// Payload serialization or deserialization failed.
    #[error("codec error: {message}")]
    Codec {
        /// Details about the codec failure.
        message: String,
    },
}

impl ExchangeError {
    /// Build a transport failure from any displayable error.
    pub fn transport(message: impl Into<String>) -> Self {
        ExchangeError::Transport {
            message: message.into(),
        }
    }

    /// Build an invalid-state failure.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        ExchangeError::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error reports a timed-out request.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExchangeError::Timeout { .. })
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Codec {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(err: std::io::Error) -> Self {
        ExchangeError::Transport {
            message: err.to_string(),
        }
    }
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
