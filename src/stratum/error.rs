//! Pool connection errors.

use std::io;
use thiserror::Error;

/// Errors from the pool connection.
#[derive(Debug, Error)]
pub enum StratumError {
    /// The pool closed the connection, or it is otherwise gone.
    #[error("pool connection closed")]
    Disconnected,

    /// No response arrived within the I/O timeout during the handshake.
    #[error("pool response timed out")]
    Timeout,

    /// A message arrived that could not be interpreted.
    #[error("malformed pool message: {0}")]
    InvalidMessage(String),

    /// The subscribe exchange failed.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Shutdown was requested while waiting on the pool.
    #[error("shutdown requested")]
    Shutdown,

    /// Underlying socket error.
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

pub type StratumResult<T> = Result<T, StratumError>;
