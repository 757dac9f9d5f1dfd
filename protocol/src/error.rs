//! Shared error taxonomy.
//!
//! Every fallible core operation returns a [`CoreError`]. The variants are
//! deliberately coarse: callers dispatch on the *kind* of failure
//! (programmer error, bad input, unmet precondition, domain validation,
//! malformed bytes, transport) and surface the carried message verbatim.

use thiserror::Error;

/// Errors produced by the protocol core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Programmer error — an API was called with an argument that can
    /// never be valid. Fail loudly.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller-supplied data was rejected (negative balance, malformed
    /// key material).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A state precondition was unmet: duplicate key, missing key,
    /// insufficient funds.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A transaction failed domain validation. Carries the precise reason.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A block failed domain validation. Carries the precise reason.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// Malformed internal bytes: empty Merkle input, a signature that is
    /// not 65 bytes, undecodable hex.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Overlay transport failure.
    #[error("transport: {0}")]
    Transport(String),

    /// Snapshot or other filesystem I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
