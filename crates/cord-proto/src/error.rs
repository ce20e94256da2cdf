//! Error types for the cord-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway frames.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Opcode outside the known table.
    #[error("invalid opcode: {0}")]
    InvalidOpcode(u64),

    /// Missing required field.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}
