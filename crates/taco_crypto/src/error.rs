//! Error types for the cipher.

use thiserror::Error;

/// Invalid cipher parameters or buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Keys are 16, 24 or 32 bytes.
    #[error("key must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Blocks are 128, 192 or 256 bits.
    #[error("block size must be 128, 192 or 256 bits, got {0}")]
    InvalidBlockLength(usize),

    /// Input is not a whole number of blocks.
    #[error("input of {len} bytes is not a multiple of the {block} byte block")]
    UnalignedInput {
        /// Input length in bytes.
        len: usize,
        /// Block length in bytes.
        block: usize,
    },

    /// Output buffer is shorter than the input.
    #[error("output buffer holds {available} bytes, {needed} needed")]
    OutputTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// The CBC initialization vector must be exactly one block.
    #[error("IV must be {expected} bytes, got {actual}")]
    InvalidIvLength {
        /// Block length in bytes.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },
}

/// Result type for cipher operations.
pub type CipherResult<T> = Result<T, CipherError>;
