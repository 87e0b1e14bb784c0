//! Error types for frame parsing in rd200-types.

use thiserror::Error;

/// Errors that can occur when decoding RD200 reply frames.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in rd200-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The frame does not have the exact length the command's layout needs.
    #[error("Unexpected frame length for command 0x{command:02X}: expected {expected} bytes, got {actual}")]
    UnexpectedLength {
        /// Command byte the frame answers.
        command: u8,
        /// Required length.
        expected: usize,
        /// Received length.
        actual: usize,
    },

    /// The frame is shorter than the command's minimum layout.
    #[error("Frame too short for command 0x{command:02X}: need at least {minimum} bytes, got {actual}")]
    TooShort {
        /// Command byte the frame answers.
        command: u8,
        /// Minimum length.
        minimum: usize,
        /// Received length.
        actual: usize,
    },
}

/// Result type alias using rd200-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
