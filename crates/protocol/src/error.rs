//! Error types for the protocol crate.

use thiserror::Error;

/// Structural decoding failures for a file-transfer frame.
///
/// Every variant rejects the triggering message as a whole; the parser never
/// clamps or truncates to make a short buffer fit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The message is shorter than the fixed 12-byte header.
    #[error("frame too short for header: need 12 bytes, have {len}")]
    TooShortForHeader {
        /// Actual message length.
        len: usize,
    },

    /// The header declares a file name longer than the bytes that follow it.
    #[error("frame too short for file name: header declares {name_length} bytes, {available} available")]
    TooShortForName {
        /// Name length declared in the header.
        name_length: u32,
        /// Bytes remaining after the header.
        available: usize,
    },

    /// A file name cannot be encoded because its length does not fit in a u32.
    #[error("file name too long to encode: {len} bytes")]
    NameTooLong {
        /// Length of the offending name.
        len: usize,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ParseError>;
