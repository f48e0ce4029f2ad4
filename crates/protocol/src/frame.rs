//! Binary file-transfer frame decoding.
//!
//! # Frame Format
//!
//! Each binary WebSocket message carries exactly one file:
//! - 4 bytes: file name length (little-endian u32)
//! - 8 bytes: last modified time, milliseconds since the Unix epoch
//!   (little-endian IEEE-754 double)
//! - N bytes: file name (raw bytes, not necessarily UTF-8)
//! - remaining bytes: file content (may be empty)
//!
//! Decoding is purely structural. Names are not validated here; mapping them
//! onto a safe path is the storage layer's job.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ParseError, Result};

/// Fixed header size: 4 (name length) + 8 (last modified) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Literal text payload sent back after a file has been stored.
pub const ACK_MESSAGE: &str = "ACK:image_received";

/// Port the daemon listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5000;

/// The fixed-size part of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Declared byte length of the file name.
    pub name_length: u32,
    /// Client-supplied modification time in milliseconds since the epoch.
    pub last_modified: f64,
}

impl FrameHeader {
    /// Read the header from the start of a message without looking at the body.
    pub fn peek(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::TooShortForHeader { len: data.len() });
        }

        let mut name_length = [0u8; 4];
        name_length.copy_from_slice(&data[0..4]);
        let mut last_modified = [0u8; 8];
        last_modified.copy_from_slice(&data[4..HEADER_SIZE]);

        Ok(Self {
            name_length: u32::from_le_bytes(name_length),
            last_modified: f64::from_le_bytes(last_modified),
        })
    }
}

/// A decoded file transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTransferFrame {
    /// Client-supplied modification time in milliseconds since the epoch.
    pub last_modified: f64,
    /// Raw file name bytes as sent by the client.
    pub file_name: Vec<u8>,
    /// File content.
    pub content: Vec<u8>,
}

impl FileTransferFrame {
    /// Create a new frame.
    pub fn new(file_name: impl Into<Vec<u8>>, last_modified: f64, content: Vec<u8>) -> Self {
        Self {
            last_modified,
            file_name: file_name.into(),
            content,
        }
    }

    /// Decode one binary message.
    ///
    /// Fails rather than truncating whenever the declared name length does
    /// not fit in the message.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (header, name_end) = Self::validate(data)?;

        Ok(Self {
            last_modified: header.last_modified,
            file_name: data[HEADER_SIZE..name_end].to_vec(),
            content: data[name_end..].to_vec(),
        })
    }

    /// Decode a message, reusing its buffer for the content.
    ///
    /// Same rules as [`parse`](Self::parse), without copying the content.
    pub fn from_message(mut data: Vec<u8>) -> Result<Self> {
        let (header, name_end) = Self::validate(&data)?;
        let file_name = data[HEADER_SIZE..name_end].to_vec();
        data.drain(..name_end);

        Ok(Self {
            last_modified: header.last_modified,
            file_name,
            content: data,
        })
    }

    /// Check the structure and return the header plus the end offset of the name.
    fn validate(data: &[u8]) -> Result<(FrameHeader, usize)> {
        let header = FrameHeader::peek(data)?;
        let available = data.len() - HEADER_SIZE;

        let name_length = header.name_length as usize;
        if available < name_length {
            return Err(ParseError::TooShortForName {
                name_length: header.name_length,
                available,
            });
        }

        Ok((header, HEADER_SIZE + name_length))
    }

    /// Encode the frame into a binary message (the client side of `parse`).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let name_length = u32::try_from(self.file_name.len()).map_err(|_| {
            ParseError::NameTooLong {
                len: self.file_name.len(),
            }
        })?;

        let mut output =
            Vec::with_capacity(HEADER_SIZE + self.file_name.len() + self.content.len());
        output.extend_from_slice(&name_length.to_le_bytes());
        output.extend_from_slice(&self.last_modified.to_le_bytes());
        output.extend_from_slice(&self.file_name);
        output.extend_from_slice(&self.content);

        Ok(output)
    }

    /// Declared name length as it appears on the wire.
    pub fn name_length(&self) -> usize {
        self.file_name.len()
    }

    /// File name as text, with invalid UTF-8 replaced.
    pub fn file_name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }

    /// The modification time as a `SystemTime`.
    ///
    /// Returns `None` when the timestamp is not a finite, non-negative value
    /// representable by the platform clock.
    pub fn modified_time(&self) -> Option<SystemTime> {
        millis_to_system_time(self.last_modified)
    }
}

/// Convert milliseconds since the epoch into a `SystemTime`.
pub fn millis_to_system_time(millis: f64) -> Option<SystemTime> {
    if !millis.is_finite() || millis < 0.0 {
        return None;
    }
    let duration = Duration::try_from_secs_f64(millis / 1000.0).ok()?;
    UNIX_EPOCH.checked_add(duration)
}
