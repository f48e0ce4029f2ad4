//! # FileDrop Protocol Library
//!
//! This crate defines the binary wire format used by FileDrop clients to
//! upload files to the daemon.
//!
//! ## Overview
//!
//! A client opens a WebSocket connection and sends one binary message per
//! file. Each message is a self-contained frame:
//!
//! ```text
//! ┌──────────────┬────────────────┬─────────────┬──────────────────┐
//! │ name_length  │ last_modified  │ file_name   │ content          │
//! │ u32 LE (4)   │ f64 LE (8)     │ name_length │ remaining bytes  │
//! └──────────────┴────────────────┴─────────────┴──────────────────┘
//! ```
//!
//! After the file has been stored the daemon answers with the text message
//! [`ACK_MESSAGE`]. A malformed frame gets no answer; the connection is closed.
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::FileTransferFrame;
//!
//! let frame = FileTransferFrame::new("x.bin", 1_700_000_000_000.0, vec![1, 2, 3]);
//! let bytes = frame.encode().unwrap();
//!
//! let decoded = FileTransferFrame::parse(&bytes).unwrap();
//! assert_eq!(decoded.content, vec![1, 2, 3]);
//! ```
//!
//! ## Modules
//!
//! - [`frame`]: Frame layout, decoding and encoding
//! - [`error`]: Error types

pub mod error;
pub mod frame;

pub use error::{ParseError, Result};
pub use frame::{
    millis_to_system_time, FileTransferFrame, FrameHeader, ACK_MESSAGE, DEFAULT_PORT, HEADER_SIZE,
};
