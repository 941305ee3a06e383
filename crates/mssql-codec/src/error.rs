//! Codec-layer error types.
//!
//! These describe failures in the packet-framing and message-reassembly
//! layer: truncated or oversized packets, an unexpectedly closed transport,
//! and I/O failures from the underlying stream.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by packet framing, message assembly, or the split-I/O
/// connection wrapper.
#[derive(Debug, Error, Clone)]
pub enum CodecError {
    /// The packet header's length field was smaller than the header size.
    #[error("invalid packet header")]
    InvalidHeader,

    /// A packet's declared length exceeded the configured maximum.
    #[error("packet too large: {size} bytes exceeds maximum of {max}")]
    PacketTooLarge {
        /// Declared packet size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The underlying transport reached EOF with a partially buffered
    /// message still outstanding.
    #[error("connection closed with partial message buffered")]
    ConnectionClosed,

    /// A lower-level protocol decode error (invalid token, field, etc.).
    #[error("protocol error: {0}")]
    Protocol(#[from] tds_protocol::ProtocolError),

    /// An I/O error from the underlying transport, wrapped in `Arc` so
    /// `CodecError` stays `Clone`.
    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(Arc::new(e))
    }
}

/// Convenience alias for codec-layer results.
pub type Result<T> = std::result::Result<T, CodecError>;
