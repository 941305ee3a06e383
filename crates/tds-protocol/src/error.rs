//! Protocol-layer error types.
//!
//! Errors here describe malformed wire data: truncated packets, unknown
//! discriminants, and fields whose value is out of the range MS-TDS allows.
//! They carry no transport or authentication context — that classification
//! happens one layer up, in `mssql_client::error`.

use thiserror::Error;

/// Errors produced while decoding or encoding TDS wire structures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes were available than a fixed-size structure requires.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// A packet header was shorter than 8 bytes, or its length field was
    /// less than 8. Framing cannot recover from this; the connection must
    /// be closed.
    #[error("packet framing error: {0}")]
    ProtocolFraming(&'static str),

    /// A buffered packet or message was incomplete. Distinct from
    /// `ProtocolFraming`: the bytes seen so far are well-formed, more are
    /// simply needed.
    #[error("incomplete packet: expected {expected} bytes, have {actual}")]
    IncompletePacket {
        /// Bytes required to complete the structure.
        expected: usize,
        /// Bytes currently buffered.
        actual: usize,
    },

    /// An unrecognized `PacketType` discriminant.
    #[error("invalid packet type: 0x{0:02x}")]
    InvalidPacketType(u8),

    /// An unrecognized `PacketStatus` bit pattern.
    #[error("invalid packet status: 0x{0:02x}")]
    InvalidPacketStatus(u8),

    /// An unrecognized PRELOGIN option token.
    #[error("invalid prelogin option: 0x{0:02x}")]
    InvalidPreloginOption(u8),

    /// An unrecognized token-stream discriminant byte.
    #[error("invalid token type: 0x{0:02x}")]
    InvalidTokenType(u8),

    /// A field decoded to a value outside the set MS-TDS permits.
    #[error("invalid field `{field}`: {value}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// The value that was rejected.
        value: u32,
    },

    /// A UTF-16LE or collation-keyed byte string failed to decode.
    #[error("string encoding error: {0}")]
    StringEncoding(String),

    /// A state-machine violation: a packet type that is not legal in the
    /// connection's current login phase.
    #[error("protocol state error: {0}")]
    ProtocolState(String),
}

impl ProtocolError {
    /// True if this error means "not enough bytes were buffered yet" rather
    /// than "the bytes present are malformed". Incremental parsers use this
    /// to decide whether to wait for more input or surface a hard failure.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnexpectedEof | ProtocolError::IncompletePacket { .. }
        )
    }
}

/// Convenience alias for protocol decode/encode results.
pub type Result<T> = std::result::Result<T, ProtocolError>;
