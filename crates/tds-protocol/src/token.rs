//! TDS token stream definitions.
//!
//! Tokens are the fundamental units of TDS response data. The server sends
//! a stream of tokens that describe metadata, rows, errors, and other information.
//!
//! ## Token Structure
//!
//! Each token begins with a 1-byte token type identifier, followed by
//! token-specific data. Some tokens have fixed lengths, while others
//! have length prefixes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tds_protocol::token::{Token, TokenParser};
//! use bytes::Bytes;
//!
//! let data: &[u8] = /* received from server */;
//! let mut parser = TokenParser::new();
//! parser.feed(data);
//!
//! while let Some(token) = parser.next_token()? {
//!     match token {
//!         Token::Done(done) => println!("Rows affected: {}", done.row_count),
//!         Token::Error(err) => eprintln!("Error {}: {}", err.number, err.message),
//!         _ => {}
//!     }
//! }
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_b_varchar, read_us_varchar};
use crate::error::ProtocolError;
use crate::types::{ColumnFlags, TypeId};

/// Token type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    /// Column metadata (COLMETADATA).
    ColMetaData = 0x81,
    /// Error message (ERROR).
    Error = 0xAA,
    /// Informational message (INFO).
    Info = 0xAB,
    /// Login acknowledgment (LOGINACK).
    LoginAck = 0xAD,
    /// Row data (ROW).
    Row = 0xD1,
    /// Null bitmap compressed row (NBCROW).
    NbcRow = 0xD2,
    /// Environment change (ENVCHANGE).
    EnvChange = 0xE3,
    /// SSPI authentication (SSPI).
    Sspi = 0xED,
    /// Done (DONE).
    Done = 0xFD,
    /// Done in procedure (DONEINPROC).
    DoneInProc = 0xFF,
    /// Done procedure (DONEPROC).
    DoneProc = 0xFE,
    /// Return status (RETURNSTATUS).
    ReturnStatus = 0x79,
    /// Return value (RETURNVALUE).
    ReturnValue = 0xAC,
    /// Order (ORDER).
    Order = 0xA9,
    /// Feature extension acknowledgment (FEATUREEXTACK).
    FeatureExtAck = 0xAE,
    /// Session state (SESSIONSTATE).
    SessionState = 0xE4,
    /// Federated authentication info (FEDAUTHINFO).
    FedAuthInfo = 0xEE,
    /// Column info (COLINFO).
    ColInfo = 0xA5,
    /// Table name (TABNAME).
    TabName = 0xA4,
    /// Offset (OFFSET).
    Offset = 0x78,
}

impl TokenType {
    /// Create a token type from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x81 => Some(Self::ColMetaData),
            0xAA => Some(Self::Error),
            0xAB => Some(Self::Info),
            0xAD => Some(Self::LoginAck),
            0xD1 => Some(Self::Row),
            0xD2 => Some(Self::NbcRow),
            0xE3 => Some(Self::EnvChange),
            0xED => Some(Self::Sspi),
            0xFD => Some(Self::Done),
            0xFF => Some(Self::DoneInProc),
            0xFE => Some(Self::DoneProc),
            0x79 => Some(Self::ReturnStatus),
            0xAC => Some(Self::ReturnValue),
            0xA9 => Some(Self::Order),
            0xAE => Some(Self::FeatureExtAck),
            0xE4 => Some(Self::SessionState),
            0xEE => Some(Self::FedAuthInfo),
            0xA5 => Some(Self::ColInfo),
            0xA4 => Some(Self::TabName),
            0x78 => Some(Self::Offset),
            _ => None,
        }
    }
}

/// Parsed TDS token.
///
/// This enum represents all possible tokens that can be received from SQL Server.
/// Each variant contains the parsed token data.
#[derive(Debug, Clone)]
pub enum Token {
    /// Column metadata describing result set structure.
    ColMetaData(ColMetaData),
    /// Row data.
    Row(RawRow),
    /// Null bitmap compressed row.
    NbcRow(NbcRow),
    /// Completion of a SQL statement.
    Done(Done),
    /// Completion of a stored procedure.
    DoneProc(DoneProc),
    /// Completion within a stored procedure.
    DoneInProc(DoneInProc),
    /// Return status from stored procedure.
    ReturnStatus(i32),
    /// Return value from stored procedure.
    ReturnValue(ReturnValue),
    /// Error message from server.
    Error(ServerError),
    /// Informational message from server.
    Info(ServerInfo),
    /// Login acknowledgment.
    LoginAck(LoginAck),
    /// Environment change notification.
    EnvChange(EnvChange),
    /// Column ordering information.
    Order(Order),
    /// Feature extension acknowledgment.
    FeatureExtAck(FeatureExtAck),
    /// SSPI authentication data.
    Sspi(SspiToken),
    /// Session state information.
    SessionState(SessionState),
    /// Federated authentication info.
    FedAuthInfo(FedAuthInfo),
    /// Browse-mode column info (legacy, raw payload only).
    ColInfo(RawToken),
    /// Browse-mode table name (legacy, raw payload only).
    TabName(RawToken),
    /// Browse-mode cursor offset (legacy, raw payload only).
    Offset(RawToken),
}

/// Column metadata token.
#[derive(Debug, Clone, Default)]
pub struct ColMetaData {
    /// Column definitions.
    pub columns: Vec<ColumnData>,
}

/// Column definition within metadata.
#[derive(Debug, Clone)]
pub struct ColumnData {
    /// Column name.
    pub name: String,
    /// User type identifier (usually 0 except for some legacy types).
    pub user_type: u32,
    /// Column data type.
    pub type_id: TypeId,
    /// Column flags.
    pub flags: ColumnFlags,
    /// Type-specific metadata.
    pub type_info: TypeInfo,
}

/// How a column's values are length-framed on the wire. Computed once, from
/// the column's `TypeId` and its declared maximum length, when COLMETADATA
/// is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueEncoding {
    /// No length prefix; size is implied by the type.
    Fixed,
    /// 1-byte length prefix; 0 means NULL (IntN/DecimalN/NumericN/FloatN/
    /// MoneyN/BitN/Guid/Date/Time/DateTime2/DateTimeOffset/DateTimeN).
    ByteLenNumeric,
    /// 1-byte length prefix; 0xFF means NULL (legacy Char/VarChar/Binary/
    /// VarBinary with maxlen <= 255).
    ByteLenString,
    /// 2-byte length prefix; 0xFFFF means NULL (Big* types and UDT without
    /// a recognized schema header).
    UShortLen,
    /// 4-byte length prefix; 0 means NULL (SQL_VARIANT).
    Variant,
    /// PLP chunked encoding; see `decode_plp`.
    Plp,
}

/// Type-specific metadata.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    /// Maximum length for variable-length types. `None` means the column
    /// was declared `(max)` / PLP on the wire (maxLength sentinel 0xFFFF).
    pub max_length: Option<u32>,
    /// Precision for numeric types.
    pub precision: Option<u8>,
    /// Scale for numeric types.
    pub scale: Option<u8>,
    /// Collation for string types.
    pub collation: Option<Collation>,
    /// How values of this column are framed on the wire.
    pub encoding: ValueEncoding,
}

impl Default for ValueEncoding {
    fn default() -> Self {
        ValueEncoding::Fixed
    }
}

/// SQL Server collation (5-byte COLLATION structure: 4-byte info + 1-byte
/// sort id).
#[derive(Debug, Clone, Copy, Default)]
pub struct Collation {
    /// Packed locale/comparison-flags/version info (4 bytes, little-endian).
    pub lcid: u32,
    /// Sort ID (0 for Windows collations, nonzero for SQL collations).
    pub sort_id: u8,
}

impl Collation {
    /// Decode a 5-byte COLLATION structure.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let lcid = src.get_u32_le();
        let sort_id = src.get_u8();
        Ok(Self { lcid, sort_id })
    }

    /// The primary LCID (lower 20 bits), as used for encoding lookup.
    #[must_use]
    pub fn locale_id(&self) -> u32 {
        self.lcid & crate::collation::LCID_MASK
    }

    /// Whether this collation indicates UTF-8 encoded text (SQL Server 2019+).
    #[must_use]
    pub fn is_utf8(&self) -> bool {
        crate::collation::is_utf8_collation(self.lcid)
    }
}

/// A decoded row: one value (or `None` for NULL) per column in the current
/// `ColMetaData`, in column order.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    /// Per-column values; `None` denotes NULL.
    pub values: Vec<Option<Bytes>>,
}

/// A decoded null-bitmap-compressed row. Once decoded the shape is
/// identical to `RawRow`; the bitmap has already been folded into `None`
/// entries. The bitmap itself is kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct NbcRow {
    /// The wire null bitmap, one bit per column, LSB-first.
    pub null_bitmap: Vec<u8>,
    /// Per-column values; `None` denotes NULL.
    pub values: Vec<Option<Bytes>>,
}

/// Done token indicating statement completion.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count (if applicable).
    pub row_count: u64,
}

/// Done status flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoneStatus {
    /// More results follow.
    pub more: bool,
    /// Error occurred.
    pub error: bool,
    /// Transaction in progress.
    pub in_xact: bool,
    /// Row count is valid.
    pub count: bool,
    /// Attention acknowledgment.
    pub attn: bool,
    /// Server error caused statement termination.
    pub srverror: bool,
}

/// Done in procedure token.
#[derive(Debug, Clone, Copy)]
pub struct DoneInProc {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count.
    pub row_count: u64,
}

/// Done procedure token.
#[derive(Debug, Clone, Copy)]
pub struct DoneProc {
    /// Status flags.
    pub status: DoneStatus,
    /// Current command.
    pub cur_cmd: u16,
    /// Row count.
    pub row_count: u64,
}

/// Return value from stored procedure.
#[derive(Debug, Clone)]
pub struct ReturnValue {
    /// Parameter ordinal.
    pub param_ordinal: u16,
    /// Parameter name.
    pub param_name: String,
    /// Status flags.
    pub status: u8,
    /// User type.
    pub user_type: u32,
    /// Type flags.
    pub flags: u16,
    /// Type info.
    pub type_info: TypeInfo,
    /// Value data; `None` denotes NULL.
    pub value: Option<Bytes>,
}

/// Column ordering/browse-mode metadata token with no structural content
/// this driver interprets further (COLINFO, TABNAME, OFFSET). Modern
/// servers rarely emit these outside legacy browse-mode cursors; the raw
/// payload is preserved for callers that need it.
#[derive(Debug, Clone, Default)]
pub struct RawToken {
    /// Raw token payload, length-prefix already stripped.
    pub data: Bytes,
}

/// Server error message.
#[derive(Debug, Clone)]
pub struct ServerError {
    /// Error number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Error severity class.
    pub class: u8,
    /// Error message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

/// Server informational message.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Info number.
    pub number: i32,
    /// Info state.
    pub state: u8,
    /// Info class (severity).
    pub class: u8,
    /// Info message text.
    pub message: String,
    /// Server name.
    pub server: String,
    /// Procedure name.
    pub procedure: String,
    /// Line number.
    pub line: i32,
}

/// Login acknowledgment token.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface type.
    pub interface: u8,
    /// TDS version.
    pub tds_version: u32,
    /// Program name.
    pub prog_name: String,
    /// Program version.
    pub prog_version: u32,
}

/// Environment change token.
#[derive(Debug, Clone)]
pub struct EnvChange {
    /// Type of environment change.
    pub env_type: EnvChangeType,
    /// New value.
    pub new_value: EnvChangeValue,
    /// Old value.
    pub old_value: EnvChangeValue,
}

/// Environment change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EnvChangeType {
    /// Database changed.
    Database = 1,
    /// Language changed.
    Language = 2,
    /// Character set changed.
    CharacterSet = 3,
    /// Packet size changed.
    PacketSize = 4,
    /// Unicode data sorting locale ID.
    UnicodeSortingLocalId = 5,
    /// Unicode comparison flags.
    UnicodeComparisonFlags = 6,
    /// SQL collation.
    SqlCollation = 7,
    /// Begin transaction.
    BeginTransaction = 8,
    /// Commit transaction.
    CommitTransaction = 9,
    /// Rollback transaction.
    RollbackTransaction = 10,
    /// Enlist DTC transaction.
    EnlistDtcTransaction = 11,
    /// Defect DTC transaction.
    DefectTransaction = 12,
    /// Real-time log shipping.
    RealTimeLogShipping = 13,
    /// Promote transaction.
    PromoteTransaction = 15,
    /// Transaction manager address.
    TransactionManagerAddress = 16,
    /// Transaction ended.
    TransactionEnded = 17,
    /// Reset connection completion acknowledgment.
    ResetConnectionCompletionAck = 18,
    /// User instance started.
    UserInstanceStarted = 19,
    /// Routing information.
    Routing = 20,
}

/// Environment change value.
#[derive(Debug, Clone)]
pub enum EnvChangeValue {
    /// String value.
    String(String),
    /// Binary value.
    Binary(bytes::Bytes),
    /// Routing information.
    Routing {
        /// Host name.
        host: String,
        /// Port number.
        port: u16,
    },
}

/// Column ordering information.
#[derive(Debug, Clone)]
pub struct Order {
    /// Ordered column indices.
    pub columns: Vec<u16>,
}

/// Feature extension acknowledgment.
#[derive(Debug, Clone)]
pub struct FeatureExtAck {
    /// Acknowledged features.
    pub features: Vec<FeatureAck>,
}

/// Individual feature acknowledgment.
#[derive(Debug, Clone)]
pub struct FeatureAck {
    /// Feature ID.
    pub feature_id: u8,
    /// Feature data.
    pub data: bytes::Bytes,
}

/// SSPI authentication token.
#[derive(Debug, Clone)]
pub struct SspiToken {
    /// SSPI data.
    pub data: bytes::Bytes,
}

/// Session state token.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Session state data.
    pub data: bytes::Bytes,
}

/// Federated authentication info.
#[derive(Debug, Clone)]
pub struct FedAuthInfo {
    /// STS URL.
    pub sts_url: String,
    /// Service principal name.
    pub spn: String,
}

// =============================================================================
// Token Parsing Implementation
// =============================================================================

/// Done token status flags bit positions.
mod done_status_bits {
    pub const DONE_MORE: u16 = 0x0001;
    pub const DONE_ERROR: u16 = 0x0002;
    pub const DONE_INXACT: u16 = 0x0004;
    pub const DONE_COUNT: u16 = 0x0010;
    pub const DONE_ATTN: u16 = 0x0020;
    pub const DONE_SRVERROR: u16 = 0x0100;
}

impl DoneStatus {
    /// Parse done status from raw bits.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        use done_status_bits::*;
        Self {
            more: (bits & DONE_MORE) != 0,
            error: (bits & DONE_ERROR) != 0,
            in_xact: (bits & DONE_INXACT) != 0,
            count: (bits & DONE_COUNT) != 0,
            attn: (bits & DONE_ATTN) != 0,
            srverror: (bits & DONE_SRVERROR) != 0,
        }
    }

    /// Convert to raw bits.
    #[must_use]
    pub fn to_bits(&self) -> u16 {
        use done_status_bits::*;
        let mut bits = 0u16;
        if self.more {
            bits |= DONE_MORE;
        }
        if self.error {
            bits |= DONE_ERROR;
        }
        if self.in_xact {
            bits |= DONE_INXACT;
        }
        if self.count {
            bits |= DONE_COUNT;
        }
        if self.attn {
            bits |= DONE_ATTN;
        }
        if self.srverror {
            bits |= DONE_SRVERROR;
        }
        bits
    }
}

impl Done {
    /// Size of the DONE token in bytes (excluding token type byte).
    pub const SIZE: usize = 12; // 2 (status) + 2 (curcmd) + 8 (rowcount)

    /// Decode a DONE token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the DONE token to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::Done as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }

    /// Check if more results follow this DONE token.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.status.more
    }

    /// Check if an error occurred.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.status.error
    }

    /// Check if the row count is valid.
    #[must_use]
    pub const fn has_count(&self) -> bool {
        self.status.count
    }
}

impl DoneProc {
    /// Size of the DONEPROC token in bytes (excluding token type byte).
    pub const SIZE: usize = 12;

    /// Decode a DONEPROC token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the DONEPROC token to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::DoneProc as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }
}

impl DoneInProc {
    /// Size of the DONEINPROC token in bytes (excluding token type byte).
    pub const SIZE: usize = 12;

    /// Decode a DONEINPROC token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < Self::SIZE {
            return Err(ProtocolError::IncompletePacket {
                expected: Self::SIZE,
                actual: src.remaining(),
            });
        }

        let status = DoneStatus::from_bits(src.get_u16_le());
        let cur_cmd = src.get_u16_le();
        let row_count = src.get_u64_le();

        Ok(Self {
            status,
            cur_cmd,
            row_count,
        })
    }

    /// Encode the DONEINPROC token to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(TokenType::DoneInProc as u8);
        dst.put_u16_le(self.status.to_bits());
        dst.put_u16_le(self.cur_cmd);
        dst.put_u64_le(self.row_count);
    }
}

/// Sentinel count in COLMETADATA meaning "no columns"; clears the active
/// column table.
const COLMETADATA_NO_COLUMNS: u16 = 0xFFFF;

/// PLP "NULL" length sentinel: the value is NULL, no chunks follow.
const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;
/// PLP "unknown length" sentinel: length is not known up front; a sequence
/// of {u32 chunk length, chunk bytes} follows, terminated by a zero-length
/// chunk.
const PLP_UNKNOWN_LENGTH: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// Fixed byte width of a `uniqueidentifier` value.
const GUID_SIZE: usize = 16;

fn classify_encoding(type_id: TypeId, declared_max_len: Option<u32>) -> ValueEncoding {
    match type_id {
        TypeId::Null
        | TypeId::Int1
        | TypeId::Bit
        | TypeId::Int2
        | TypeId::Int4
        | TypeId::Int8
        | TypeId::Float4
        | TypeId::Float8
        | TypeId::Money
        | TypeId::Money4
        | TypeId::DateTime
        | TypeId::DateTime4 => ValueEncoding::Fixed,

        TypeId::Guid
        | TypeId::IntN
        | TypeId::BitN
        | TypeId::FloatN
        | TypeId::MoneyN
        | TypeId::Decimal
        | TypeId::Numeric
        | TypeId::DecimalN
        | TypeId::NumericN
        | TypeId::DateTimeN
        | TypeId::Date
        | TypeId::Time
        | TypeId::DateTime2
        | TypeId::DateTimeOffset => ValueEncoding::ByteLenNumeric,

        TypeId::Char | TypeId::VarChar | TypeId::Binary | TypeId::VarBinary => {
            ValueEncoding::ByteLenString
        }

        TypeId::BigVarChar
        | TypeId::BigChar
        | TypeId::NChar
        | TypeId::NVarChar
        | TypeId::BigVarBinary
        | TypeId::BigBinary => {
            if declared_max_len.is_none() {
                ValueEncoding::Plp
            } else {
                ValueEncoding::UShortLen
            }
        }

        TypeId::Text | TypeId::NText | TypeId::Image | TypeId::Xml | TypeId::Tvp => {
            ValueEncoding::Plp
        }

        // CLR_UDT without a recognized schema header: fall back to a
        // USHORTCHARBINLEN binary read, per the documented heuristic.
        TypeId::Udt => ValueEncoding::UShortLen,

        TypeId::Variant => ValueEncoding::Variant,
    }
}

/// Decode the TYPE_INFO structure following a type's discriminant byte.
/// Shared between COLMETADATA column descriptors and RETURNVALUE tokens,
/// which carry the exact same TYPE_INFO grammar.
fn decode_type_info(src: &mut impl Buf, type_id: TypeId) -> Result<TypeInfo, ProtocolError> {
    let mut type_info = TypeInfo::default();

    if !type_id.is_fixed_length() {
        match type_id {
            TypeId::Guid
            | TypeId::IntN
            | TypeId::BitN
            | TypeId::FloatN
            | TypeId::MoneyN
            | TypeId::DateTimeN => {
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                type_info.max_length = Some(src.get_u8() as u32);
            }
            TypeId::Decimal | TypeId::Numeric | TypeId::DecimalN | TypeId::NumericN => {
                if src.remaining() < 3 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                type_info.max_length = Some(src.get_u8() as u32);
                type_info.precision = Some(src.get_u8());
                type_info.scale = Some(src.get_u8());
            }
            TypeId::Date => {}
            TypeId::Time | TypeId::DateTime2 | TypeId::DateTimeOffset => {
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                type_info.scale = Some(src.get_u8());
            }
            TypeId::Char | TypeId::VarChar | TypeId::Binary | TypeId::VarBinary => {
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                type_info.max_length = Some(src.get_u8() as u32);
                if matches!(type_id, TypeId::Char | TypeId::VarChar) {
                    type_info.collation = Some(Collation::decode(src)?);
                }
            }
            TypeId::BigVarChar | TypeId::BigChar | TypeId::NChar | TypeId::NVarChar => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let len = src.get_u16_le();
                type_info.max_length = if len == 0xFFFF { None } else { Some(len as u32) };
                type_info.collation = Some(Collation::decode(src)?);
            }
            TypeId::BigVarBinary | TypeId::BigBinary => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let len = src.get_u16_le();
                type_info.max_length = if len == 0xFFFF { None } else { Some(len as u32) };
            }
            TypeId::Text | TypeId::NText | TypeId::Image => {
                if src.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let _legacy_max_len = src.get_u32_le();
                if matches!(type_id, TypeId::Text | TypeId::NText) {
                    type_info.collation = Some(Collation::decode(src)?);
                }
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let num_parts = src.get_u8();
                for _ in 0..num_parts {
                    read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                }
                type_info.max_length = None;
            }
            TypeId::Xml => {
                if !src.has_remaining() {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let has_schema = src.get_u8();
                if has_schema == 1 {
                    read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                    read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                    read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                }
                type_info.max_length = None;
            }
            TypeId::Udt => {
                if src.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let _max_byte_size = src.get_u16_le();
                read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
                type_info.max_length = None;
            }
            TypeId::Variant => {}
            TypeId::Tvp => {
                type_info.max_length = None;
            }
            _ => {}
        }
    }

    type_info.encoding = classify_encoding(type_id, type_info.max_length);
    Ok(type_info)
}

impl ColumnData {
    /// Decode one column descriptor from a COLMETADATA token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let user_type = src.get_u32_le();
        let flags = ColumnFlags::from_bits(src.get_u16_le());

        if !src.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let type_byte = src.get_u8();
        let type_id = TypeId::from_u8(type_byte).ok_or(ProtocolError::InvalidField {
            field: "column_type",
            value: type_byte as u32,
        })?;

        let type_info = decode_type_info(src, type_id)?;
        let name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        Ok(Self {
            name,
            user_type,
            type_id,
            flags,
            type_info,
        })
    }
}

impl ColMetaData {
    /// Decode a COLMETADATA token body. A column count of `0xFFFF` means
    /// "no columns"; the caller should treat that as clearing its active
    /// column table.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let count = src.get_u16_le();
        if count == COLMETADATA_NO_COLUMNS {
            return Ok(Self {
                columns: Vec::new(),
            });
        }

        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            columns.push(ColumnData::decode(src)?);
        }
        Ok(Self { columns })
    }
}

/// Decode a single PLP (Partially Length-Prefixed) value.
///
/// `0xFFFFFFFFFFFFFFFF` means NULL (no chunks). `0xFFFFFFFFFFFFFFFE` means
/// "unknown length"; a sequence of `{u32 chunk length, bytes}` follows,
/// terminated by a zero-length chunk. Any other value is a known upfront
/// total length followed directly by that many bytes.
fn decode_plp(src: &mut impl Buf) -> Result<Option<Bytes>, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let total_len = src.get_u64_le();

    if total_len == PLP_NULL {
        return Ok(None);
    }

    if total_len == PLP_UNKNOWN_LENGTH {
        let mut out = BytesMut::new();
        loop {
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let chunk_len = src.get_u32_le() as usize;
            if chunk_len == 0 {
                break;
            }
            if src.remaining() < chunk_len {
                return Err(ProtocolError::UnexpectedEof);
            }
            out.extend_from_slice(&src.copy_to_bytes(chunk_len));
        }
        return Ok(Some(out.freeze()));
    }

    let len = total_len as usize;
    if src.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(Some(src.copy_to_bytes(len)))
}

/// Decode one column value according to its `ValueEncoding`.
fn decode_column_value(src: &mut impl Buf, col: &ColumnData) -> Result<Option<Bytes>, ProtocolError> {
    match col.type_info.encoding {
        ValueEncoding::Fixed => {
            let size = col.type_id.fixed_size().unwrap_or(0);
            if size == 0 {
                return Ok(None);
            }
            if src.remaining() < size {
                return Err(ProtocolError::UnexpectedEof);
            }
            Ok(Some(src.copy_to_bytes(size)))
        }
        ValueEncoding::ByteLenNumeric if col.type_id == TypeId::Guid => {
            // Heuristic (Open Question c): a uniqueidentifier is usually a
            // 1-byte length prefix (16 or 0) followed by the value, but
            // some paths omit the prefix and send the raw 16 bytes. Peek
            // the leading byte: if it equals the fixed width, treat it as
            // a length prefix; otherwise treat the stream as the raw value.
            if !src.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let peek = src.chunk().first().copied().unwrap_or(0);
            if peek as usize == GUID_SIZE {
                src.advance(1);
                if src.remaining() < GUID_SIZE {
                    return Err(ProtocolError::UnexpectedEof);
                }
                Ok(Some(src.copy_to_bytes(GUID_SIZE)))
            } else if peek == 0 {
                src.advance(1);
                Ok(None)
            } else {
                if src.remaining() < GUID_SIZE {
                    return Err(ProtocolError::UnexpectedEof);
                }
                Ok(Some(src.copy_to_bytes(GUID_SIZE)))
            }
        }
        ValueEncoding::ByteLenNumeric => {
            if !src.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let len = src.get_u8() as usize;
            if len == 0 {
                return Ok(None);
            }
            if src.remaining() < len {
                return Err(ProtocolError::UnexpectedEof);
            }
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueEncoding::ByteLenString => {
            if !src.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }
            let len = src.get_u8();
            if len == 0xFF {
                return Ok(None);
            }
            let len = len as usize;
            if src.remaining() < len {
                return Err(ProtocolError::UnexpectedEof);
            }
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueEncoding::UShortLen => {
            if src.remaining() < 2 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let len = src.get_u16_le();
            if len == 0xFFFF {
                return Ok(None);
            }
            let len = len as usize;
            if src.remaining() < len {
                return Err(ProtocolError::UnexpectedEof);
            }
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueEncoding::Variant => {
            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let len = src.get_u32_le();
            if len == 0 {
                return Ok(None);
            }
            let len = len as usize;
            if src.remaining() < len {
                return Err(ProtocolError::UnexpectedEof);
            }
            Ok(Some(src.copy_to_bytes(len)))
        }
        ValueEncoding::Plp => decode_plp(src),
    }
}

/// Decode a ROW token body: one value per column, in column order.
fn decode_row(src: &mut impl Buf, columns: &[ColumnData]) -> Result<RawRow, ProtocolError> {
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        values.push(decode_column_value(src, col)?);
    }
    Ok(RawRow { values })
}

/// Decode an NBCROW token body: a leading null bitmap, then values for the
/// non-null columns in order. A set bit means NULL; no bytes are present
/// for that column on the wire.
fn decode_nbc_row(src: &mut impl Buf, columns: &[ColumnData]) -> Result<NbcRow, ProtocolError> {
    let bitmap_len = columns.len().div_ceil(8);
    if src.remaining() < bitmap_len {
        return Err(ProtocolError::UnexpectedEof);
    }
    let mut null_bitmap = vec![0u8; bitmap_len];
    src.copy_to_slice(&mut null_bitmap);

    let mut values = Vec::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        let byte = null_bitmap[i / 8];
        let is_null = (byte & (1 << (i % 8))) != 0;
        if is_null {
            values.push(None);
        } else {
            values.push(decode_column_value(src, col)?);
        }
    }
    Ok(NbcRow {
        null_bitmap,
        values,
    })
}

impl RawToken {
    /// Decode a legacy browse-mode token with a 2-byte length prefix
    /// (COLINFO, TABNAME).
    fn decode_ushort_prefixed(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let len = src.get_u16_le() as usize;
        if src.remaining() < len {
            return Err(ProtocolError::IncompletePacket {
                expected: len,
                actual: src.remaining(),
            });
        }
        Ok(Self {
            data: src.copy_to_bytes(len),
        })
    }
}

impl ReturnValue {
    /// Decode a RETURNVALUE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let param_ordinal = src.get_u16_le();
        let param_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if !src.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let status = src.get_u8();

        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let user_type = src.get_u32_le();
        let flags = src.get_u16_le();

        if !src.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let type_byte = src.get_u8();
        let type_id = TypeId::from_u8(type_byte).ok_or(ProtocolError::InvalidField {
            field: "return_value_type",
            value: type_byte as u32,
        })?;

        // RETURNVALUE carries the exact same TYPE_INFO grammar as a
        // COLMETADATA column descriptor.
        let type_info = decode_type_info(src, type_id)?;
        let probe_column = ColumnData {
            name: String::new(),
            user_type,
            type_id,
            flags: ColumnFlags::from_bits(flags),
            type_info,
        };
        let value = decode_column_value(src, &probe_column)?;

        Ok(Self {
            param_ordinal,
            param_name,
            status,
            user_type,
            flags,
            type_info: probe_column.type_info,
            value,
        })
    }
}

impl SessionState {
    /// Decode a SESSIONSTATE token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let length = src.get_u32_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::IncompletePacket {
                expected: length,
                actual: src.remaining(),
            });
        }
        Ok(Self {
            data: src.copy_to_bytes(length),
        })
    }
}

impl ServerError {
    /// Decode an ERROR token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        // ERROR token: length (2) + number (4) + state (1) + class (1) +
        //              message (us_varchar) + server (b_varchar) + procedure (b_varchar) + line (4)
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _length = src.get_u16_le();

        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let server = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let procedure = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }

    /// Check if this is a fatal error (severity >= 20).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.class >= 20
    }

    /// Check if this error indicates the batch was aborted (severity >= 16).
    #[must_use]
    pub const fn is_batch_abort(&self) -> bool {
        self.class >= 16
    }
}

impl ServerInfo {
    /// Decode an INFO token from bytes.
    ///
    /// INFO tokens have the same structure as ERROR tokens but with lower severity.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _length = src.get_u16_le();

        if src.remaining() < 6 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = read_us_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let server = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;
        let procedure = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }
}

impl LoginAck {
    /// Decode a LOGINACK token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        // LOGINACK: length (2) + interface (1) + tds_version (4) + prog_name (b_varchar) + prog_version (4)
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _length = src.get_u16_le();

        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let interface = src.get_u8();
        let tds_version = src.get_u32_le();
        let prog_name = read_b_varchar(src).ok_or(ProtocolError::UnexpectedEof)?;

        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let prog_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }

    /// Get the TDS version as a `TdsVersion`.
    #[must_use]
    pub fn tds_version(&self) -> crate::version::TdsVersion {
        crate::version::TdsVersion::new(self.tds_version)
    }
}

impl EnvChangeType {
    /// Create from raw byte value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Database),
            2 => Some(Self::Language),
            3 => Some(Self::CharacterSet),
            4 => Some(Self::PacketSize),
            5 => Some(Self::UnicodeSortingLocalId),
            6 => Some(Self::UnicodeComparisonFlags),
            7 => Some(Self::SqlCollation),
            8 => Some(Self::BeginTransaction),
            9 => Some(Self::CommitTransaction),
            10 => Some(Self::RollbackTransaction),
            11 => Some(Self::EnlistDtcTransaction),
            12 => Some(Self::DefectTransaction),
            13 => Some(Self::RealTimeLogShipping),
            15 => Some(Self::PromoteTransaction),
            16 => Some(Self::TransactionManagerAddress),
            17 => Some(Self::TransactionEnded),
            18 => Some(Self::ResetConnectionCompletionAck),
            19 => Some(Self::UserInstanceStarted),
            20 => Some(Self::Routing),
            _ => None,
        }
    }
}

impl EnvChange {
    /// Decode an ENVCHANGE token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 3 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let length = src.get_u16_le() as usize;
        if src.remaining() < length {
            return Err(ProtocolError::IncompletePacket {
                expected: length,
                actual: src.remaining(),
            });
        }

        let env_type_byte = src.get_u8();
        let env_type = EnvChangeType::from_u8(env_type_byte)
            .ok_or(ProtocolError::InvalidTokenType(env_type_byte))?;

        let (new_value, old_value) = match env_type {
            EnvChangeType::Routing => {
                // Routing has special format
                let new_value = Self::decode_routing_value(src)?;
                let old_value = EnvChangeValue::Binary(Bytes::new());
                (new_value, old_value)
            }
            EnvChangeType::BeginTransaction
            | EnvChangeType::CommitTransaction
            | EnvChangeType::RollbackTransaction
            | EnvChangeType::EnlistDtcTransaction => {
                // Transaction tokens use binary format
                let new_len = src.get_u8() as usize;
                let new_value = if new_len > 0 && src.remaining() >= new_len {
                    EnvChangeValue::Binary(src.copy_to_bytes(new_len))
                } else {
                    EnvChangeValue::Binary(Bytes::new())
                };

                let old_len = src.get_u8() as usize;
                let old_value = if old_len > 0 && src.remaining() >= old_len {
                    EnvChangeValue::Binary(src.copy_to_bytes(old_len))
                } else {
                    EnvChangeValue::Binary(Bytes::new())
                };

                (new_value, old_value)
            }
            _ => {
                // String format for most env changes
                let new_value = read_b_varchar(src)
                    .map(EnvChangeValue::String)
                    .unwrap_or(EnvChangeValue::String(String::new()));

                let old_value = read_b_varchar(src)
                    .map(EnvChangeValue::String)
                    .unwrap_or(EnvChangeValue::String(String::new()));

                (new_value, old_value)
            }
        };

        Ok(Self {
            env_type,
            new_value,
            old_value,
        })
    }

    fn decode_routing_value(src: &mut impl Buf) -> Result<EnvChangeValue, ProtocolError> {
        // Routing format: length (2) + protocol (1) + port (2) + server_len (2) + server (utf16)
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _routing_len = src.get_u16_le();

        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _protocol = src.get_u8();
        let port = src.get_u16_le();
        let server_len = src.get_u16_le() as usize;

        // Read UTF-16LE server name
        if src.remaining() < server_len * 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut chars = Vec::with_capacity(server_len);
        for _ in 0..server_len {
            chars.push(src.get_u16_le());
        }

        let host = String::from_utf16(&chars)
            .map_err(|_| ProtocolError::StringEncoding("invalid UTF-16 in routing hostname".into()))?;

        Ok(EnvChangeValue::Routing { host, port })
    }

    /// Check if this is a routing redirect.
    #[must_use]
    pub fn is_routing(&self) -> bool {
        self.env_type == EnvChangeType::Routing
    }

    /// Get routing information if this is a routing change.
    #[must_use]
    pub fn routing_info(&self) -> Option<(&str, u16)> {
        if let EnvChangeValue::Routing { host, port } = &self.new_value {
            Some((host, *port))
        } else {
            None
        }
    }

    /// Get the new database name if this is a database change.
    #[must_use]
    pub fn new_database(&self) -> Option<&str> {
        if self.env_type == EnvChangeType::Database {
            if let EnvChangeValue::String(s) = &self.new_value {
                return Some(s);
            }
        }
        None
    }
}

impl Order {
    /// Decode an ORDER token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let length = src.get_u16_le() as usize;
        let column_count = length / 2;

        if src.remaining() < length {
            return Err(ProtocolError::IncompletePacket {
                expected: length,
                actual: src.remaining(),
            });
        }

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            columns.push(src.get_u16_le());
        }

        Ok(Self { columns })
    }
}

impl FeatureExtAck {
    /// Feature terminator byte.
    pub const TERMINATOR: u8 = 0xFF;

    /// Decode a FEATUREEXTACK token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut features = Vec::new();

        loop {
            if !src.has_remaining() {
                return Err(ProtocolError::UnexpectedEof);
            }

            let feature_id = src.get_u8();
            if feature_id == Self::TERMINATOR {
                break;
            }

            if src.remaining() < 4 {
                return Err(ProtocolError::UnexpectedEof);
            }

            let data_len = src.get_u32_le() as usize;

            if src.remaining() < data_len {
                return Err(ProtocolError::IncompletePacket {
                    expected: data_len,
                    actual: src.remaining(),
                });
            }

            let data = src.copy_to_bytes(data_len);
            features.push(FeatureAck { feature_id, data });
        }

        Ok(Self { features })
    }
}

impl SspiToken {
    /// Decode an SSPI token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 2 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let length = src.get_u16_le() as usize;

        if src.remaining() < length {
            return Err(ProtocolError::IncompletePacket {
                expected: length,
                actual: src.remaining(),
            });
        }

        let data = src.copy_to_bytes(length);
        Ok(Self { data })
    }
}

impl FedAuthInfo {
    /// Decode a FEDAUTHINFO token from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _length = src.get_u32_le();

        if src.remaining() < 5 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let _count = src.get_u8();

        // Read option data
        let mut sts_url = String::new();
        let mut spn = String::new();

        // Parse info options until we have both
        while src.has_remaining() {
            if src.remaining() < 9 {
                break;
            }

            let info_id = src.get_u8();
            let info_len = src.get_u32_le() as usize;
            let _info_offset = src.get_u32_le();

            if src.remaining() < info_len {
                break;
            }

            // Read UTF-16LE string
            let char_count = info_len / 2;
            let mut chars = Vec::with_capacity(char_count);
            for _ in 0..char_count {
                chars.push(src.get_u16_le());
            }

            if let Ok(value) = String::from_utf16(&chars) {
                match info_id {
                    0x01 => spn = value,
                    0x02 => sts_url = value,
                    _ => {}
                }
            }
        }

        Ok(Self { sts_url, spn })
    }
}

// =============================================================================
// Token Parser
// =============================================================================

/// Incremental token stream parser.
///
/// Tokens may straddle packet boundaries. Callers `feed` newly-arrived bytes
/// in, then drain as many tokens as are fully buffered with
/// `next_token_with_metadata` (or `next_token` when no active `ColMetaData`
/// applies). A `Ok(None)` return means "not enough bytes yet" — the internal
/// buffer is left untouched and the caller should `feed` more and retry.
/// The buffer only advances once a token has decoded in full, so a token
/// split across two packets is neither dropped nor double-consumed.
#[derive(Debug, Default)]
pub struct TokenParser {
    buffer: BytesMut,
}

impl TokenParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Create a parser pre-loaded with bytes (equivalent to `new()` followed
    /// by `feed`).
    #[must_use]
    pub fn with_bytes(data: Bytes) -> Self {
        let mut parser = Self::new();
        parser.feed(&data);
        parser
    }

    /// Append newly-received bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes currently buffered and not yet consumed by a decoded token.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len()
    }

    /// Whether any bytes are buffered at all.
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Parse the next token, with no active `ColMetaData` in scope.
    ///
    /// Returns an error for `COLMETADATA`/`ROW`/`NBCROW`/`RETURNVALUE`, which
    /// require `next_token_with_metadata`.
    pub fn next_token(&mut self) -> Result<Option<Token>, ProtocolError> {
        self.next_token_with_metadata(None)
    }

    /// Parse the next token, consulting `current_metadata` for tokens whose
    /// wire shape depends on the most recently seen `ColMetaData` (`ROW`,
    /// `NBCROW`). Returns `Ok(None)` if the buffer does not yet hold a
    /// complete token; the buffer is left untouched in that case so the
    /// caller can `feed` more bytes and retry.
    pub fn next_token_with_metadata(
        &mut self,
        current_metadata: Option<&ColMetaData>,
    ) -> Result<Option<Token>, ProtocolError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let original_len = self.buffer.len();
        let mut cursor: &[u8] = &self.buffer[..];

        let result = Self::decode_one(&mut cursor, current_metadata);
        let consumed = original_len - cursor.len();

        match result {
            Ok(token) => {
                self.buffer.advance(consumed);
                Ok(Some(token))
            }
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn decode_one(
        buf: &mut impl Buf,
        current_metadata: Option<&ColMetaData>,
    ) -> Result<Token, ProtocolError> {
        if !buf.has_remaining() {
            return Err(ProtocolError::UnexpectedEof);
        }
        let token_type_byte = buf.get_u8();
        let token_type = TokenType::from_u8(token_type_byte);

        let token = match token_type {
            Some(TokenType::Done) => Token::Done(Done::decode(buf)?),
            Some(TokenType::DoneProc) => Token::DoneProc(DoneProc::decode(buf)?),
            Some(TokenType::DoneInProc) => Token::DoneInProc(DoneInProc::decode(buf)?),
            Some(TokenType::Error) => Token::Error(ServerError::decode(buf)?),
            Some(TokenType::Info) => Token::Info(ServerInfo::decode(buf)?),
            Some(TokenType::LoginAck) => Token::LoginAck(LoginAck::decode(buf)?),
            Some(TokenType::EnvChange) => Token::EnvChange(EnvChange::decode(buf)?),
            Some(TokenType::Order) => Token::Order(Order::decode(buf)?),
            Some(TokenType::FeatureExtAck) => Token::FeatureExtAck(FeatureExtAck::decode(buf)?),
            Some(TokenType::Sspi) => Token::Sspi(SspiToken::decode(buf)?),
            Some(TokenType::FedAuthInfo) => Token::FedAuthInfo(FedAuthInfo::decode(buf)?),
            Some(TokenType::SessionState) => Token::SessionState(SessionState::decode(buf)?),
            Some(TokenType::ColInfo) => Token::ColInfo(RawToken::decode_ushort_prefixed(buf)?),
            Some(TokenType::TabName) => Token::TabName(RawToken::decode_ushort_prefixed(buf)?),
            Some(TokenType::Offset) => Token::Offset(RawToken::decode_ushort_prefixed(buf)?),
            Some(TokenType::ReturnStatus) => {
                if buf.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                Token::ReturnStatus(buf.get_i32_le())
            }
            Some(TokenType::ColMetaData) => Token::ColMetaData(ColMetaData::decode(buf)?),
            Some(TokenType::ReturnValue) => Token::ReturnValue(ReturnValue::decode(buf)?),
            Some(TokenType::Row) => {
                let metadata = current_metadata.ok_or(ProtocolError::ProtocolState(
                    "ROW token with no active ColMetaData".into(),
                ))?;
                Token::Row(decode_row(buf, &metadata.columns)?)
            }
            Some(TokenType::NbcRow) => {
                let metadata = current_metadata.ok_or(ProtocolError::ProtocolState(
                    "NBCROW token with no active ColMetaData".into(),
                ))?;
                Token::NbcRow(decode_nbc_row(buf, &metadata.columns)?)
            }
            None => return Err(ProtocolError::InvalidTokenType(token_type_byte)),
        };

        Ok(token)
    }
}

// =============================================================================
// no_std support
// =============================================================================

#[cfg(not(feature = "std"))]
use alloc::string::String;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

// =============================================================================
// Tests
// =============================================================================
