//! Connection state types for type-state pattern.
//!
//! The type-state pattern ensures at compile time that certain operations
//! can only be performed when the connection is in the appropriate state.
//!
//! ## State Transitions
//!
//! ```text
//! Disconnected -> Connected (via TCP connect)
//! Connected -> Ready (via authentication)
//! Ready -> InTransaction (via begin_transaction())
//! Ready -> Streaming (via query() that returns stream)
//! InTransaction -> Ready (via commit() or rollback())
//! InTransaction -> Streaming (via query() within transaction)
//! Streaming -> Ready (via stream completion or cancellation)
//! Streaming -> InTransaction (via stream completion within transaction)
//! ```

use std::marker::PhantomData;

/// Marker trait for connection states.
///
/// This trait is sealed to prevent external implementations,
/// ensuring that only the states defined in this crate are valid.
pub trait ConnectionState: private::Sealed {}

/// Connection is not yet established.
///
/// In this state, only `connect()` can be called.
pub struct Disconnected;

/// TCP connection established, awaiting authentication.
///
/// In this intermediate state:
/// - TCP connection is open
/// - TLS negotiation may be in progress or complete
/// - Login/authentication has not yet completed
///
/// This state is mostly internal; users typically go directly from
/// `Disconnected` to `Ready` via `Client::connect()`.
pub struct Connected;

/// Connection is established and ready for queries.
///
/// In this state, queries can be executed and transactions can be started.
pub struct Ready;

/// Connection is in a transaction.
///
/// In this state, queries execute within the transaction context.
/// The transaction must be explicitly committed or rolled back.
pub struct InTransaction;

/// Connection is actively streaming results.
///
/// In this state, the connection is processing a result set.
/// No other operations can be performed until the stream is
/// consumed or cancelled.
pub struct Streaming;

impl ConnectionState for Disconnected {}
impl ConnectionState for Connected {}
impl ConnectionState for Ready {}
impl ConnectionState for InTransaction {}
impl ConnectionState for Streaming {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Disconnected {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Ready {}
    impl Sealed for super::InTransaction {}
    impl Sealed for super::Streaming {}
}

/// Type-level state transition marker.
///
/// This is used internally to track state transitions at compile time.
#[derive(Debug)]
pub struct StateMarker<S: ConnectionState> {
    _state: PhantomData<S>,
}

impl<S: ConnectionState> StateMarker<S> {
    pub(crate) fn new() -> Self {
        Self {
            _state: PhantomData,
        }
    }
}

impl<S: ConnectionState> Default for StateMarker<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ConnectionState> Clone for StateMarker<S> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<S: ConnectionState> Copy for StateMarker<S> {}

/// Internal protocol state for runtime management.
///
/// While connection states are tracked at compile-time via type-state,
/// the protocol layer has runtime state that must be managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    /// Awaiting response from server.
    AwaitingResponse,
    /// Processing token stream.
    ProcessingTokens,
    /// Draining remaining tokens after cancellation.
    Draining,
    /// Connection is in a broken state due to protocol error.
    Poisoned,
}

impl Default for ProtocolState {
    fn default() -> Self {
        Self::AwaitingResponse
    }
}

impl ProtocolState {
    /// Check if the connection is in a usable state.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Poisoned)
    }

    /// Check if the connection is actively processing.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::ProcessingTokens | Self::Draining)
    }
}

/// Runtime phase of the PRELOGIN/TLS/LOGIN7 handshake.
///
/// This tracks which outbound packet type is legal next, per the
/// connection state machine's state table. It is a plain runtime enum,
/// mirroring [`ProtocolState`]'s idiom rather than the type-state layer
/// above, because the handshake runs inside a single `connect()` call and
/// has no compile-time-distinguishable caller-visible states. A violation
/// (sending a packet type the current phase forbids, or a handshake event
/// arriving out of order) surfaces as [`tds_protocol::ProtocolError::ProtocolState`],
/// which `From<tds_protocol::ProtocolError> for Error` classifies as
/// `Error::Protocol` (`ErrorKind::ProtocolError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    /// Nothing sent yet; only PRELOGIN is legal.
    Start,
    /// PRELOGIN sent; awaiting its response.
    SentPrelogin,
    /// TLS handshake in progress; no TDS packet may be written.
    TlsHandshakeStarted,
    /// TLS handshake complete (or not required for this connection);
    /// LOGIN7 is legal.
    TlsHandshakeComplete,
    /// LOGIN7 sent; awaiting LOGINACK and the final DONE.
    SentLogin,
    /// Authenticated; SQLBATCH, RPC, and ATTENTION are legal.
    LoggedIn,
}

impl Default for LoginPhase {
    fn default() -> Self {
        Self::Start
    }
}

impl LoginPhase {
    /// Validate that `packet_type` is legal to send in the current phase,
    /// and advance to the resulting phase if so.
    pub fn advance_for_send(
        &mut self,
        packet_type: tds_protocol::packet::PacketType,
    ) -> std::result::Result<(), tds_protocol::ProtocolError> {
        use tds_protocol::packet::PacketType;

        let next = match (*self, packet_type) {
            (Self::Start, PacketType::PreLogin) => Self::SentPrelogin,
            (Self::TlsHandshakeComplete, PacketType::Tds7Login) => Self::SentLogin,
            (Self::LoggedIn, PacketType::SqlBatch | PacketType::Rpc | PacketType::Attention) => {
                Self::LoggedIn
            }
            _ => {
                return Err(tds_protocol::ProtocolError::ProtocolState(format!(
                    "cannot send {packet_type:?} while in phase {self:?}"
                )));
            }
        };
        *self = next;
        Ok(())
    }

    /// Record that a TLS handshake has started in response to a PRELOGIN
    /// reply that negotiated encryption. Legal only from `SentPrelogin`.
    pub fn begin_tls_handshake(&mut self) -> std::result::Result<(), tds_protocol::ProtocolError> {
        if *self != Self::SentPrelogin {
            return Err(tds_protocol::ProtocolError::ProtocolState(format!(
                "cannot start TLS handshake from phase {self:?}"
            )));
        }
        *self = Self::TlsHandshakeStarted;
        Ok(())
    }

    /// Record that the TLS handshake completed. Legal only from
    /// `TlsHandshakeStarted`.
    pub fn complete_tls_handshake(
        &mut self,
    ) -> std::result::Result<(), tds_protocol::ProtocolError> {
        if *self != Self::TlsHandshakeStarted {
            return Err(tds_protocol::ProtocolError::ProtocolState(format!(
                "cannot complete TLS handshake from phase {self:?}"
            )));
        }
        *self = Self::TlsHandshakeComplete;
        Ok(())
    }

    /// Record that no TLS handshake is needed within the TDS layer: either
    /// the PRELOGIN response negotiated no encryption, or (TDS 8.0 strict
    /// mode) TLS was already established at the transport level before any
    /// TDS packet was sent. Legal only from `SentPrelogin`.
    pub fn skip_tls_handshake(&mut self) -> std::result::Result<(), tds_protocol::ProtocolError> {
        if *self != Self::SentPrelogin {
            return Err(tds_protocol::ProtocolError::ProtocolState(format!(
                "cannot skip TLS handshake from phase {self:?}"
            )));
        }
        *self = Self::TlsHandshakeComplete;
        Ok(())
    }

    /// Record LOGINACK plus the final DONE, completing the handshake.
    /// Legal only from `SentLogin`.
    pub fn complete_login(&mut self) -> std::result::Result<(), tds_protocol::ProtocolError> {
        if *self != Self::SentLogin {
            return Err(tds_protocol::ProtocolError::ProtocolState(format!(
                "cannot complete login from phase {self:?}"
            )));
        }
        *self = Self::LoggedIn;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tds_protocol::packet::PacketType;

    #[test]
    fn encrypted_handshake_reaches_logged_in() {
        let mut phase = LoginPhase::Start;
        phase.advance_for_send(PacketType::PreLogin).unwrap();
        phase.begin_tls_handshake().unwrap();
        phase.complete_tls_handshake().unwrap();
        phase.advance_for_send(PacketType::Tds7Login).unwrap();
        phase.complete_login().unwrap();
        assert_eq!(phase, LoginPhase::LoggedIn);
        phase.advance_for_send(PacketType::SqlBatch).unwrap();
    }

    #[test]
    fn unencrypted_handshake_skips_tls() {
        let mut phase = LoginPhase::Start;
        phase.advance_for_send(PacketType::PreLogin).unwrap();
        phase.skip_tls_handshake().unwrap();
        phase.advance_for_send(PacketType::Tds7Login).unwrap();
        phase.complete_login().unwrap();
        assert_eq!(phase, LoginPhase::LoggedIn);
    }

    #[test]
    fn login_before_prelogin_is_rejected() {
        let mut phase = LoginPhase::Start;
        assert!(phase.advance_for_send(PacketType::Tds7Login).is_err());
        assert_eq!(phase, LoginPhase::Start);
    }

    #[test]
    fn sql_batch_before_logged_in_is_rejected() {
        let mut phase = LoginPhase::Start;
        phase.advance_for_send(PacketType::PreLogin).unwrap();
        assert!(phase.advance_for_send(PacketType::SqlBatch).is_err());
    }

    #[test]
    fn tls_handshake_out_of_order_is_rejected() {
        let mut phase = LoginPhase::Start;
        assert!(phase.begin_tls_handshake().is_err());
        phase.advance_for_send(PacketType::PreLogin).unwrap();
        assert!(phase.complete_tls_handshake().is_err());
    }
}
