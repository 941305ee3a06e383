//! Pool error types.

use mssql_client::ErrorKind;
use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to acquire a connection within the configured `connection_timeout`.
    #[error("timed out waiting for a connection")]
    Timeout,

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(String),

    /// Connection is unhealthy.
    #[error("connection health check failed: {0}")]
    UnhealthyConnection(String),

    /// Connection reset failed.
    #[error("connection reset failed: {0}")]
    ResetFailed(String),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),

    /// Maximum connections reached.
    #[error("maximum connections ({max}) reached")]
    MaxConnectionsReached {
        /// Maximum allowed connections.
        max: u32,
    },

    /// Connection validation failed.
    #[error("connection validation failed: {0}")]
    ValidationFailed(String),
}

impl PoolError {
    /// Classify this error for retry decisions, mirroring
    /// `mssql_client::Error::kind()`. Lives here (rather than as a
    /// `From<PoolError> for mssql_client::Error` impl on the other side)
    /// because `mssql-pool` depends on `mssql-client`, not the reverse.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout => ErrorKind::Timeout,
            Self::PoolClosed => ErrorKind::PoolClosed,
            Self::ConnectionCreation(_)
            | Self::UnhealthyConnection(_)
            | Self::ResetFailed(_)
            | Self::MaxConnectionsReached { .. }
            | Self::ValidationFailed(_) => ErrorKind::Transient,
            Self::Configuration(_) => ErrorKind::InvalidArgument,
        }
    }
}
