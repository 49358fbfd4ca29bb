//! Pool error types.

use thiserror::Error;

/// Boxed error returned by a [`Connector`](crate::Connector).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while creating, lending or closing pooled connections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// The connection driver could not be loaded.
    #[error("driver `{driver}` could not be loaded: {source}")]
    PrerequisiteMissing {
        /// Driver identifier from the configuration.
        driver: String,
        /// Underlying connector error.
        #[source]
        source: BoxError,
    },

    /// A new connection could not be established.
    #[error("failed to connect to {target}: {source}")]
    ConnectFailed {
        /// Connection target from the configuration.
        target: String,
        /// Underlying connector error.
        #[source]
        source: BoxError,
    },

    /// Every connection slot is in use and none is idle.
    #[error("connection pool is exhausted ({max} connections in use)")]
    PoolExhausted {
        /// Maximum number of live connections.
        max: u32,
    },

    /// A connection failed to close cleanly.
    #[error("failed to close connection {id}: {source}")]
    CloseFailed {
        /// Pool-assigned connection ID.
        id: u64,
        /// Underlying connector error.
        #[source]
        source: BoxError,
    },

    /// The connection was checked out from a different pool.
    #[error("connection {id} does not belong to this pool")]
    ForeignConnection {
        /// Pool-assigned connection ID.
        id: u64,
    },
}

impl PoolError {
    /// Check if the caller may reasonably retry the operation later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::ConnectFailed { .. })
    }
}
