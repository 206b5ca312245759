//! Error types for rdbc-pool
//!
//! Provides granular error classification for pool management:
//! - Retriable errors (driver, timeout, pool exhaustion)
//! - Fatal transport errors, recognized by SQLSTATE, that force a
//!   pooled connection out of circulation

use std::fmt;
use thiserror::Error;

/// Result type for rdbc-pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// SQLSTATE values that indicate the server connection is gone for good.
///
/// Any state in the `08` connection-exception class is treated the same
/// way; these are the vendor codes outside that class that still mean
/// "do not reuse this connection".
const FATAL_SQLSTATES: [&str; 4] = [
    "57P01", // admin shutdown
    "57P02", // crash shutdown
    "57P03", // cannot connect now
    "01002", // SQL92 disconnect error
];

/// Whether an SQLSTATE marks the transport as unusable.
pub fn is_fatal_sqlstate(state: &str) -> bool {
    state.starts_with("08") || FATAL_SQLSTATES.contains(&state)
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Driver/connect failures (retriable)
    Driver,
    /// SQL execution errors
    Sql,
    /// Timeout errors (retriable)
    Timeout,
    /// Configuration error
    Configuration,
    /// Pool exhausted (retriable with backoff)
    PoolExhausted,
    /// Use of a connection after logical close
    ClosedConnection,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Driver | Self::Timeout | Self::PoolExhausted)
    }
}

/// Main error type for rdbc-pool
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration key was absent
    #[error("missing required configuration key: {key}")]
    ConfigMissing {
        /// The absent key
        key: String,
    },

    /// Configuration values violate the pool invariants
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// What was violated
        message: String,
    },

    /// The driver could not open a connection
    #[error("driver error: {message}")]
    Driver {
        /// Driver-reported failure
        message: String,
        /// Underlying cause, when the driver surfaced one
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An SQL operation failed
    #[error("sql error: {message}")]
    Sql {
        /// Server-reported failure
        message: String,
        /// Five-character SQLSTATE, when the server supplied one
        sqlstate: Option<String>,
    },

    /// No connection could be handed out within the acquire deadline
    #[error("pool exhausted: {message}")]
    PoolExhausted {
        /// Counters and latest construction error for diagnosis
        message: String,
    },

    /// The connection was used after its logical close
    #[error("connection is closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout {
        /// What timed out
        message: String,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigMissing { .. } | Self::ConfigInvalid { .. } => ErrorCategory::Configuration,
            Self::Driver { .. } => ErrorCategory::Driver,
            Self::Sql { .. } => ErrorCategory::Sql,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::ConnectionClosed => ErrorCategory::ClosedConnection,
            Self::Timeout { .. } => ErrorCategory::Timeout,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// The SQLSTATE attached to this error, if any
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Sql { sqlstate, .. } => sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Whether this error marks the underlying transport as unusable.
    ///
    /// A connection that reported a fatal state must never re-enter the
    /// idle queue.
    pub fn is_fatal(&self) -> bool {
        self.sqlstate().is_some_and(is_fatal_sqlstate)
    }

    /// Create a driver error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
            source: None,
        }
    }

    /// Create a driver error with source
    pub fn driver_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Driver {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an SQL error without a state code
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
            sqlstate: None,
        }
    }

    /// Create an SQL error carrying a server SQLSTATE
    pub fn sql_state(message: impl Into<String>, sqlstate: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
            sqlstate: Some(sqlstate.into()),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Create a missing-configuration error
    pub fn config_missing(key: impl Into<String>) -> Self {
        Self::ConfigMissing { key: key.into() }
    }

    /// Create a pool-exhausted error
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Sql => write!(f, "sql"),
            Self::Timeout => write!(f, "timeout"),
            Self::Configuration => write!(f, "configuration"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::ClosedConnection => write!(f, "closed_connection"),
            Self::Other => write!(f, "other"),
        }
    }
}
