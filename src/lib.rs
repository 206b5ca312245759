//! # rdbc-pool
//!
//! A bounded async connection pool for RDBC-style database drivers.
//!
//! The pool is a concurrent cache of long-lived connections: opening a
//! transport plus an authentication handshake is expensive, so the pool
//! amortises it across many short logical uses while enforcing bounds
//! on resource consumption, liveness and age.
//!
//! ## Features
//!
//! - **Bounded acquisition**: callers wait with a deadline; the pool
//!   grows on demand up to a ceiling, and fails cleanly on timeout
//! - **Connection facade**: checked-out connections intercept `close()`
//!   to return to the pool, and track child statements so logical close
//!   releases every outstanding cursor
//! - **Lifecycle policing**: a background janitor evicts idle and aged
//!   connections and refills the pool to its floor
//! - **Fatal-error classification**: SQLSTATEs that signal a dead
//!   transport (class `08`, server shutdown codes) force a connection
//!   out of circulation
//! - **Driver agnostic**: drivers plug in through a `ConnectionFactory`
//!   registry; per-vendor knowledge is limited to a liveness query
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rdbc_pool::prelude::*;
//!
//! register_driver("postgres", Arc::new(PgConnectionFactory));
//!
//! let pool = SimpleConnectionPool::new(
//!     PoolConfig::new("postgres", "postgres://localhost/db")
//!         .with_username("app")
//!         .with_password("secret")
//!         .with_min_size(2)
//!         .with_max_size(10),
//! )
//! .await?;
//!
//! let mut conn = pool.acquire().await?;
//! let rows = conn.query("SELECT id FROM users", &[]).await?;
//! conn.close().await; // back to the pool, not terminated
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod types;

mod janitor;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{is_fatal_sqlstate, Error, ErrorCategory, Result};

    // Value types
    pub use crate::types::{Row, Value};

    // Connection traits and config
    pub use crate::connection::{
        driver, register_driver, ConnectionConfig, ConnectionFactory, DatabaseType,
        PreparedStatement, RawConnection,
    };

    // Pool types
    pub use crate::config::PoolConfig;
    pub use crate::pool::{AtomicPoolStats, PoolStats, SimpleConnectionPool};
    pub use crate::probe::HealthProbe;
    pub use crate::proxy::PooledConnection;

    // Dialect types
    pub use crate::dialect::{
        dialect_for, Dialect, GenericDialect, MySqlDialect, OracleDialect, PostgresDialect,
        SqlServerDialect,
    };
}

// Re-export commonly used items at crate root
pub use config::PoolConfig;
pub use connection::DatabaseType;
pub use error::{Error, Result};
pub use pool::SimpleConnectionPool;
pub use proxy::PooledConnection;
pub use types::Value;
