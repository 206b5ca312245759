//! Connection facade for rdbc-pool
//!
//! A checked-out connection behaves like the raw connection underneath,
//! with a handful of intercepted operations: `close()` returns the
//! connection to the pool instead of terminating it, statement creation
//! registers the statement so logical close can release every
//! outstanding cursor, and driver errors pass through a fatal-state
//! check that can force the connection out of circulation.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{PreparedStatement, RawConnection};
use crate::error::{Error, Result};
use crate::pool::SimpleConnectionPool;
use crate::types::{Row, Value};

/// What the idle queue holds: a raw connection plus its pool metadata.
pub(crate) struct PoolEntry {
    pub(crate) raw: Box<dyn RawConnection>,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) force_closed: AtomicBool,
}

impl PoolEntry {
    pub(crate) fn new(raw: Box<dyn RawConnection>) -> Self {
        let now = Instant::now();
        Self {
            raw,
            created_at: now,
            last_used: now,
            force_closed: AtomicBool::new(false),
        }
    }

    /// Age exceeded `max_lifetime` (zero disables the check)
    pub(crate) fn is_lifetime_expired(&self, max_lifetime: Duration) -> bool {
        !max_lifetime.is_zero() && self.created_at.elapsed() > max_lifetime
    }

    /// Untouched longer than `idle_timeout` (zero disables the check)
    pub(crate) fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        !idle_timeout.is_zero() && self.last_used.elapsed() > idle_timeout
    }

    pub(crate) fn is_force_closed(&self) -> bool {
        self.force_closed.load(Ordering::Acquire)
    }
}

/// A connection checked out from the pool.
///
/// Logical close ([`close`](Self::close) or drop) releases the
/// connection back to the pool; the transport is only terminated when
/// the entry is force-closed or evicted.
pub struct PooledConnection {
    entry: Option<PoolEntry>,
    pool: Weak<SimpleConnectionPool>,
    created_at: Instant,
    statements: Mutex<Vec<Arc<dyn PreparedStatement>>>,
}

impl PooledConnection {
    pub(crate) fn new(entry: PoolEntry, pool: Weak<SimpleConnectionPool>) -> Self {
        let created_at = entry.created_at;
        Self {
            entry: Some(entry),
            pool,
            created_at,
            statements: Mutex::new(Vec::new()),
        }
    }

    fn entry(&self) -> Result<&PoolEntry> {
        self.entry.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Classify a driver error; fatal SQLSTATEs take the connection out
    /// of circulation on its next release.
    fn check_error(&self, error: Error) -> Error {
        if error.is_fatal() {
            if let Some(entry) = &self.entry {
                entry.force_closed.store(true, Ordering::Release);
                warn!(
                    sqlstate = error.sqlstate(),
                    "fatal transport error, connection will not be reused"
                );
            }
        }
        error
    }

    /// Execute a statement that modifies data, returns affected row count
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let entry = self.entry()?;
        entry.raw.execute(sql, params).await.map_err(|e| self.check_error(e))
    }

    /// Execute a query that returns rows
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let entry = self.entry()?;
        entry.raw.query(sql, params).await.map_err(|e| self.check_error(e))
    }

    /// Execute a query and return the first row
    pub async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().next())
    }

    /// Prepare a statement; it is tracked and released on logical close
    pub async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        let entry = self.entry()?;
        let statement = entry
            .raw
            .prepare(sql)
            .await
            .map_err(|e| self.check_error(e))?;
        let statement: Arc<dyn PreparedStatement> = Arc::from(statement);
        self.statements.lock().push(Arc::clone(&statement));
        Ok(statement)
    }

    /// Whether logical close has happened
    pub fn is_closed(&self) -> bool {
        self.entry.is_none()
    }

    /// Whether a fatal transport error was observed on this connection
    pub fn is_force_closed(&self) -> bool {
        self.entry.as_ref().is_some_and(PoolEntry::is_force_closed)
    }

    /// False once closed, otherwise the driver's own validity check
    pub async fn is_valid(&self, timeout: Duration) -> bool {
        match &self.entry {
            Some(entry) => entry.raw.is_valid(timeout).await,
            None => false,
        }
    }

    /// When the underlying connection was opened
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the underlying connection was opened
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Logically close the connection, releasing it back to the pool.
    ///
    /// Idempotent. Outstanding statements are closed in reverse
    /// registration order; their errors are swallowed (fatal states
    /// still mark the connection) so the release always happens.
    pub async fn close(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let statements: Vec<_> = self.statements.lock().drain(..).collect();
        close_statements(&entry, statements).await;
        debug!("returning connection to pool");
        release_entry(self.pool.clone(), entry).await;
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("closed", &self.is_closed())
            .field("age", &self.age())
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let statements: Vec<_> = self.statements.lock().drain(..).collect();
        let pool = self.pool.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    close_statements(&entry, statements).await;
                    release_entry(pool, entry).await;
                });
            }
            Err(_) => {
                warn!("pooled connection dropped outside a runtime; cannot release it back");
            }
        }
    }
}

async fn close_statements(entry: &PoolEntry, statements: Vec<Arc<dyn PreparedStatement>>) {
    for statement in statements.into_iter().rev() {
        if let Err(e) = statement.close().await {
            if e.is_fatal() {
                entry.force_closed.store(true, Ordering::Release);
            }
            warn!(error = %e, sql = statement.sql(), "failed to close statement on connection close");
        }
    }
}

async fn release_entry(pool: Weak<SimpleConnectionPool>, entry: PoolEntry) {
    match pool.upgrade() {
        Some(pool) => pool.release(entry).await,
        None => {
            // Pool is gone; nothing to return to.
            let _ = entry.raw.close().await;
        }
    }
}
