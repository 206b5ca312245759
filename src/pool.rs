//! Connection pool for rdbc-pool
//!
//! A bounded, concurrent cache of long-lived database connections:
//! - Callers block with a deadline for an idle connection
//! - The pool grows on demand, up to a ceiling, behind a single-flight
//!   growth lock with bounded retries
//! - A background janitor evicts idle/aged connections and refills to
//!   the configured floor
//!
//! # Example
//!
//! ```rust,ignore
//! use rdbc_pool::prelude::*;
//!
//! let pool = SimpleConnectionPool::with_factory(
//!     PoolConfig::new("postgres", "postgres://localhost/db")
//!         .with_username("app")
//!         .with_max_size(10),
//!     Arc::new(PgConnectionFactory),
//! ).await?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.execute("INSERT INTO events (kind) VALUES ($1)", &[Value::from("ping")]).await?;
//! conn.close().await; // back to the pool
//! ```

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex as AsyncMutex, OnceCell, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::connection::{self, ConnectionFactory};
use crate::dialect::dialect_for;
use crate::error::{Error, Result};
use crate::janitor;
use crate::probe::HealthProbe;
use crate::proxy::{PoolEntry, PooledConnection};

/// Pool statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections opened over the pool's lifetime
    pub connections_created: u64,
    /// Connections terminated over the pool's lifetime
    pub connections_closed: u64,
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Acquire calls that timed out
    pub exhaustions: u64,
    /// Connections rejected by the admission probe
    pub probe_failures: u64,
}

/// Atomic pool statistics for concurrent updates
#[derive(Debug, Default)]
pub struct AtomicPoolStats {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    acquisitions: AtomicU64,
    exhaustions: AtomicU64,
    probe_failures: AtomicU64,
}

impl AtomicPoolStats {
    /// Create new atomic stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection creation
    pub fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection termination
    pub fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful acquisition
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acquire timeout
    pub fn record_exhausted(&self) {
        self.exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission probe failure
    pub fn record_probe_failure(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current stats
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
        }
    }
}

/// A bounded concurrent connection pool.
///
/// Acquisition waits on the idle queue with a deadline; the timed take
/// is a semaphore whose permit count always equals the queue length, so
/// a granted permit guarantees an entry and a cancelled waiter consumes
/// nothing.
pub struct SimpleConnectionPool {
    /// Pool configuration
    config: PoolConfig,
    /// Connection factory resolved from the driver registry
    factory: Arc<dyn ConnectionFactory>,
    /// Admission-time liveness probe
    probe: HealthProbe,
    /// Idle connections, FIFO
    idle: Mutex<VecDeque<PoolEntry>>,
    /// One permit per entry in `idle`
    idle_permits: Semaphore,
    /// All live connections (idle + checked out)
    total: AtomicUsize,
    /// Entries currently in `idle`
    idle_count: AtomicUsize,
    /// Last construction failure, for diagnostics
    latest_error: RwLock<Option<Arc<Error>>>,
    /// Serializes growth so exhausted acquirers cannot overshoot maxSize
    grow_lock: AsyncMutex<()>,
    /// Statistics
    stats: AtomicPoolStats,
    /// Shutdown flag
    shutdown: AtomicBool,
    /// Self reference handed to checked-out connections
    self_ref: OnceCell<Weak<Self>>,
    /// Janitor task, when enabled
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl SimpleConnectionPool {
    /// Create a pool, resolving the factory from the driver registry.
    pub async fn new(config: PoolConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let factory = connection::driver(&config.driver)?;
        Self::with_factory(config, factory).await
    }

    /// Create a pool from a string property bag.
    pub async fn from_properties(properties: &HashMap<String, String>) -> Result<Arc<Self>> {
        let config = PoolConfig::from_properties(properties)?;
        Self::new(config).await
    }

    /// Create a pool with an explicit factory.
    ///
    /// Initializes with `init_size` connections, best effort: a
    /// shortfall is logged, not fatal.
    pub async fn with_factory(
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        info!(driver = %config.driver, connection = ?config.connection, "starting connection pool");

        let probe = HealthProbe::new(&config, dialect_for(factory.database_type()));
        let pool = Arc::new(Self {
            idle: Mutex::new(VecDeque::with_capacity(config.max_size)),
            idle_permits: Semaphore::new(0),
            total: AtomicUsize::new(0),
            idle_count: AtomicUsize::new(0),
            latest_error: RwLock::new(None),
            grow_lock: AsyncMutex::new(()),
            stats: AtomicPoolStats::new(),
            shutdown: AtomicBool::new(false),
            self_ref: OnceCell::new(),
            janitor: Mutex::new(None),
            probe,
            factory,
            config,
        });
        let _ = pool.self_ref.set(Arc::downgrade(&pool));

        for _ in 0..pool.config.init_size {
            pool.add_one().await;
        }
        if pool.total_connections() < pool.config.init_size {
            error!(
                total = pool.total_connections(),
                init_size = pool.config.init_size,
                latest_error = ?pool.latest_error(),
                "initial pool fill fell short"
            );
        }

        if !pool.config.janitor_period.is_zero() {
            let handle = janitor::spawn(Arc::downgrade(&pool), pool.config.janitor_period);
            *pool.janitor.lock() = Some(handle);
        }

        info!(
            total = pool.total_connections(),
            "connection pool started"
        );
        Ok(pool)
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquire a connection, waiting up to the configured timeout.
    ///
    /// When the idle queue is empty the pool attempts to grow first;
    /// growth failures do not abort the call, the caller still waits
    /// out its deadline. A connection past its maximum lifetime is
    /// recycled on checkout and the wait continues with the remaining
    /// budget.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        if self.is_shut_down() {
            return Err(Error::exhausted("pool is shut down"));
        }

        let deadline = Instant::now() + self.config.acquire_timeout;
        debug!(
            idle = self.idle_connections(),
            total = self.total_connections(),
            "acquiring connection"
        );

        loop {
            if self.idle_count.load(Ordering::Acquire) == 0 {
                self.try_grow().await;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let permit = match tokio::time::timeout(remaining, self.idle_permits.acquire()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(Error::exhausted("pool is shut down")),
                Err(_) => {
                    self.stats.record_exhausted();
                    return Err(self.exhausted_error());
                }
            };
            // The permit stands for the dequeued entry; it is restored
            // when the entry is re-enqueued.
            permit.forget();

            let Some(entry) = self.idle.lock().pop_front() else {
                continue;
            };
            self.idle_count.fetch_sub(1, Ordering::AcqRel);

            if entry.is_lifetime_expired(self.config.max_lifetime) {
                debug!("connection exceeded max lifetime on checkout, recycling");
                self.discard(entry).await;
                continue;
            }

            self.stats.record_acquisition();
            return Ok(PooledConnection::new(entry, self.weak_ref()));
        }
    }

    /// Return a connection to the pool.
    ///
    /// Invoked by the facade's close/drop. Force-closed entries and
    /// releases after shutdown terminate the transport instead.
    pub(crate) async fn release(&self, mut entry: PoolEntry) {
        if self.is_shut_down() {
            debug!("pool is shut down, closing released connection");
            self.discard(entry).await;
            return;
        }
        if entry.is_force_closed() {
            debug!("connection was force-closed, terminating");
            self.discard(entry).await;
            return;
        }

        entry.last_used = Instant::now();
        let overflow = {
            let mut idle = self.idle.lock();
            if idle.len() >= self.config.max_size {
                Some(entry)
            } else {
                idle.push_back(entry);
                None
            }
        };
        if let Some(entry) = overflow {
            warn!("idle queue full on release, closing connection");
            self.discard(entry).await;
            return;
        }
        self.idle_count.fetch_add(1, Ordering::AcqRel);
        self.idle_permits.add_permits(1);
    }

    /// Grow the pool by up to `increment` connections, single-flight.
    pub(crate) async fn try_grow(&self) {
        let _guard = self.grow_lock.lock().await;
        for _ in 0..self.config.increment {
            if self.total.load(Ordering::Acquire) >= self.config.max_size {
                break;
            }
            self.add_one().await;
        }
    }

    /// Open, probe and publish one connection. Bounded by `retries`
    /// attempts; failures are recorded, never raised.
    async fn add_one(&self) -> bool {
        let mut attempt: u32 = 0;
        loop {
            match self.factory.open(&self.config.connection).await {
                Ok(raw) => {
                    if self.probe.check(raw.as_ref()).await {
                        // Publish order: the count rises before the
                        // entry becomes takeable, so idle_count <= total
                        // holds for every observer.
                        self.total.fetch_add(1, Ordering::AcqRel);
                        self.idle.lock().push_back(PoolEntry::new(raw));
                        self.idle_count.fetch_add(1, Ordering::AcqRel);
                        self.idle_permits.add_permits(1);
                        self.stats.record_created();
                        debug!(
                            idle = self.idle_connections(),
                            total = self.total_connections(),
                            "connection added to pool"
                        );
                        return true;
                    }
                    self.stats.record_probe_failure();
                    warn!("new connection failed the liveness probe");
                    let _ = raw.close().await;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        idle = self.idle_connections(),
                        total = self.total_connections(),
                        "could not open connection"
                    );
                    *self.latest_error.write() = Some(Arc::new(e));
                }
            }

            attempt += 1;
            if attempt >= self.config.retries {
                warn!(
                    retries = self.config.retries,
                    "reached maximum retries, giving up on this connection"
                );
                return false;
            }
            tokio::time::sleep(self.config.retry_interval).await;
        }
    }

    /// Terminate an entry's transport and drop it from the accounting.
    pub(crate) async fn discard(&self, entry: PoolEntry) {
        self.total.fetch_sub(1, Ordering::AcqRel);
        self.stats.record_closed();
        if let Err(e) = entry.raw.close().await {
            warn!(error = %e, "could not close connection");
        }
    }

    /// One janitor pass over the idle queue.
    ///
    /// Examines at most the snapshot count so foreground acquirers are
    /// never starved; survivors go to the back and are revisited on the
    /// next tick.
    pub(crate) async fn sweep_idle(&self) {
        let snapshot = self.idle_count.load(Ordering::Acquire);
        for _ in 0..snapshot {
            let Ok(permit) = self.idle_permits.try_acquire() else {
                break;
            };
            permit.forget();
            let Some(entry) = self.idle.lock().pop_front() else {
                break;
            };
            self.idle_count.fetch_sub(1, Ordering::AcqRel);

            if entry.is_idle_expired(self.config.idle_timeout)
                || entry.is_lifetime_expired(self.config.max_lifetime)
            {
                debug!(
                    idle = self.idle_connections(),
                    total = self.total_connections(),
                    "evicting expired idle connection"
                );
                self.discard(entry).await;
            } else {
                self.idle.lock().push_back(entry);
                self.idle_count.fetch_add(1, Ordering::AcqRel);
                self.idle_permits.add_permits(1);
            }
        }
    }

    /// Drain the idle queue, terminating every entry.
    ///
    /// Checked-out connections are unaffected; they return to the pool
    /// normally on release.
    pub async fn shutdown_idle(&self) {
        loop {
            let Ok(permit) = self.idle_permits.try_acquire() else {
                break;
            };
            permit.forget();
            let Some(entry) = self.idle.lock().pop_front() else {
                break;
            };
            self.idle_count.fetch_sub(1, Ordering::AcqRel);
            self.discard(entry).await;
        }
    }

    /// Shut the pool down.
    ///
    /// Subsequent acquires fail fast, the janitor stops, idle entries
    /// are terminated, and checked-out connections are terminated when
    /// their owners release them.
    pub async fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down connection pool");
        if let Some(handle) = self.janitor.lock().take() {
            handle.abort();
        }
        self.shutdown_idle().await;
        self.idle_permits.close();
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Connections currently checked out
    pub fn active_connections(&self) -> usize {
        self.config
            .max_size
            .min(self.total_connections().saturating_sub(self.idle_connections()))
    }

    /// Connections currently idle
    pub fn idle_connections(&self) -> usize {
        self.idle_count.load(Ordering::Acquire)
    }

    /// All live connections, idle and checked out
    pub fn total_connections(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Last connection construction failure, if any
    pub fn latest_error(&self) -> Option<Arc<Error>> {
        self.latest_error.read().clone()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }

    fn weak_ref(&self) -> Weak<Self> {
        self.self_ref.get().cloned().unwrap_or_default()
    }

    fn exhausted_error(&self) -> Error {
        let idle = self.idle_connections();
        let total = self.total_connections();
        let mut message = format!(
            "no connection became available within {}ms, idle={}/{}",
            self.config.acquire_timeout.as_millis(),
            idle,
            total
        );
        if let Some(cause) = self.latest_error() {
            message.push_str(&format!(", latest error: {cause}"));
        }
        Error::exhausted(message)
    }
}

impl std::fmt::Debug for SimpleConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleConnectionPool")
            .field("driver", &self.config.driver)
            .field("idle", &self.idle_connections())
            .field("total", &self.total_connections())
            .field("max_size", &self.config.max_size)
            .field("shutdown", &self.is_shut_down())
            .finish()
    }
}
