//! Shared mock driver for rdbc-pool tests
//!
//! The factory and every connection it opens share a `MockState`, so
//! tests can inject failures and observe driver-side effects while the
//! connections live inside the pool.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rdbc_pool::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared, test-visible driver state.
pub struct MockState {
    /// Connections opened so far (also the id sequence)
    pub opened: AtomicUsize,
    /// Raw connections terminated so far
    pub closed: AtomicUsize,
    /// Fail this many upcoming open() calls
    pub open_failures: AtomicUsize,
    /// Result of the native validity check
    pub alive: AtomicBool,
    /// Error returned by the next execute/query on any connection
    pub next_error: Mutex<Option<Error>>,
    /// SQL of every statement close, in close order
    pub stmt_close_log: Mutex<Vec<String>>,
    /// Statement SQL -> error its close() should return
    pub stmt_close_errors: Mutex<HashMap<String, Error>>,
}

impl MockState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            open_failures: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            next_error: Mutex::new(None),
            stmt_close_log: Mutex::new(Vec::new()),
            stmt_close_errors: Mutex::new(HashMap::new()),
        })
    }

    /// Make the next execute/query fail with `error`.
    pub fn inject_error(&self, error: Error) {
        *self.next_error.lock() = Some(error);
    }

    /// Make close() of the statement prepared from `sql` fail.
    pub fn inject_stmt_close_error(&self, sql: &str, error: Error) {
        self.stmt_close_errors.lock().insert(sql.to_string(), error);
    }
}

pub struct MockStatement {
    sql: String,
    state: Arc<MockState>,
    fail_close_with: Mutex<Option<Error>>,
}

#[async_trait]
impl PreparedStatement for MockStatement {
    async fn execute(&self, _params: &[Value]) -> Result<u64> {
        Ok(1)
    }

    async fn query(&self, _params: &[Value]) -> Result<Vec<Row>> {
        Ok(vec![])
    }

    fn sql(&self) -> &str {
        &self.sql
    }

    async fn close(&self) -> Result<()> {
        self.state.stmt_close_log.lock().push(self.sql.clone());
        match self.fail_close_with.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

pub struct MockConnection {
    pub id: usize,
    state: Arc<MockState>,
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
        match self.state.next_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(1),
        }
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        match self.state.next_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(vec![Row::new(
                vec!["result".into()],
                vec![Value::Int32(1)],
            )]),
        }
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let fail = self.state.stmt_close_errors.lock().remove(sql);
        Ok(Box::new(MockStatement {
            sql: sql.to_string(),
            state: Arc::clone(&self.state),
            fail_close_with: Mutex::new(fail),
        }))
    }

    async fn is_valid(&self, _timeout: Duration) -> bool {
        self.state.alive.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> (Arc<Self>, Arc<MockState>) {
        let state = MockState::new();
        (
            Arc::new(Self {
                state: Arc::clone(&state),
            }),
            state,
        )
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn RawConnection>> {
        let failures = self.state.open_failures.load(Ordering::Acquire);
        if failures > 0 {
            self.state.open_failures.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::driver("mock driver refused to connect"));
        }
        let id = self.state.opened.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(MockConnection {
            id,
            state: Arc::clone(&self.state),
        }))
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Unknown
    }
}

/// Baseline configuration for pool tests: empty pool, probe and janitor
/// off, short retry interval. Tests override what they exercise.
pub fn test_config() -> PoolConfig {
    PoolConfig::new("mock", "mock://localhost/db")
        .with_username("tester")
        .with_init_size(0)
        .with_min_size(0)
        .with_max_size(4)
        .with_retries(2, Duration::from_millis(10))
        .with_acquire_timeout(Duration::from_millis(500))
        .with_test_connection(false)
        .with_janitor_period(Duration::ZERO)
}
