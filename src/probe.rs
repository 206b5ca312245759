//! Admission-time liveness probe for rdbc-pool
//!
//! Every connection passes the probe once, before it enters the idle
//! queue. The probe never raises: any failure or timeout is logged and
//! reported as "not alive". It keeps no reference to the connection
//! beyond the check.

use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::connection::RawConnection;
use crate::dialect::Dialect;

/// Validates raw connections before the pool admits them.
pub struct HealthProbe {
    enabled: bool,
    timeout: Duration,
    test_sql: Option<String>,
    dialect: &'static dyn Dialect,
    // Dialect-supplied probe query, resolved once per pool.
    resolved_sql: OnceLock<String>,
}

impl HealthProbe {
    /// Build a probe from the pool configuration and resolved dialect
    pub fn new(config: &PoolConfig, dialect: &'static dyn Dialect) -> Self {
        Self {
            enabled: config.test_connection,
            timeout: config.test_timeout,
            test_sql: config.test_sql.clone(),
            dialect,
            resolved_sql: OnceLock::new(),
        }
    }

    /// Whether the probe is active at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check a raw connection.
    ///
    /// Uses the driver's native validity check when it advertises one;
    /// otherwise runs the configured (or dialect-supplied) test query
    /// under the probe budget.
    pub async fn check(&self, raw: &dyn RawConnection) -> bool {
        if !self.enabled {
            return true;
        }

        let alive = if raw.supports_is_valid() {
            raw.is_valid(self.timeout).await
        } else {
            self.check_with_query(raw).await
        };

        debug!(alive, "liveness probe finished");
        alive
    }

    async fn check_with_query(&self, raw: &dyn RawConnection) -> bool {
        let sql = match &self.test_sql {
            Some(sql) => sql.as_str(),
            None => self
                .resolved_sql
                .get_or_init(|| self.dialect.test_sql().to_string()),
        };

        match tokio::time::timeout(self.timeout, raw.query(sql, &[])).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, sql, "liveness probe query failed");
                false
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, sql, "liveness probe timed out");
                false
            }
        }
    }
}
