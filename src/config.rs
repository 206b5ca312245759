//! Pool configuration for rdbc-pool
//!
//! `PoolConfig` is immutable once the pool is constructed. It can be
//! built programmatically with the `with_*` methods, or bound from a
//! string property bag (`from_properties`) using the classic JDBC-style
//! key names; unknown keys are logged and ignored.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::connection::ConnectionConfig;
use crate::error::{Error, Result};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Driver identifier used to resolve a registered factory
    pub driver: String,
    /// Connection configuration handed to the factory
    pub connection: ConnectionConfig,
    /// Connections created at construction
    pub init_size: usize,
    /// Floor the janitor refills to
    pub min_size: usize,
    /// Ceiling for total connections
    pub max_size: usize,
    /// Connections added per growth attempt
    pub increment: usize,
    /// Attempts per connection construction
    pub retries: u32,
    /// Sleep between construction retries
    pub retry_interval: Duration,
    /// Wall-clock budget for one acquire call
    pub acquire_timeout: Duration,
    /// Idle time before the janitor evicts (zero disables)
    pub idle_timeout: Duration,
    /// Connection age before recycling (zero disables)
    pub max_lifetime: Duration,
    /// Whether to validate connections at admission
    pub test_connection: bool,
    /// Probe query; falls back to the dialect's when unset
    pub test_sql: Option<String>,
    /// Per-probe budget
    pub test_timeout: Duration,
    /// Janitor cadence (zero disables the janitor)
    pub janitor_period: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            connection: ConnectionConfig::default(),
            init_size: 1,
            min_size: 3,
            max_size: 10,
            increment: 1,
            retries: 2,
            retry_interval: Duration::from_millis(750),
            acquire_timeout: Duration::from_millis(5000),
            idle_timeout: Duration::from_millis(600_000),
            max_lifetime: Duration::from_millis(1_800_000),
            test_connection: true,
            test_sql: None,
            test_timeout: Duration::from_millis(500),
            janitor_period: Duration::from_millis(30_000),
        }
    }
}

impl PoolConfig {
    /// Create a configuration for a driver and URL
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            connection: ConnectionConfig::new(url),
            ..Default::default()
        }
    }

    /// Set login user
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.connection.username = username.into();
        self
    }

    /// Set login password
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.connection.password = Some(password.into());
        self
    }

    /// Set initial fill size
    pub fn with_init_size(mut self, size: usize) -> Self {
        self.init_size = size;
        self
    }

    /// Set minimum pool size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set maximum pool size
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set connections added per growth attempt
    pub fn with_increment(mut self, increment: usize) -> Self {
        self.increment = increment;
        self
    }

    /// Set construction retry count and interval
    pub fn with_retries(mut self, retries: u32, interval: Duration) -> Self {
        self.retries = retries;
        self.retry_interval = interval;
        self
    }

    /// Set acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set idle timeout (zero disables)
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set maximum connection lifetime (zero disables)
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Enable/disable the admission probe
    pub fn with_test_connection(mut self, test: bool) -> Self {
        self.test_connection = test;
        self
    }

    /// Set an explicit probe query
    pub fn with_test_sql(mut self, sql: impl Into<String>) -> Self {
        self.test_sql = Some(sql.into());
        self
    }

    /// Set the per-probe budget
    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    /// Set the janitor cadence (zero disables)
    pub fn with_janitor_period(mut self, period: Duration) -> Self {
        self.janitor_period = period;
        self
    }

    /// Check required keys and size invariants.
    pub fn validate(&self) -> Result<()> {
        if self.driver.is_empty() {
            return Err(Error::config_missing("driverClassName"));
        }
        if self.connection.url.is_empty() {
            return Err(Error::config_missing("url"));
        }
        if self.connection.username.is_empty() {
            return Err(Error::config_missing("username"));
        }

        if self.max_size == 0 {
            return Err(Error::config("maxSize must be at least 1"));
        }
        if self.init_size > self.max_size {
            return Err(Error::config(format!(
                "initSize ({}) must not exceed maxSize ({})",
                self.init_size, self.max_size
            )));
        }
        if self.init_size > self.min_size {
            // Legitimate for warm-start pools that are allowed to drain
            // to zero (minSize 0), so not a hard error.
            warn!(
                init_size = self.init_size,
                min_size = self.min_size,
                "initSize exceeds minSize; the janitor may shrink the pool below its initial fill"
            );
        }
        if self.min_size > self.max_size {
            return Err(Error::config(format!(
                "minSize ({}) must not exceed maxSize ({})",
                self.min_size, self.max_size
            )));
        }
        if self.increment == 0 {
            return Err(Error::config("increment must be at least 1"));
        }
        Ok(())
    }

    /// Bind a configuration from a string property bag.
    ///
    /// Recognizes the JDBC-style key names; unknown keys and unparseable
    /// numerics are logged and ignored, keeping the defaults. The result
    /// is validated before being returned.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in properties {
            match key.as_str() {
                "driverClassName" => config.driver = value.clone(),
                "url" => config.connection.url = value.clone(),
                "username" => config.connection.username = value.clone(),
                "password" => config.connection.password = Some(value.clone()),
                "initSize" => parse_into(key, value, &mut config.init_size),
                "minSize" => parse_into(key, value, &mut config.min_size),
                "maxSize" => parse_into(key, value, &mut config.max_size),
                "increment" => parse_into(key, value, &mut config.increment),
                "retries" => parse_into(key, value, &mut config.retries),
                "retryInterval" => parse_millis(key, value, &mut config.retry_interval),
                "getConnectionTimeout" => parse_millis(key, value, &mut config.acquire_timeout),
                "inactiveTimeout" => parse_millis(key, value, &mut config.idle_timeout),
                "maxLifetime" => parse_millis(key, value, &mut config.max_lifetime),
                "testConnection" => match value.as_str() {
                    "true" => config.test_connection = true,
                    "false" => config.test_connection = false,
                    _ => warn!(key = %key, value = %value, "property is not a boolean, ignoring"),
                },
                "testSql" => config.test_sql = Some(value.clone()),
                "testTimeout" => parse_millis(key, value, &mut config.test_timeout),
                _ => warn!(key = %key, value = %value, "unsupported pool property, ignoring"),
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, target: &mut T) {
    match value.parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key = %key, value = %value, "property is not a number, ignoring"),
    }
}

fn parse_millis(key: &str, value: &str, target: &mut Duration) {
    match value.parse::<u64>() {
        Ok(ms) => *target = Duration::from_millis(ms),
        Err(_) => warn!(key = %key, value = %value, "property is not a number, ignoring"),
    }
}
