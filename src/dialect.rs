//! SQL dialect abstraction for rdbc-pool
//!
//! Per-vendor knowledge, reduced to what the pool itself needs: a cheap
//! liveness-probe query for drivers without a native validity check.

use crate::connection::DatabaseType;

/// Vendor-specific SQL knowledge used by the health probe
pub trait Dialect: Send + Sync {
    /// Get the dialect name
    fn name(&self) -> &'static str;

    /// A minimal query that succeeds on any live connection
    fn test_sql(&self) -> &'static str;
}

/// PostgreSQL dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn test_sql(&self) -> &'static str {
        "SELECT 1"
    }
}

/// MySQL/MariaDB dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn test_sql(&self) -> &'static str {
        "SELECT 1"
    }
}

/// SQL Server dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "SQL Server"
    }

    fn test_sql(&self) -> &'static str {
        "SELECT 1"
    }
}

/// Oracle dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    // Oracle has no bare SELECT.
    fn test_sql(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }
}

/// Fallback dialect for drivers the pool knows nothing about
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "Generic"
    }

    fn test_sql(&self) -> &'static str {
        "SELECT 1"
    }
}

/// Resolve the dialect for a database type
pub fn dialect_for(db: DatabaseType) -> &'static dyn Dialect {
    match db {
        DatabaseType::PostgreSQL => &PostgresDialect,
        DatabaseType::MySQL => &MySqlDialect,
        DatabaseType::SqlServer => &SqlServerDialect,
        DatabaseType::Oracle => &OracleDialect,
        DatabaseType::SQLite | DatabaseType::Unknown => &GenericDialect,
    }
}
