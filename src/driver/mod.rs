//! The narrow boundary between the relay and whatever executes SQL.
//!
//! A [`Driver`] is one live backend handle (a connection pool in practice);
//! a [`DriverFactory`] mints fresh handles from retained connection
//! settings, at startup and on every hot-swap.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::coerce::ColumnMeta;
use crate::config::DbConfig;
use crate::error::RelayDbError;
use crate::value::SqlValue;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Raw output of one statement, before any coercion is applied.
#[derive(Debug, Clone, Default)]
pub struct StatementOutput {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<SqlValue>>,
    pub affected_rows: u64,
    pub last_insert_id: Option<u64>,
}

impl StatementOutput {
    /// Output of a row-returning statement.
    #[must_use]
    pub fn rowset(columns: Vec<ColumnMeta>, rows: Vec<Vec<SqlValue>>) -> Self {
        StatementOutput {
            columns,
            rows,
            affected_rows: 0,
            last_insert_id: None,
        }
    }

    /// Output of a DML statement.
    #[must_use]
    pub fn dml(affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        StatementOutput {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows,
            last_insert_id,
        }
    }
}

/// Failure reported by a driver for one submission.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub kind: DriverErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Worth retrying: connection drops, pool churn, lock timeouts.
    Transient,
    /// Retrying cannot help: bad SQL, constraint violations, access denied.
    Permanent,
}

impl DriverError {
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        DriverError {
            message: message.into(),
            kind: DriverErrorKind::Transient,
        }
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        DriverError {
            message: message.into(),
            kind: DriverErrorKind::Permanent,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DriverErrorKind::Transient)
    }
}

/// One live backend handle.
///
/// Statements arrive fully rendered; the driver never sees placeholders or
/// parameter bags. Implementations must be safe to share across tasks.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Submit one statement and collect its complete result.
    async fn run(&self, sql: &str) -> Result<StatementOutput, DriverError>;

    /// Close the handle, releasing its connections. In-flight work holding
    /// a clone of the handle is allowed to finish first by the caller's
    /// grace period, not by this method.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Builds fresh driver handles from connection settings.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Open a new handle against the configured backend.
    ///
    /// # Errors
    ///
    /// Any connection-establishment failure, surfaced as `RelayDbError`.
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn Driver>, RelayDbError>;
}
