use thiserror::Error;

use crate::driver::DriverError;

/// Errors surfaced to callers of the relay.
///
/// Transient driver failures never appear here; the executor absorbs them
/// until retries are exhausted, at which point they arrive wrapped in
/// [`RelayDbError::QueryFailed`].
#[derive(Debug, Error)]
pub enum RelayDbError {
    #[cfg(feature = "mysql")]
    #[error(transparent)]
    MysqlError(#[from] mysql_async::Error),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query failed after {attempts} attempt(s): {source}")]
    QueryFailed {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("Invalid date in column `{column}`: {value}")]
    InvalidDate { column: String, value: String },
}

impl RelayDbError {
    /// True when the error is the startup-fatal connection string failure.
    #[must_use]
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, RelayDbError::InvalidConnectionString(_))
    }

    /// Attempt count for terminal query failures, if this is one.
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RelayDbError::QueryFailed { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
