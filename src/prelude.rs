//! Convenient imports for common functionality.
//!
//! Re-exports the types most callers touch, so a single `use` line is
//! enough to drive the relay.

pub use crate::config::DbConfig;
pub use crate::driver::{
    Driver, DriverError, DriverErrorKind, DriverFactory, StatementOutput,
};
pub use crate::error::RelayDbError;
pub use crate::executor::{RetryPolicy, TimingOptions};
pub use crate::pool::PoolManager;
pub use crate::relay::MysqlRelay;
pub use crate::render::{ValueEscaper, render_template};
pub use crate::results::{ResultSet, Row};
pub use crate::settings::RelaySettings;
pub use crate::value::{Params, SqlValue};

#[cfg(feature = "mysql")]
pub use crate::driver::mysql::{MysqlDriver, MysqlDriverFactory, MysqlEscaper};
