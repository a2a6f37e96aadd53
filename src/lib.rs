//! Resilient query layer over a MySQL connection pool.
//!
//! Callers hand the relay `@name`-templated SQL and a parameter bag; the
//! relay renders the bag into driver-escaped literals, submits the
//! statement with retry and backoff, coerces the returned cells into
//! caller-friendly values, and manages the underlying pool (hot-swap,
//! keep-alive, readiness signalling) behind a stable handle.

pub mod coerce;
pub mod config;
pub mod driver;
pub mod error;
mod executor;
pub mod pool;
pub mod prelude;
pub mod relay;
pub mod render;
pub mod results;
pub mod settings;
pub mod value;

#[cfg(feature = "test-support")]
pub mod test_support;

pub use error::RelayDbError;
pub use executor::{RetryPolicy, TimingOptions};
pub use relay::MysqlRelay;
pub use settings::RelaySettings;
pub use value::{Params, SqlValue};
