use std::sync::Arc;

use tokio::sync::watch;

use crate::config::DbConfig;
use crate::driver::{DriverFactory, StatementOutput};
use crate::error::RelayDbError;
use crate::executor::{RetryPolicy, TimingOptions, run_statement};
use crate::pool::PoolManager;
use crate::render::{ValueEscaper, render_template};
use crate::results::ResultSet;
use crate::settings::RelaySettings;
use crate::value::{Params, SqlValue};

#[cfg(feature = "mysql")]
use crate::driver::mysql::{MysqlDriverFactory, MysqlEscaper};

const DEFAULT_CALLER: &str = "mysql-relay";

/// The caller-facing query layer: template rendering, retrying execution,
/// result coercion, and pool lifecycle behind a handful of async methods.
///
/// Handles are cheap to clone and share one pool; [`MysqlRelay::for_caller`]
/// produces a clone whose label tags every log line, which is how
/// per-subsystem attribution works.
///
/// ```rust,no_run
/// use mysql_relay::prelude::*;
///
/// # async fn demo() -> Result<(), RelayDbError> {
/// let relay = MysqlRelay::connect(RelaySettings::new("mysql://app:pw@db1/game")).await?;
/// let name = relay
///     .fetch_scalar(
///         "SELECT name FROM users WHERE id = @id",
///         Some(&Params::new().with("id", 1)),
///     )
///     .await?;
/// # let _ = name;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MysqlRelay {
    pool: Arc<PoolManager>,
    policy: RetryPolicy,
    timing: TimingOptions,
    escaper: Arc<dyn ValueEscaper>,
    ready_tx: Arc<watch::Sender<bool>>,
    ready_rx: watch::Receiver<bool>,
    caller: Arc<str>,
}

impl std::fmt::Debug for MysqlRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlRelay")
            .field("caller", &self.caller)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl MysqlRelay {
    /// Connect against a real MySQL target.
    ///
    /// # Errors
    ///
    /// `InvalidConnectionString` when the connection string parses in
    /// neither format (fatal by design), or the driver's error when the
    /// first pool cannot be established.
    #[cfg(feature = "mysql")]
    pub async fn connect(settings: RelaySettings) -> Result<Self, RelayDbError> {
        Self::with_factory(settings, Arc::new(MysqlDriverFactory), Arc::new(MysqlEscaper)).await
    }

    /// Same wiring with injected driver factory and escaper; the seam for
    /// alternative backends and for tests.
    ///
    /// # Errors
    ///
    /// See [`MysqlRelay::connect`].
    pub async fn with_factory(
        settings: RelaySettings,
        factory: Arc<dyn DriverFactory>,
        escaper: Arc<dyn ValueEscaper>,
    ) -> Result<Self, RelayDbError> {
        let config = DbConfig::parse(&settings.connection_string)?;
        let pool = PoolManager::initialize(config, factory).await?;
        pool.set_keep_alive(settings.keep_alive_secs);
        let (ready_tx, ready_rx) = watch::channel(false);
        let relay = MysqlRelay {
            pool,
            policy: RetryPolicy::default(),
            timing: TimingOptions {
                debug: settings.debug,
                slow_query_warning: settings.slow_query_warning(),
            },
            escaper,
            ready_tx: Arc::new(ready_tx),
            ready_rx,
            caller: Arc::from(DEFAULT_CALLER),
        };
        relay.signal_ready();
        Ok(relay)
    }

    /// Replace the retry schedule. Test rigs shrink it to milliseconds;
    /// production keeps the default.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A clone whose log lines carry `name` as the caller label.
    #[must_use]
    pub fn for_caller(&self, name: &str) -> Self {
        let mut tagged = self.clone();
        tagged.caller = Arc::from(name);
        tagged
    }

    /// Run a statement and return the affected-row count (0 when the
    /// driver reports none).
    ///
    /// # Errors
    ///
    /// `QueryFailed` after retries are exhausted or on a permanent driver
    /// error; `InvalidDate` when result coercion fails.
    pub async fn execute(
        &self,
        template: &str,
        params: Option<&Params>,
    ) -> Result<u64, RelayDbError> {
        let output = self.run(template, params).await?;
        Ok(output.affected_rows)
    }

    /// Run a statement and return the full coerced rowset.
    ///
    /// # Errors
    ///
    /// See [`MysqlRelay::execute`].
    pub async fn fetch_all(
        &self,
        template: &str,
        params: Option<&Params>,
    ) -> Result<ResultSet, RelayDbError> {
        let output = self.run(template, params).await?;
        Ok(build_result_set(output))
    }

    /// Run a statement and return the first column of the first row;
    /// `None` means the statement produced no rows at all, while a SQL
    /// NULL in an existing row is `Some(SqlValue::Null)`.
    ///
    /// # Errors
    ///
    /// See [`MysqlRelay::execute`].
    pub async fn fetch_scalar(
        &self,
        template: &str,
        params: Option<&Params>,
    ) -> Result<Option<SqlValue>, RelayDbError> {
        let output = self.run(template, params).await?;
        Ok(output
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    /// Run an INSERT and return the generated id (0 when the driver
    /// reports none).
    ///
    /// # Errors
    ///
    /// See [`MysqlRelay::execute`].
    pub async fn insert(
        &self,
        template: &str,
        params: Option<&Params>,
    ) -> Result<u64, RelayDbError> {
        let output = self.run(template, params).await?;
        Ok(output.last_insert_id.unwrap_or(0))
    }

    /// Hot-swap the pool: new queries land on a fresh handle while
    /// in-flight ones finish on the old, which closes after a grace
    /// period.
    ///
    /// # Errors
    ///
    /// A failure to build the replacement leaves the old pool serving.
    pub async fn reset_pool(&self) -> Result<(), RelayDbError> {
        self.pool.reset().await
    }

    /// Reconfigure keep-alive probing at runtime; 0 disables it.
    pub fn set_keep_alive(&self, secs: u64) {
        self.pool.set_keep_alive(secs);
    }

    /// Close the current pool for graceful teardown.
    ///
    /// # Errors
    ///
    /// The driver's close failure.
    pub async fn close(&self) -> Result<(), RelayDbError> {
        self.pool.close().await
    }

    /// Resolve once the relay has signaled readiness at least once.
    pub async fn ready(&self) {
        let mut rx = self.ready_rx.clone();
        // Cannot fail while this relay holds the sender.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// A watch handle for readiness; late attachers can poll or await it.
    #[must_use]
    pub fn subscribe_ready(&self) -> watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    /// Re-broadcast readiness without re-initializing anything, for
    /// subscribers that attached after the first signal.
    pub fn signal_ready(&self) {
        let _ = self.ready_tx.send(true);
    }

    async fn run(
        &self,
        template: &str,
        params: Option<&Params>,
    ) -> Result<StatementOutput, RelayDbError> {
        let sql = render_template(template, params, self.escaper.as_ref());
        run_statement(&self.pool, &self.policy, &self.timing, &self.caller, &sql).await
    }
}

fn build_result_set(output: StatementOutput) -> ResultSet {
    let names: Vec<String> = output.columns.iter().map(|c| c.name.clone()).collect();
    let mut set = ResultSet::with_columns(names);
    for row in output.rows {
        set.add_row_values(row);
    }
    set.rows_affected = output.affected_rows;
    set.last_insert_id = output.last_insert_id;
    set
}
