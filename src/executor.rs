use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::coerce::coerce_row;
use crate::driver::StatementOutput;
use crate::error::RelayDbError;
use crate::pool::PoolManager;

/// Retry schedule for transient driver failures.
///
/// Delays grow exponentially from `min_delay` by `multiplier`, cap at
/// `max_delay`, and are jittered by ±`jitter` of the computed value
/// (clamped back into the window) so synchronized callers spread out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 4 means 5 attempts total.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Exponential growth factor between consecutive delays.
    pub multiplier: f64,
    /// Randomization factor, 0.0 to disable jitter.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 4,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 3.0,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Jittered delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let base = self.min_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let spread = capped * self.jitter;
        let jittered = if spread > 0.0 {
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };
        let clamped = jittered.clamp(
            self.min_delay.as_secs_f64(),
            self.max_delay.as_secs_f64(),
        );
        Duration::from_secs_f64(clamped)
    }
}

/// Per-statement observability knobs.
#[derive(Debug, Clone)]
pub struct TimingOptions {
    /// Log every statement with its timing, not just slow ones.
    pub debug: bool,
    /// Threshold for the slow-query warning when `debug` is off.
    pub slow_query_warning: Duration,
}

impl Default for TimingOptions {
    fn default() -> Self {
        TimingOptions {
            debug: false,
            slow_query_warning: Duration::from_millis(500),
        }
    }
}

/// Run one rendered statement with retry, timing, and coercion.
///
/// The current pool handle is re-resolved for every attempt, so a retry
/// scheduled across a hot-swap lands on the replacement pool while an
/// attempt already submitted finishes on the handle it cloned.
pub(crate) async fn run_statement(
    pool: &PoolManager,
    policy: &RetryPolicy,
    timing: &TimingOptions,
    caller: &str,
    sql: &str,
) -> Result<StatementOutput, RelayDbError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let driver = pool.current().await;
        let started = Instant::now();
        let outcome = driver.run(sql).await;
        log_timing(timing, caller, sql, started.elapsed(), attempt);

        match outcome {
            Ok(output) => {
                return coerce_output(output).map_err(|err| {
                    error!(caller, statement = sql, error = %err, "result coercion failed");
                    err
                });
            }
            Err(err) if err.is_retryable() && attempt <= policy.max_retries => {
                let delay = policy.delay_for(attempt);
                debug!(
                    caller,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, backing off"
                );
                sleep(delay).await;
            }
            Err(err) => {
                error!(
                    caller,
                    statement = sql,
                    attempts = attempt,
                    error = %err,
                    "query failed"
                );
                return Err(RelayDbError::QueryFailed {
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

fn log_timing(timing: &TimingOptions, caller: &str, sql: &str, elapsed: Duration, attempt: u32) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if timing.debug {
        info!(caller, elapsed_ms, attempt, statement = sql, "statement timing");
    } else if elapsed >= timing.slow_query_warning {
        warn!(caller, elapsed_ms, statement = sql, "slow query");
    }
}

/// Coercion sits on the success path of every operation; no caller sees
/// raw driver values.
fn coerce_output(output: StatementOutput) -> Result<StatementOutput, RelayDbError> {
    let StatementOutput {
        columns,
        rows,
        affected_rows,
        last_insert_id,
    } = output;
    let rows = rows
        .into_iter()
        .map(|row| coerce_row(&columns, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StatementOutput {
        columns,
        rows,
        affected_rows,
        last_insert_id,
    })
}
