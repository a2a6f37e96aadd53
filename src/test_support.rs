//! Scripted in-memory driver for exercising the relay without a server.
//!
//! Enabled by the `test-support` feature; the crate's own integration
//! tests turn it on through the dev-dependency self-reference.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::sleep;

use crate::coerce::{ColumnKind, ColumnMeta};
use crate::config::DbConfig;
use crate::driver::{Driver, DriverError, DriverFactory, StatementOutput};
use crate::error::RelayDbError;
use crate::render::ValueEscaper;
use crate::value::SqlValue;

/// One scripted response; `latency` delays the reply to simulate slow
/// statements and in-flight overlap.
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub latency: Duration,
    pub outcome: Result<StatementOutput, DriverError>,
}

impl ScriptStep {
    #[must_use]
    pub fn ok(output: StatementOutput) -> Self {
        ScriptStep {
            latency: Duration::ZERO,
            outcome: Ok(output),
        }
    }

    #[must_use]
    pub fn transient(message: &str) -> Self {
        ScriptStep {
            latency: Duration::ZERO,
            outcome: Err(DriverError::transient(message)),
        }
    }

    #[must_use]
    pub fn permanent(message: &str) -> Self {
        ScriptStep {
            latency: Duration::ZERO,
            outcome: Err(DriverError::permanent(message)),
        }
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Replays a queue of scripted steps and records every statement it was
/// handed. An exhausted script keeps succeeding with empty output, so
/// keep-alive probes in the background never fail a test by accident.
pub struct ScriptedDriver {
    label: String,
    script: Mutex<VecDeque<ScriptStep>>,
    statements: Mutex<Vec<String>>,
    run_times: Mutex<Vec<Instant>>,
    runs: AtomicU32,
    closed: AtomicBool,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new(label: &str, steps: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(ScriptedDriver {
            label: label.to_string(),
            script: Mutex::new(steps.into()),
            statements: Mutex::new(Vec::new()),
            run_times: Mutex::new(Vec::new()),
            runs: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// How many statements reached this driver.
    #[must_use]
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Every statement received, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }

    /// When each statement arrived; backoff tests measure the gaps.
    #[must_use]
    pub fn run_times(&self) -> Vec<Instant> {
        lock(&self.run_times).clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    async fn run(&self, sql: &str) -> Result<StatementOutput, DriverError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        lock(&self.run_times).push(Instant::now());
        lock(&self.statements).push(sql.to_string());
        if self.is_closed() {
            return Err(DriverError::permanent(format!(
                "{}: handle is closed",
                self.label
            )));
        }
        let step = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| ScriptStep::ok(StatementOutput::default()));
        if step.latency > Duration::ZERO {
            sleep(step.latency).await;
        }
        step.outcome
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out prepared drivers in order, one per connect call; hot-swap
/// tests use it to control which handle each generation gets. An empty
/// queue makes the next connect fail, which is how factory failures are
/// scripted.
pub struct ScriptedFactory {
    handles: Mutex<VecDeque<Arc<ScriptedDriver>>>,
    seen: Mutex<Vec<DbConfig>>,
    connects: AtomicU32,
}

impl ScriptedFactory {
    #[must_use]
    pub fn new(handles: Vec<Arc<ScriptedDriver>>) -> Arc<Self> {
        Arc::new(ScriptedFactory {
            handles: Mutex::new(handles.into()),
            seen: Mutex::new(Vec::new()),
            connects: AtomicU32::new(0),
        })
    }

    /// How many connects the factory served (or refused).
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// The configs handed to each connect call, in order.
    #[must_use]
    pub fn seen_configs(&self) -> Vec<DbConfig> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn Driver>, RelayDbError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        lock(&self.seen).push(config.clone());
        lock(&self.handles)
            .pop_front()
            .map(|driver| driver as Arc<dyn Driver>)
            .ok_or_else(|| {
                RelayDbError::ConnectionError("no scripted handle left".to_string())
            })
    }
}

/// Quote-doubling escaper for driver-free tests. Real deployments use the
/// driver's own escaper; this one only has to be unambiguous.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainEscaper;

impl ValueEscaper for PlainEscaper {
    fn escape(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
            SqlValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            SqlValue::Timestamp(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Json(v) => format!("'{}'", v.to_string().replace('\'', "''")),
            SqlValue::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }
}

/// Rowset output whose columns all have `Other` kind, the common case.
#[must_use]
pub fn rows_output(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> StatementOutput {
    let metas = columns
        .iter()
        .map(|name| ColumnMeta::new(*name, ColumnKind::Other))
        .collect();
    StatementOutput::rowset(metas, rows)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
