#![cfg(feature = "test-support")]

use std::sync::Arc;
use std::time::Duration;

use mysql_relay::prelude::*;
use mysql_relay::test_support::{
    PlainEscaper, ScriptStep, ScriptedDriver, ScriptedFactory, rows_output,
};

/// Millisecond-scale schedule with the production shape: five attempts,
/// exponential growth by 3, jittered.
fn quick_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 4,
        min_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(60),
        multiplier: 3.0,
        jitter: 0.25,
    }
}

async fn relay_over(driver: Arc<ScriptedDriver>) -> MysqlRelay {
    let factory = ScriptedFactory::new(vec![driver]);
    MysqlRelay::with_factory(
        RelaySettings::new("mysql://app@db1/game"),
        factory,
        Arc::new(PlainEscaper),
    )
    .await
    .expect("relay construction")
    .with_retry_policy(quick_policy())
}

/// Four transient failures followed by a success: the caller sees the
/// success and the driver saw exactly five submissions.
#[tokio::test(flavor = "current_thread")]
async fn transient_failures_retry_until_success() {
    let driver = ScriptedDriver::new(
        "flaky",
        vec![
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::ok(rows_output(&["n"], vec![vec![SqlValue::Int(9)]])),
        ],
    );
    let relay = relay_over(driver.clone()).await;

    let value = relay.fetch_scalar("SELECT n FROM t", None).await.unwrap();

    assert_eq!(value, Some(SqlValue::Int(9)));
    assert_eq!(driver.runs(), 5);
}

/// Nothing but transient failures: the error reports all five attempts
/// and no sixth submission happens.
#[tokio::test(flavor = "current_thread")]
async fn exhausted_retries_report_the_attempt_count() {
    let driver = ScriptedDriver::new(
        "down",
        vec![
            ScriptStep::transient("lost connection"),
            ScriptStep::transient("lost connection"),
            ScriptStep::transient("lost connection"),
            ScriptStep::transient("lost connection"),
            ScriptStep::transient("lost connection"),
        ],
    );
    let relay = relay_over(driver.clone()).await;

    let err = relay.execute("UPDATE t SET a = 1", None).await.unwrap_err();

    assert_eq!(err.attempts(), Some(5));
    assert!(matches!(err, RelayDbError::QueryFailed { attempts: 5, .. }));
    assert_eq!(driver.runs(), 5);
}

/// Permanent failures are not worth retrying; one submission, one error.
#[tokio::test(flavor = "current_thread")]
async fn permanent_failures_fail_on_the_first_attempt() {
    let driver = ScriptedDriver::new(
        "strict",
        vec![ScriptStep::permanent("syntax error near 'FORM'")],
    );
    let relay = relay_over(driver.clone()).await;

    let err = relay.fetch_all("SELECT * FORM t", None).await.unwrap_err();

    assert_eq!(err.attempts(), Some(1));
    assert_eq!(driver.runs(), 1);
}

/// The gaps between submissions follow the schedule: each at least its
/// floor, and strictly longer than the one before (the jitter windows of
/// consecutive delays do not overlap).
#[tokio::test(flavor = "current_thread")]
async fn backoff_gaps_grow_between_attempts() {
    let driver = ScriptedDriver::new(
        "flaky",
        vec![
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::transient("gone away"),
            ScriptStep::ok(rows_output(&["n"], vec![vec![SqlValue::Int(1)]])),
        ],
    );
    let relay = relay_over(driver.clone()).await;

    relay.fetch_scalar("SELECT n FROM t", None).await.unwrap();

    let times = driver.run_times();
    assert_eq!(times.len(), 5);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();

    // Floors per retry: 50ms (jitter clamped to the minimum), then 75%
    // of 150ms, 450ms, 1350ms. A sleep never fires early, so the gaps
    // can only be at or above these.
    let floors = [
        Duration::from_millis(49),
        Duration::from_millis(110),
        Duration::from_millis(330),
        Duration::from_millis(1000),
    ];
    for (gap, floor) in gaps.iter().zip(floors) {
        assert!(*gap >= floor, "gap {gap:?} below floor {floor:?}");
    }
    for pair in gaps.windows(2) {
        assert!(pair[1] > pair[0], "gaps must grow: {gaps:?}");
    }
}
