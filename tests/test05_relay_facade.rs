#![cfg(feature = "test-support")]

use std::sync::Arc;

use chrono::NaiveDate;

use mysql_relay::coerce::{ColumnKind, ColumnMeta};
use mysql_relay::prelude::*;
use mysql_relay::test_support::{
    PlainEscaper, ScriptStep, ScriptedDriver, ScriptedFactory, rows_output,
};

async fn relay_over(driver: Arc<ScriptedDriver>) -> MysqlRelay {
    let factory = ScriptedFactory::new(vec![driver]);
    MysqlRelay::with_factory(
        RelaySettings::new("mysql://app@db1/game"),
        factory,
        Arc::new(PlainEscaper),
    )
    .await
    .expect("relay construction")
}

/// The end-to-end scalar path: render, submit, first cell back.
#[tokio::test(flavor = "current_thread")]
async fn fetch_scalar_renders_and_returns_the_first_cell() {
    let driver = ScriptedDriver::new(
        "a",
        vec![ScriptStep::ok(rows_output(
            &["x"],
            vec![vec![SqlValue::Int(5)]],
        ))],
    );
    let relay = relay_over(driver.clone()).await;

    let value = relay
        .fetch_scalar("SELECT @x", Some(&Params::new().with("x", 5)))
        .await
        .unwrap();

    assert_eq!(value, Some(SqlValue::Int(5)));
    assert_eq!(driver.statements(), vec!["SELECT 5".to_string()]);
}

/// An insert reports the generated id; a statement without one reports 0.
#[tokio::test(flavor = "current_thread")]
async fn insert_returns_the_generated_id_or_zero() {
    let driver = ScriptedDriver::new(
        "a",
        vec![
            ScriptStep::ok(StatementOutput::dml(1, Some(42))),
            ScriptStep::ok(StatementOutput::dml(1, None)),
        ],
    );
    let relay = relay_over(driver).await;

    let id = relay
        .insert(
            "INSERT INTO users (name) VALUES (@name)",
            Some(&Params::new().with("name", "rex")),
        )
        .await
        .unwrap();
    assert_eq!(id, 42);

    let none = relay
        .insert("INSERT INTO audit (what) VALUES ('x')", None)
        .await
        .unwrap();
    assert_eq!(none, 0);
}

/// Execute reports the affected-row count, defaulting to 0 when the
/// driver has nothing to say.
#[tokio::test(flavor = "current_thread")]
async fn execute_reports_affected_rows_or_zero() {
    let driver = ScriptedDriver::new(
        "a",
        vec![
            ScriptStep::ok(StatementOutput::dml(3, None)),
            ScriptStep::ok(StatementOutput::default()),
        ],
    );
    let relay = relay_over(driver).await;

    assert_eq!(relay.execute("UPDATE t SET a = 1", None).await.unwrap(), 3);
    assert_eq!(relay.execute("SET NAMES utf8mb4", None).await.unwrap(), 0);
}

/// Column coercion runs on the fetch path: temporal columns come back as
/// epoch milliseconds, TINYINT(1) as booleans, BIT as the first byte.
#[tokio::test(flavor = "current_thread")]
async fn fetch_all_applies_column_coercion() {
    let columns = vec![
        ColumnMeta::new("seen_at", ColumnKind::Timestamp),
        ColumnMeta::new("day", ColumnKind::Date),
        ColumnMeta::new("active", ColumnKind::Tiny { width: 1 }),
        ColumnMeta::new("flags", ColumnKind::Bit),
        ColumnMeta::new("note", ColumnKind::Other),
    ];
    let midnight = NaiveDate::from_ymd_opt(2024, 1, 5)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let driver = ScriptedDriver::new(
        "a",
        vec![ScriptStep::ok(StatementOutput::rowset(
            columns,
            vec![vec![
                SqlValue::Timestamp(midnight),
                SqlValue::Text("2024-01-05".to_string()),
                SqlValue::Int(1),
                SqlValue::Bytes(vec![0x05]),
                SqlValue::Text("plain".to_string()),
            ]],
        ))],
    );
    let relay = relay_over(driver).await;

    let result = relay.fetch_all("SELECT * FROM sightings", None).await.unwrap();

    assert_eq!(result.len(), 1);
    let row = &result.rows[0];
    assert_eq!(row.get("seen_at"), Some(&SqlValue::Int(1_704_412_800_000)));
    assert_eq!(row.get("day"), Some(&SqlValue::Int(1_704_412_800_000)));
    assert_eq!(row.get("active"), Some(&SqlValue::Bool(true)));
    assert_eq!(row.get("flags"), Some(&SqlValue::Int(5)));
    assert_eq!(row.get("note"), Some(&SqlValue::Text("plain".to_string())));
}

/// A temporal cell that cannot be parsed fails the whole fetch with the
/// offending column named.
#[tokio::test(flavor = "current_thread")]
async fn unparseable_temporal_cell_fails_the_fetch() {
    let driver = ScriptedDriver::new(
        "a",
        vec![ScriptStep::ok(StatementOutput::rowset(
            vec![ColumnMeta::new("when", ColumnKind::DateTime)],
            vec![vec![SqlValue::Text("soonish".to_string())]],
        ))],
    );
    let relay = relay_over(driver).await;

    let err = relay.fetch_all("SELECT `when` FROM t", None).await.unwrap_err();
    match err {
        RelayDbError::InvalidDate { column, value } => {
            assert_eq!(column, "when");
            assert_eq!(value, "soonish");
        }
        other => panic!("expected InvalidDate, got {other}"),
    }
}

/// No rows at all and a row holding SQL NULL are different answers.
#[tokio::test(flavor = "current_thread")]
async fn scalar_distinguishes_no_rows_from_null() {
    let driver = ScriptedDriver::new(
        "a",
        vec![
            ScriptStep::ok(rows_output(&[], Vec::new())),
            ScriptStep::ok(rows_output(&["v"], vec![vec![SqlValue::Null]])),
        ],
    );
    let relay = relay_over(driver).await;

    let empty = relay.fetch_scalar("SELECT v FROM t WHERE 0", None).await.unwrap();
    assert_eq!(empty, None);

    let null = relay.fetch_scalar("SELECT NULL", None).await.unwrap();
    assert_eq!(null, Some(SqlValue::Null));
}

/// Readiness fires at construction and can be re-broadcast for late
/// subscribers.
#[tokio::test(flavor = "current_thread")]
async fn readiness_signals_at_startup_and_on_demand() {
    let driver = ScriptedDriver::new("a", Vec::new());
    let relay = relay_over(driver).await;

    // Resolves immediately; construction already signalled.
    relay.ready().await;

    let mut rx = relay.subscribe_ready();
    assert!(*rx.borrow(), "ready flag should be set");

    rx.borrow_and_update();
    relay.signal_ready();
    assert!(rx.has_changed().unwrap(), "re-signal must be observable");
}

/// Caller-tagged clones share the pool; the tag only changes logging.
#[tokio::test(flavor = "current_thread")]
async fn caller_tagged_clones_share_the_pool() {
    let driver = ScriptedDriver::new("a", Vec::new());
    let relay = relay_over(driver.clone()).await;

    let jobs = relay.for_caller("job-runner");
    jobs.execute("SELECT 1", None).await.unwrap();
    relay.execute("SELECT 2", None).await.unwrap();

    assert_eq!(
        driver.statements(),
        vec!["SELECT 1".to_string(), "SELECT 2".to_string()]
    );
}
