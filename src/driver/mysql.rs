use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value};
use tracing::debug;

use crate::coerce::{ColumnKind, ColumnMeta};
use crate::config::DbConfig;
use crate::driver::{Driver, DriverError, DriverErrorKind, DriverFactory, StatementOutput};
use crate::error::RelayDbError;
use crate::render::ValueEscaper;
use crate::value::SqlValue;

/// Server error codes treated as transient: too many connections, server
/// shutdown in progress, lock wait timeout, deadlock, server gone away,
/// lost connection during query.
const TRANSIENT_SERVER_CODES: [u16; 6] = [1040, 1053, 1205, 1213, 2006, 2013];

/// A pooled MySQL handle speaking the text protocol.
///
/// Statements arrive fully rendered, so everything goes through
/// `query_iter`; the binary protocol is never needed.
pub struct MysqlDriver {
    pool: Pool,
}

impl MysqlDriver {
    /// Build a lazy pool from connection settings. No round-trip happens
    /// until the first checkout; use [`MysqlDriverFactory`] to validate
    /// reachability eagerly.
    #[must_use]
    pub fn from_config(config: &DbConfig) -> Self {
        MysqlDriver {
            pool: Pool::new(build_opts(config)),
        }
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    async fn run(&self, sql: &str) -> Result<StatementOutput, DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(classify_error)?;
        let mut result = conn.query_iter(sql).await.map_err(classify_error)?;
        // OK-packet metadata must be read before the rows are drained.
        let affected_rows = result.affected_rows();
        let last_insert_id = result.last_insert_id();
        let raw_rows: Vec<mysql_async::Row> = result.collect().await.map_err(classify_error)?;
        result.drop_result().await.map_err(classify_error)?;

        let columns = raw_rows
            .first()
            .map(|row| column_metas(row.columns_ref()))
            .unwrap_or_default();
        let kinds: Vec<ColumnKind> = columns.iter().map(|c| c.kind).collect();
        let rows = raw_rows
            .iter()
            .map(|raw| {
                (0..raw.len())
                    .map(|idx| {
                        let kind = kinds.get(idx).copied().unwrap_or(ColumnKind::Other);
                        match raw.get_opt::<Value, usize>(idx) {
                            Some(Ok(value)) => from_driver_value(kind, value),
                            _ => SqlValue::Null,
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(StatementOutput {
            columns,
            rows,
            affected_rows,
            last_insert_id,
        })
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.pool.clone().disconnect().await.map_err(classify_error)
    }
}

/// Mints pooled MySQL handles; the startup and every hot-swap go through
/// here so a dead target fails fast instead of on the first query.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriverFactory;

#[async_trait]
impl DriverFactory for MysqlDriverFactory {
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn Driver>, RelayDbError> {
        let driver = MysqlDriver::from_config(config);
        let mut conn = driver.pool.get_conn().await?;
        conn.ping().await?;
        drop(conn);
        Ok(Arc::new(driver))
    }
}

/// Literal escaping through the driver's own SQL value encoder; the only
/// path by which parameter values enter statement text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlEscaper;

impl ValueEscaper for MysqlEscaper {
    fn escape(&self, value: &SqlValue) -> String {
        // `false`: the server's default backslash-escaping mode.
        to_driver_value(value).as_sql(false)
    }
}

fn build_opts(config: &DbConfig) -> Opts {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()));
    if !config.database.is_empty() {
        builder = builder.db_name(Some(config.database.clone()));
    }
    if let Some(socket) = config.socket_path() {
        builder = builder.socket(Some(socket.to_string()));
    }
    if let Some(limit) = config.connection_limit()
        && let Some(constraints) = PoolConstraints::new(1, limit)
    {
        builder = builder.pool_opts(PoolOpts::default().with_constraints(constraints));
    }
    for key in config.options.keys() {
        if !matches!(
            key.as_str(),
            "connectionLimit" | "connection_limit" | "socket"
        ) {
            debug!(option = %key, "ignoring unsupported connection option");
        }
    }
    Opts::from(builder)
}

fn classify_error(err: mysql_async::Error) -> DriverError {
    let kind = match &err {
        mysql_async::Error::Io(_) => DriverErrorKind::Transient,
        // Driver-state errors out of get_conn/query are pool teardown
        // races in this call pattern; a fresh attempt can land on a
        // healthy handle.
        mysql_async::Error::Driver(_) => DriverErrorKind::Transient,
        mysql_async::Error::Server(server) if TRANSIENT_SERVER_CODES.contains(&server.code) => {
            DriverErrorKind::Transient
        }
        _ => DriverErrorKind::Permanent,
    };
    DriverError {
        message: err.to_string(),
        kind,
    }
}

fn column_metas(columns: &[mysql_async::Column]) -> Vec<ColumnMeta> {
    columns
        .iter()
        .map(|col| ColumnMeta::new(col.name_str().into_owned(), column_kind(col)))
        .collect()
}

fn column_kind(column: &mysql_async::Column) -> ColumnKind {
    use mysql_async::consts::ColumnType as T;
    match column.column_type() {
        T::MYSQL_TYPE_DATE | T::MYSQL_TYPE_NEWDATE => ColumnKind::Date,
        T::MYSQL_TYPE_DATETIME | T::MYSQL_TYPE_DATETIME2 => ColumnKind::DateTime,
        T::MYSQL_TYPE_TIMESTAMP | T::MYSQL_TYPE_TIMESTAMP2 => ColumnKind::Timestamp,
        T::MYSQL_TYPE_TINY => ColumnKind::Tiny {
            width: column.column_length(),
        },
        T::MYSQL_TYPE_BIT => ColumnKind::Bit,
        _ => ColumnKind::Other,
    }
}

fn to_driver_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::Float(f) => Value::Double(*f),
        SqlValue::Text(s) => Value::Bytes(s.clone().into_bytes()),
        SqlValue::Bool(b) => Value::Int(i64::from(*b)),
        SqlValue::Timestamp(dt) => Value::Date(
            u16::try_from(dt.year()).unwrap_or(0),
            u8::try_from(dt.month()).unwrap_or(1),
            u8::try_from(dt.day()).unwrap_or(1),
            u8::try_from(dt.hour()).unwrap_or(0),
            u8::try_from(dt.minute()).unwrap_or(0),
            u8::try_from(dt.second()).unwrap_or(0),
            dt.time().nanosecond() / 1000,
        ),
        SqlValue::Null => Value::NULL,
        SqlValue::Json(v) => Value::Bytes(v.to_string().into_bytes()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
    }
}

fn from_driver_value(kind: ColumnKind, value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => {
            if kind == ColumnKind::Bit {
                // BIT payloads stay raw; coercion reads the first byte.
                SqlValue::Bytes(bytes)
            } else {
                match String::from_utf8(bytes) {
                    Ok(text) => SqlValue::Text(text),
                    Err(err) => SqlValue::Bytes(err.into_bytes()),
                }
            }
        }
        Value::Int(i) => SqlValue::Int(i),
        Value::UInt(u) => i64::try_from(u)
            .map_or_else(|_| SqlValue::Text(u.to_string()), SqlValue::Int),
        Value::Float(f) => SqlValue::Float(f64::from(f)),
        Value::Double(d) => SqlValue::Float(d),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map_or(SqlValue::Null, SqlValue::Timestamp)
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(hours);
            if micros == 0 {
                SqlValue::Text(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
            } else {
                SqlValue::Text(format!(
                    "{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
                ))
            }
        }
    }
}
