use std::borrow::Cow;

use chrono::NaiveDateTime;

use crate::error::RelayDbError;
use crate::value::SqlValue;

/// Column shape as reported by the driver, reduced to the kinds the
/// coercion rules care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    DateTime,
    Timestamp,
    /// TINYINT with its display width; width 1 is the conventional boolean.
    Tiny { width: u32 },
    Bit,
    Other,
}

/// Name and kind of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnMeta {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        ColumnMeta {
            name: name.into(),
            kind,
        }
    }
}

/// Apply the relay's coercion rules to one cell.
///
/// Temporal columns become epoch milliseconds (`Int`), TINYINT(1) becomes
/// `Bool`, BIT becomes the numeric value of its first byte. Everything
/// else, and NULL in any column, passes through unchanged.
///
/// # Errors
///
/// `RelayDbError::InvalidDate` when a temporal cell cannot be parsed.
pub fn coerce_value(meta: &ColumnMeta, value: SqlValue) -> Result<SqlValue, RelayDbError> {
    match meta.kind {
        ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Timestamp => {
            coerce_temporal(meta, value)
        }
        ColumnKind::Tiny { width: 1 } => Ok(coerce_tiny_bool(value)),
        ColumnKind::Bit => Ok(coerce_bit(value)),
        _ => Ok(value),
    }
}

/// Coerce a whole row against its column metadata. Cells beyond the
/// metadata (which a well-behaved driver never produces) pass through.
///
/// # Errors
///
/// Propagates the first `InvalidDate` encountered.
pub fn coerce_row(
    columns: &[ColumnMeta],
    values: Vec<SqlValue>,
) -> Result<Vec<SqlValue>, RelayDbError> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match columns.get(i) {
            Some(meta) => coerce_value(meta, value),
            None => Ok(value),
        })
        .collect()
}

fn coerce_temporal(meta: &ColumnMeta, value: SqlValue) -> Result<SqlValue, RelayDbError> {
    match value {
        SqlValue::Null => Ok(SqlValue::Null),
        // Already epoch milliseconds; coercion is idempotent.
        SqlValue::Int(ms) => Ok(SqlValue::Int(ms)),
        SqlValue::Timestamp(dt) => Ok(SqlValue::Int(dt.and_utc().timestamp_millis())),
        SqlValue::Text(s) => temporal_text_to_epoch_ms(&meta.name, &s).map(SqlValue::Int),
        SqlValue::Bytes(b) => {
            let text = String::from_utf8_lossy(&b);
            temporal_text_to_epoch_ms(&meta.name, &text).map(SqlValue::Int)
        }
        other => Err(RelayDbError::InvalidDate {
            column: meta.name.clone(),
            value: format!("{other:?}"),
        }),
    }
}

fn temporal_text_to_epoch_ms(column: &str, text: &str) -> Result<i64, RelayDbError> {
    let trimmed = text.trim();
    // Date-only values pick up a midnight time before parsing.
    let candidate: Cow<'_, str> = if trimmed.contains(' ') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("{trimmed} 00:00:00"))
    };
    // Try "YYYY-MM-DD HH:MM:SS", then the fractional-seconds form.
    let parsed = NaiveDateTime::parse_from_str(&candidate, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&candidate, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| RelayDbError::InvalidDate {
            column: column.to_string(),
            value: text.to_string(),
        })?;
    // Naive timestamps are interpreted as UTC so the epoch math is
    // deterministic across host timezones.
    Ok(parsed.and_utc().timestamp_millis())
}

fn coerce_tiny_bool(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Null => SqlValue::Null,
        SqlValue::Bool(b) => SqlValue::Bool(b),
        // Anything whose textual form is not "0" reads as true.
        SqlValue::Text(s) => SqlValue::Bool(s != "0"),
        SqlValue::Int(n) => SqlValue::Bool(n != 0),
        SqlValue::Bytes(b) => SqlValue::Bool(b != b"0"),
        other => other,
    }
}

fn coerce_bit(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Null => SqlValue::Null,
        SqlValue::Bytes(b) => SqlValue::Int(b.first().copied().map_or(0, i64::from)),
        SqlValue::Text(s) => SqlValue::Int(s.as_bytes().first().copied().map_or(0, i64::from)),
        SqlValue::Int(n) => SqlValue::Int(n),
        other => other,
    }
}
