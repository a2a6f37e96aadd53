use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::value::SqlValue;

/// A row from a query result, with access to both the column names and
/// the values.
#[derive(Debug, Clone)]
pub struct Row {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<SqlValue>,
    // Shared name-to-index map to avoid repeated string comparisons.
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    /// Create a standalone row; the lookup index is built on the spot.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let column_index = Arc::new(build_column_index(&column_names));
        Row {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_shared_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Row {
            column_names,
            values,
            column_index,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Render the row as a JSON object keyed by column name.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::with_capacity(self.values.len());
        for (name, value) in self.column_names.iter().zip(&self.values) {
            object.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(object)
    }
}

/// Rows plus statement metadata from one execution.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub rows: Vec<Row>,
    /// Rows affected as reported by the driver (DML statements); 0 otherwise.
    pub rows_affected: u64,
    /// Auto-generated id of the last insert, when the driver reported one.
    pub last_insert_id: Option<u64>,
    column_names: Option<Arc<Vec<String>>>,
    column_index: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a result set whose rows share the given column names.
    #[must_use]
    pub fn with_columns(columns: Vec<String>) -> ResultSet {
        let column_names = Arc::new(columns);
        let column_index = Arc::new(build_column_index(&column_names));
        ResultSet {
            rows: Vec::new(),
            rows_affected: 0,
            last_insert_id: None,
            column_names: Some(column_names),
            column_index: Some(column_index),
        }
    }

    /// Column names shared by the rows, if any row structure is known.
    #[must_use]
    pub fn column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Append a row sharing this set's column names. Ignored when the set
    /// was built without column structure.
    pub fn add_row_values(&mut self, values: Vec<SqlValue>) {
        if let (Some(names), Some(index)) = (&self.column_names, &self.column_index) {
            self.rows
                .push(Row::with_shared_index(names.clone(), index.clone(), values));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row; the scalar-fetch shortcut.
    #[must_use]
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.get_by_index(0))
    }

    /// Render all rows as a JSON array of objects.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        JsonValue::Array(self.rows.iter().map(Row::to_json).collect())
    }
}

fn build_column_index(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
