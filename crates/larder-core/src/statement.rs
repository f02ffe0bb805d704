//! Parameterized statement construction for insert and update intents.
//!
//! The builder is pure: given a row-intent it produces exactly one SQL
//! statement plus its positional bound values, and never touches storage.

use crate::error::{LarderError, Result};
use crate::Row;
use serde_json::Value;

/// A caller-supplied description of one write: target columns plus an
/// optional equality predicate.
///
/// A bare [`Row`] converts into an insert intent via `From`, so callers can
/// pass a plain mapping to [`Table::set`](crate::Table::set).
#[derive(Debug, Clone, PartialEq)]
pub struct RowIntent {
    /// Columns to insert or assign.
    pub columns: Row,
    /// Equality predicate for an update. `None` means insert.
    pub predicate: Option<Row>,
}

impl RowIntent {
    /// An insert intent writing `columns` as a new row.
    pub fn insert(columns: Row) -> Self {
        Self {
            columns,
            predicate: None,
        }
    }

    /// An update intent assigning `columns` to every row matching all
    /// key/value pairs of `predicate`.
    pub fn update(columns: Row, predicate: Row) -> Self {
        Self {
            columns,
            predicate: Some(predicate),
        }
    }
}

impl From<Row> for RowIntent {
    fn from(columns: Row) -> Self {
        Self::insert(columns)
    }
}

/// A built SQL statement plus its positional bound values.
///
/// Ephemeral: built and consumed within a single write call.
#[derive(Debug, Clone)]
pub struct BuiltStatement {
    /// The parameterized SQL text.
    pub sql: String,
    /// Bound values for the INSERT/SET clause, in placeholder order.
    pub set_values: Vec<rusqlite::types::Value>,
    /// Bound values for the WHERE clause, in placeholder order after the
    /// SET values. Empty for inserts.
    pub where_values: Vec<rusqlite::types::Value>,
}

impl BuiltStatement {
    /// All bound values in placeholder order.
    pub fn params(&self) -> impl Iterator<Item = &rusqlite::types::Value> {
        self.set_values.iter().chain(self.where_values.iter())
    }
}

/// Build the single statement for a row-intent against `table`.
///
/// No predicate produces an INSERT over the intent's columns; a predicate
/// produces an UPDATE whose WHERE clause ANDs every predicate key. Column
/// order follows the row's key iteration order.
pub fn build_write_statement(table: &str, intent: &RowIntent) -> Result<BuiltStatement> {
    if intent.columns.is_empty() {
        return Err(LarderError::invalid_input("row intent has no columns"));
    }

    match &intent.predicate {
        None => {
            let names: Vec<String> = intent.columns.keys().map(|k| quote_ident(k)).collect();
            let placeholders: Vec<String> =
                (1..=intent.columns.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                names.join(", "),
                placeholders.join(", "),
            );
            Ok(BuiltStatement {
                sql,
                set_values: intent.columns.values().map(bind_value).collect(),
                where_values: Vec::new(),
            })
        }
        Some(predicate) => {
            // An empty predicate would produce an unconditioned UPDATE that
            // rewrites every row; refuse to build it.
            if predicate.is_empty() {
                return Err(LarderError::invalid_input(
                    "update predicate is empty; refusing to build an unconditioned UPDATE",
                ));
            }

            let assignments: Vec<String> = intent
                .columns
                .keys()
                .enumerate()
                .map(|(i, name)| format!("{} = ?{}", quote_ident(name), i + 1))
                .collect();
            let offset = intent.columns.len();
            let conditions: Vec<String> = predicate
                .keys()
                .enumerate()
                .map(|(i, name)| format!("{} = ?{}", quote_ident(name), offset + i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {}",
                quote_ident(table),
                assignments.join(", "),
                conditions.join(" AND "),
            );
            Ok(BuiltStatement {
                sql,
                set_values: intent.columns.values().map(bind_value).collect(),
                where_values: predicate.values().map(bind_value).collect(),
            })
        }
    }
}

/// Convert a JSON value into its storable SQLite form.
///
/// Structured values (objects, arrays) are serialized to JSON text, as are
/// booleans so the read-path codec materializes them back. Strings, numbers,
/// and null bind natively.
pub(crate) fn bind_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or_default())
            }
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
            rusqlite::types::Value::Text(value.to_string())
        }
    }
}

/// Quote an identifier for interpolation into SQL, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
