use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;
use crate::error::{BigQueryError, Result, RowDriftError};
use crate::row::{Row, Value};

/// Backtick-quoted identifier; rejects anything but letters, digits and underscores.
pub(crate) fn ident(name: &str) -> Result<String> {
    let re = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
        .map_err(|e| RowDriftError::Config(e.to_string()))?;
    if !re.is_match(name) {
        return Err(RowDriftError::validation(format!("Invalid identifier: '{}'", name)));
    }
    Ok(format!("`{}`", name))
}

/// Fully qualified `project.dataset.table` reference.
pub(crate) fn table_ref(project: &str, dataset: &str, table: &str) -> Result<String> {
    if project.trim().is_empty() || project.contains('`') {
        return Err(RowDriftError::validation(format!("Invalid project id: '{}'", project)));
    }
    ident(dataset)?;
    ident(table)?;
    Ok(format!("`{}.{}.{}`", project, dataset, table))
}

pub(crate) fn string_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

pub(crate) fn timestamp_literal(ts: &DateTime<Utc>) -> String {
    format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.6f UTC"))
}

/// Client-side row id; the tracking tables have no sequence.
pub(crate) fn new_row_id() -> i64 {
    (Uuid::new_v4().as_u64_pair().0 >> 1) as i64
}

pub(crate) fn int_column(row: &Row, name: &str, operation: &str) -> Result<i64> {
    row.get(name).and_then(Value::as_i64).ok_or_else(|| unexpected(operation, name))
}

pub(crate) fn string_column(row: &Row, name: &str, operation: &str) -> Result<String> {
    match row.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(unexpected(operation, name)),
    }
}

pub(crate) fn timestamp_column(row: &Row, name: &str) -> Option<DateTime<Utc>> {
    match row.get(name) {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    }
}

fn unexpected(operation: &str, column: &str) -> RowDriftError {
    RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
        operation: operation.to_string(),
        message: format!("missing or mistyped column '{}'", column),
    })
}
