use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::{Result, RowDriftError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = RowDriftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(RowDriftError::validation(format!("Unknown change kind: {}", other))),
        }
    }
}

/// One detected transition of a monitored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Option<i64>,
    pub table_name: String,
    pub primary_key: i64,
    pub change_kind: ChangeKind,
    /// Stamped with the current time on insert when unset.
    pub timestamp: Option<DateTime<Utc>>,
}

impl AuditEntry {
    pub fn new(table_name: impl Into<String>, primary_key: i64, change_kind: ChangeKind) -> Self {
        Self {
            id: None,
            table_name: table_name.into(),
            primary_key,
            change_kind,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Append-only trail of change events.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Appends the entry and returns its assigned id.
    async fn insert(&self, entry: &AuditEntry) -> Result<i64>;

    /// True iff a DELETE entry already exists for the key.
    async fn was_already_deleted(&self, table_name: &str, primary_key: i64) -> Result<bool>;

    /// Newest entries of `table_name` first.
    async fn recent(&self, table_name: &str, limit: usize) -> Result<Vec<AuditEntry>>;
}
