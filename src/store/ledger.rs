use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// Last-known fingerprint for one primary key of a monitored table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub id: Option<i64>,
    pub table_name: String,
    pub primary_key: i64,
    pub fingerprint: u32,
}

impl ChecksumRecord {
    pub fn new(table_name: impl Into<String>, primary_key: i64, fingerprint: u32) -> Self {
        Self {
            id: None,
            table_name: table_name.into(),
            primary_key,
            fingerprint,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Persisted mapping (table, primary key) to last-known fingerprint.
///
/// Records are never deleted: a record whose key no longer exists in the live
/// table is itself the deletion signal surfaced by [`find_deleted_keys`].
///
/// [`find_deleted_keys`]: ChecksumLedger::find_deleted_keys
#[async_trait]
pub trait ChecksumLedger: Send + Sync {
    /// Stores a new record and returns its assigned id.
    async fn insert(&self, record: &ChecksumRecord) -> Result<i64>;

    async fn find_by_key(&self, table_name: &str, primary_key: i64) -> Result<Option<ChecksumRecord>>;

    /// Overwrites the record with `record.id`. `Ok(false)` when no record has that id.
    async fn update(&self, record: &ChecksumRecord) -> Result<bool>;

    /// Up to `limit` records of `table_name`, ascending by primary key, whose
    /// key has no matching row in the live table (`key_column` of `table_name`)
    /// and no DELETE entry in the audit log kept alongside the ledger.
    async fn find_deleted_keys(
        &self,
        table_name: &str,
        key_column: &str,
        limit: usize,
    ) -> Result<Vec<ChecksumRecord>>;

    async fn find_deleted_key(&self, table_name: &str, key_column: &str) -> Result<Option<ChecksumRecord>> {
        Ok(self.find_deleted_keys(table_name, key_column, 1).await?.into_iter().next())
    }
}
