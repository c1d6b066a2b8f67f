use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use crate::error::{Result, RowDriftError};
use crate::row::{Row, Value};
use super::{
    validate_audit_entry, validate_checksum_record, validate_snapshot_args, require_table_name,
    AuditEntry, AuditLog, ChangeKind, ChecksumLedger, ChecksumRecord, TableSnapshot,
};

/// Store operations, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListRows,
    FindDeletedKeys,
    FindByKey,
    InsertChecksum,
    UpdateChecksum,
    InsertAudit,
    WasAlreadyDeleted,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    op: StoreOp,
    primary_key: Option<i64>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    checksums: Vec<ChecksumRecord>,
    audit: Vec<AuditEntry>,
    next_checksum_id: i64,
    next_audit_id: i64,
    faults: Vec<Fault>,
    calls: HashMap<StoreOp, usize>,
}

impl MemoryState {
    fn enter(&mut self, op: StoreOp, primary_key: Option<i64>) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        let hit = self.faults.iter().any(|f| {
            f.op == op && (f.primary_key.is_none() || f.primary_key == primary_key)
        });
        if hit {
            return Err(RowDriftError::Store(format!("injected failure on {:?}", op)));
        }
        Ok(())
    }
}

/// Ledger, audit log and live tables held in process memory.
///
/// All clones share the same state, so one handle can be passed to the
/// reconciler as all three stores while the test mutates tables through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_table(&self, table_name: &str, rows: Vec<Row>) {
        self.state.lock().await.tables.insert(table_name.to_string(), rows);
    }

    /// Replaces the row whose `key_column` equals the new row's, or appends it.
    pub async fn upsert_row(&self, table_name: &str, key_column: &str, row: Row) {
        let mut state = self.state.lock().await;
        let rows = state.tables.entry(table_name.to_string()).or_default();
        let key = row.get(key_column).and_then(Value::as_i64);
        match rows.iter_mut().find(|r| key.is_some() && r.get(key_column).and_then(Value::as_i64) == key) {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
    }

    pub async fn delete_row(&self, table_name: &str, key_column: &str, primary_key: i64) {
        let mut state = self.state.lock().await;
        if let Some(rows) = state.tables.get_mut(table_name) {
            rows.retain(|r| r.get(key_column).and_then(Value::as_i64) != Some(primary_key));
        }
    }

    /// Places a ledger record directly, bypassing validation and call counting.
    pub async fn seed_checksum(&self, record: ChecksumRecord) -> i64 {
        let mut state = self.state.lock().await;
        state.next_checksum_id += 1;
        let id = state.next_checksum_id;
        state.checksums.push(record.with_id(id));
        id
    }

    pub async fn seed_audit(&self, entry: AuditEntry) -> i64 {
        let mut state = self.state.lock().await;
        state.next_audit_id += 1;
        let id = state.next_audit_id;
        let mut entry = entry;
        entry.id = Some(id);
        state.audit.push(entry);
        id
    }

    pub async fn checksums(&self) -> Vec<ChecksumRecord> {
        self.state.lock().await.checksums.clone()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    /// Fails every future call of `op`.
    pub async fn fail_on(&self, op: StoreOp) {
        self.state.lock().await.faults.push(Fault { op, primary_key: None });
    }

    /// Fails future calls of `op` that concern `primary_key`.
    pub async fn fail_on_key(&self, op: StoreOp, primary_key: i64) {
        self.state.lock().await.faults.push(Fault { op, primary_key: Some(primary_key) });
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    pub async fn call_count(&self, op: StoreOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }
}

fn sort_key(row: &Row, column: &str) -> (Option<i64>, Option<String>) {
    match row.get(column) {
        Some(value) => (value.as_i64(), value.canonical()),
        None => (None, None),
    }
}

#[async_trait]
impl ChecksumLedger for MemoryStore {
    async fn insert(&self, record: &ChecksumRecord) -> Result<i64> {
        validate_checksum_record(record)?;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::InsertChecksum, Some(record.primary_key))?;

        let duplicate = state.checksums.iter().any(|r| {
            r.table_name == record.table_name && r.primary_key == record.primary_key
        });
        if duplicate {
            return Err(RowDriftError::Store(format!(
                "Duplicate checksum for {}:{}",
                record.table_name, record.primary_key
            )));
        }

        state.next_checksum_id += 1;
        let id = state.next_checksum_id;
        state.checksums.push(record.clone().with_id(id));
        Ok(id)
    }

    async fn find_by_key(&self, table_name: &str, primary_key: i64) -> Result<Option<ChecksumRecord>> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::FindByKey, Some(primary_key))?;
        Ok(state
            .checksums
            .iter()
            .find(|r| r.table_name == table_name && r.primary_key == primary_key)
            .cloned())
    }

    async fn update(&self, record: &ChecksumRecord) -> Result<bool> {
        let id = record
            .id
            .ok_or_else(|| RowDriftError::validation("TableChecksum ID cannot be null"))?;
        validate_checksum_record(record)?;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::UpdateChecksum, Some(record.primary_key))?;

        match state.checksums.iter_mut().find(|r| r.id == Some(id)) {
            Some(existing) => {
                existing.table_name = record.table_name.clone();
                existing.primary_key = record.primary_key;
                existing.fingerprint = record.fingerprint;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_deleted_keys(
        &self,
        table_name: &str,
        key_column: &str,
        limit: usize,
    ) -> Result<Vec<ChecksumRecord>> {
        validate_snapshot_args(table_name, key_column)?;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::FindDeletedKeys, None)?;

        let live = state
            .tables
            .get(table_name)
            .ok_or_else(|| RowDriftError::Store(format!("Table not found: {}", table_name)))?;
        let live_keys: Vec<i64> = live
            .iter()
            .filter_map(|r| r.get(key_column).and_then(Value::as_i64))
            .collect();

        let audited = |pk: i64| {
            state.audit.iter().any(|e| {
                e.table_name == table_name && e.primary_key == pk && e.change_kind == ChangeKind::Delete
            })
        };
        let mut missing: Vec<ChecksumRecord> = state
            .checksums
            .iter()
            .filter(|r| {
                r.table_name == table_name
                    && !live_keys.contains(&r.primary_key)
                    && !audited(r.primary_key)
            })
            .cloned()
            .collect();
        missing.sort_by_key(|r| r.primary_key);
        missing.truncate(limit);
        Ok(missing)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<i64> {
        validate_audit_entry(entry)?;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::InsertAudit, Some(entry.primary_key))?;

        state.next_audit_id += 1;
        let id = state.next_audit_id;
        let mut stored = entry.clone();
        stored.id = Some(id);
        stored.timestamp = Some(entry.timestamp.unwrap_or_else(Utc::now));
        state.audit.push(stored);
        Ok(id)
    }

    async fn was_already_deleted(&self, table_name: &str, primary_key: i64) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.enter(StoreOp::WasAlreadyDeleted, Some(primary_key))?;
        Ok(state.audit.iter().any(|e| {
            e.table_name == table_name
                && e.primary_key == primary_key
                && e.change_kind == ChangeKind::Delete
        }))
    }

    async fn recent(&self, table_name: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        require_table_name(table_name)?;
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| e.table_name == table_name)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TableSnapshot for MemoryStore {
    async fn list_rows(&self, table_name: &str, order_column: &str) -> Result<Vec<Row>> {
        validate_snapshot_args(table_name, order_column)?;
        let mut state = self.state.lock().await;
        state.enter(StoreOp::ListRows, None)?;

        let mut rows = state
            .tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| RowDriftError::Store(format!("Table not found: {}", table_name)))?;
        rows.sort_by_key(|r| sort_key(r, order_column));
        Ok(rows)
    }
}
