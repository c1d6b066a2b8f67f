mod audit;
mod ledger;
mod memory;
mod snapshot;

pub use audit::{AuditEntry, AuditLog, ChangeKind};
pub use ledger::{ChecksumLedger, ChecksumRecord};
pub use memory::{MemoryStore, StoreOp};
pub use snapshot::TableSnapshot;

use crate::error::{Result, RowDriftError};

pub(crate) fn require_table_name(table_name: &str) -> Result<()> {
    if table_name.trim().is_empty() {
        return Err(RowDriftError::validation("Table name cannot be null or empty"));
    }
    Ok(())
}

pub(crate) fn validate_checksum_record(record: &ChecksumRecord) -> Result<()> {
    require_table_name(&record.table_name)
}

pub(crate) fn validate_audit_entry(entry: &AuditEntry) -> Result<()> {
    require_table_name(&entry.table_name)
}

pub(crate) fn validate_snapshot_args(table_name: &str, order_column: &str) -> Result<()> {
    require_table_name(table_name)?;
    if order_column.trim().is_empty() {
        return Err(RowDriftError::validation("Primary key name cannot be null or empty"));
    }
    Ok(())
}
