pub mod error;
pub mod row;
pub mod config;
pub mod store;
pub mod drift;
pub mod bigquery;

pub use error::{RowDriftError, Result};
pub use row::{Row, Value};
pub use config::{AppConfig, MonitorConfig, ScheduleConfig};
pub use store::{AuditEntry, AuditLog, ChangeKind, ChecksumLedger, ChecksumRecord, MemoryStore, StoreOp, TableSnapshot};
pub use drift::{ColumnOrder, PassReport, Reconciler, RecordedChange, RowChecksum, RowFailure};
pub use bigquery::{BqAuditLog, BqClient, BqLedger, BqSnapshot, BqStores};
