mod audit;
mod client;
mod ledger;
mod snapshot;
mod sql;

pub use audit::{BqAuditLog, AUDIT_TABLE};
pub use client::BqClient;
pub use ledger::{BqLedger, CHECKSUM_TABLE};
pub use snapshot::BqSnapshot;

use crate::error::Result;

/// Ledger, audit log and snapshot reader sharing one client.
pub struct BqStores {
    pub ledger: BqLedger,
    pub audit: BqAuditLog,
    pub snapshot: BqSnapshot,
}

impl BqStores {
    pub fn new(client: BqClient, source_dataset: &str, tracking_dataset: &str) -> Self {
        Self {
            ledger: BqLedger::new(client.clone(), tracking_dataset, source_dataset),
            audit: BqAuditLog::new(client.clone(), tracking_dataset),
            snapshot: BqSnapshot::new(client, source_dataset),
        }
    }

    /// Creates the tracking dataset and both tracking tables if missing.
    pub async fn init(client: &BqClient, tracking_dataset: &str) -> Result<()> {
        client.ensure_dataset(tracking_dataset).await?;
        BqLedger::new(client.clone(), tracking_dataset, tracking_dataset).ensure_table().await?;
        BqAuditLog::new(client.clone(), tracking_dataset).ensure_table().await?;
        Ok(())
    }
}
