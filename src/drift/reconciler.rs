use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use crate::config::MonitorConfig;
use crate::error::{Result, RowDriftError};
use crate::row::{Row, Value};
use crate::store::{AuditEntry, AuditLog, ChangeKind, ChecksumLedger, ChecksumRecord, TableSnapshot};
use super::checksum::RowChecksum;
use super::state::{PassReport, RecordedChange, RowFailure};

enum RowOutcome {
    Changed(RecordedChange),
    Unchanged,
}

/// Runs reconciliation passes for one monitored table.
///
/// A pass first audits keys that vanished from the live table, then walks the
/// live rows and records inserts and updates against the checksum ledger.
/// Callers must not run two passes for the same table concurrently.
pub struct Reconciler<'a> {
    config: MonitorConfig,
    checksum: RowChecksum,
    ledger: &'a dyn ChecksumLedger,
    audit: &'a dyn AuditLog,
    snapshot: &'a dyn TableSnapshot,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        config: MonitorConfig,
        ledger: &'a dyn ChecksumLedger,
        audit: &'a dyn AuditLog,
        snapshot: &'a dyn TableSnapshot,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            checksum: RowChecksum::new(config.column_order),
            config,
            ledger,
            audit,
            snapshot,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    /// Deletion detection followed by insert/update detection.
    ///
    /// Store failures abort the pass and are returned to the caller. Rows that
    /// fail validation are collected in the report unless `fail_fast` is set.
    /// Changes committed before a failure stay committed.
    #[instrument(name = "pass", skip(self), fields(table = %self.config.table_name))]
    pub async fn run_pass(&self) -> Result<PassReport> {
        debug!("Executing reconciliation pass");
        let mut report = PassReport::new(&self.config.table_name);

        self.process_deleted_rows(&mut report).await?;
        self.process_new_and_updated_rows(&mut report).await?;

        report.finish();
        info!(
            scanned = report.rows_scanned,
            changes = report.changes.len(),
            failures = report.failures.len(),
            "Pass complete"
        );
        Ok(report)
    }

    pub async fn detect_deletions(&self) -> Result<PassReport> {
        let mut report = PassReport::new(&self.config.table_name);
        self.process_deleted_rows(&mut report).await?;
        report.finish();
        Ok(report)
    }

    pub async fn detect_changes(&self) -> Result<PassReport> {
        let mut report = PassReport::new(&self.config.table_name);
        self.process_new_and_updated_rows(&mut report).await?;
        report.finish();
        Ok(report)
    }

    async fn process_deleted_rows(&self, report: &mut PassReport) -> Result<()> {
        let table = &self.config.table_name;
        let deleted = self
            .ledger
            .find_deleted_keys(table, &self.config.primary_key_column, self.config.max_deletes_per_pass)
            .await?;

        for record in deleted {
            let primary_key = record.primary_key;
            if self.audit.was_already_deleted(table, primary_key).await? {
                debug!(primary_key, "Already deleted row");
                report.already_deleted.push(primary_key);
                continue;
            }

            let entry = AuditEntry::new(table.as_str(), primary_key, ChangeKind::Delete).at(Utc::now());
            let audit_id = self.audit.insert(&entry).await?;
            info!(primary_key, "Deleted row");
            report.record(RecordedChange {
                primary_key,
                change_kind: ChangeKind::Delete,
                audit_id,
                fingerprint: None,
            });
        }

        Ok(())
    }

    async fn process_new_and_updated_rows(&self, report: &mut PassReport) -> Result<()> {
        let rows = self
            .snapshot
            .list_rows(&self.config.table_name, &self.config.primary_key_column)
            .await?;

        for row in &rows {
            report.rows_scanned += 1;

            let primary_key = match self.primary_key_of(row) {
                Ok(pk) => pk,
                Err(e) => {
                    self.handle_row_failure(report, None, e)?;
                    continue;
                }
            };

            match self.reconcile_row(row, primary_key).await {
                Ok(RowOutcome::Changed(change)) => report.record(change),
                Ok(RowOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => self.handle_row_failure(report, Some(primary_key), e)?,
            }
        }

        Ok(())
    }

    async fn reconcile_row(&self, row: &Row, primary_key: i64) -> Result<RowOutcome> {
        let table = &self.config.table_name;
        let fingerprint = self.checksum.calculate(row);

        let change_kind = match self.ledger.find_by_key(table, primary_key).await? {
            None => {
                let record = ChecksumRecord::new(table.as_str(), primary_key, fingerprint);
                self.ledger.insert(&record).await?;
                ChangeKind::Insert
            }
            Some(mut existing) if existing.fingerprint != fingerprint => {
                existing.fingerprint = fingerprint;
                if !self.ledger.update(&existing).await? {
                    warn!(primary_key, id = ?existing.id, "Checksum record vanished before update");
                }
                ChangeKind::Update
            }
            Some(_) => {
                debug!(primary_key, "No changes for row");
                return Ok(RowOutcome::Unchanged);
            }
        };

        let entry = AuditEntry::new(table.as_str(), primary_key, change_kind).at(Utc::now());
        let audit_id = self.audit.insert(&entry).await?;
        match change_kind {
            ChangeKind::Insert => info!(primary_key, fingerprint, "Inserted row"),
            _ => info!(primary_key, fingerprint, "Updated row"),
        }

        Ok(RowOutcome::Changed(RecordedChange {
            primary_key,
            change_kind,
            audit_id,
            fingerprint: Some(fingerprint),
        }))
    }

    fn primary_key_of(&self, row: &Row) -> Result<i64> {
        let column = &self.config.primary_key_column;
        match row.get(column) {
            None | Some(Value::Null) => Err(RowDriftError::validation(format!(
                "Row has no value for primary key column '{}'",
                column
            ))),
            Some(value) => value.as_i64().ok_or_else(|| {
                RowDriftError::validation(format!(
                    "Primary key column '{}' holds a non-integer {} value",
                    column,
                    value.type_name()
                ))
            }),
        }
    }

    fn handle_row_failure(
        &self,
        report: &mut PassReport,
        primary_key: Option<i64>,
        err: RowDriftError,
    ) -> Result<()> {
        if self.config.fail_fast || err.is_store_failure() {
            return Err(err);
        }
        error!(primary_key = ?primary_key, error = %err, "Row reconciliation failed");
        report.fail(RowFailure {
            primary_key,
            error: err.to_string(),
        });
        Ok(())
    }
}
