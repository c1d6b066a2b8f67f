use async_trait::async_trait;
use crate::error::{BigQueryError, Result, RowDriftError};
use crate::row::Row;
use crate::store::{validate_checksum_record, validate_snapshot_args, ChecksumLedger, ChecksumRecord};
use super::audit::AUDIT_TABLE;
use super::client::BqClient;
use super::sql::{ident, int_column, new_row_id, string_column, string_literal, table_ref};

pub const CHECKSUM_TABLE: &str = "_rowdrift_checksums";

/// Checksum ledger kept in a BigQuery table of the tracking dataset.
pub struct BqLedger {
    client: BqClient,
    tracking_dataset: String,
    source_dataset: String,
}

impl BqLedger {
    /// `source_dataset` holds the monitored tables the deletion anti-join reads.
    pub fn new(client: BqClient, tracking_dataset: impl Into<String>, source_dataset: impl Into<String>) -> Self {
        Self {
            client,
            tracking_dataset: tracking_dataset.into(),
            source_dataset: source_dataset.into(),
        }
    }

    fn table(&self) -> Result<String> {
        table_ref(self.client.project_id(), &self.tracking_dataset, CHECKSUM_TABLE)
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let create_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INT64 NOT NULL,
                table_name STRING NOT NULL,
                primary_key INT64 NOT NULL,
                fingerprint INT64 NOT NULL
            )
            CLUSTER BY table_name, primary_key
            "#,
            table = self.table()?,
        );

        self.client.execute(&create_sql, "ensure_checksum_table").await?;
        Ok(())
    }

    fn select_columns() -> &'static str {
        "c.id, c.table_name, c.primary_key, c.fingerprint"
    }
}

fn record_from_row(row: &Row, operation: &str) -> Result<ChecksumRecord> {
    let fingerprint = int_column(row, "fingerprint", operation)?;
    let fingerprint = u32::try_from(fingerprint).map_err(|_| {
        RowDriftError::BigQuery(BigQueryError::UnexpectedResponse {
            operation: operation.to_string(),
            message: format!("fingerprint {} does not fit in 32 bits", fingerprint),
        })
    })?;

    Ok(ChecksumRecord {
        id: Some(int_column(row, "id", operation)?),
        table_name: string_column(row, "table_name", operation)?,
        primary_key: int_column(row, "primary_key", operation)?,
        fingerprint,
    })
}

#[async_trait]
impl ChecksumLedger for BqLedger {
    async fn insert(&self, record: &ChecksumRecord) -> Result<i64> {
        validate_checksum_record(record)?;
        let id = new_row_id();

        let sql = format!(
            r#"
            INSERT INTO {table} (id, table_name, primary_key, fingerprint)
            VALUES ({id}, {table_name}, {primary_key}, {fingerprint})
            "#,
            table = self.table()?,
            id = id,
            table_name = string_literal(&record.table_name),
            primary_key = record.primary_key,
            fingerprint = record.fingerprint,
        );

        self.client.execute(&sql, "insert_checksum").await?;
        Ok(id)
    }

    async fn find_by_key(&self, table_name: &str, primary_key: i64) -> Result<Option<ChecksumRecord>> {
        let sql = format!(
            r#"
            SELECT {columns}
            FROM {table} c
            WHERE c.table_name = {table_name}
              AND c.primary_key = {primary_key}
            LIMIT 1
            "#,
            columns = Self::select_columns(),
            table = self.table()?,
            table_name = string_literal(table_name),
            primary_key = primary_key,
        );

        let rows = self.client.query_rows(&sql, "find_checksum").await?;
        rows.first().map(|r| record_from_row(r, "find_checksum")).transpose()
    }

    async fn update(&self, record: &ChecksumRecord) -> Result<bool> {
        let id = record
            .id
            .ok_or_else(|| RowDriftError::validation("TableChecksum ID cannot be null"))?;
        validate_checksum_record(record)?;

        let sql = format!(
            r#"
            UPDATE {table}
            SET table_name = {table_name}, primary_key = {primary_key}, fingerprint = {fingerprint}
            WHERE id = {id}
            "#,
            table = self.table()?,
            table_name = string_literal(&record.table_name),
            primary_key = record.primary_key,
            fingerprint = record.fingerprint,
            id = id,
        );

        let affected = self.client.execute(&sql, "update_checksum").await?;
        Ok(affected > 0)
    }

    async fn find_deleted_keys(
        &self,
        table_name: &str,
        key_column: &str,
        limit: usize,
    ) -> Result<Vec<ChecksumRecord>> {
        validate_snapshot_args(table_name, key_column)?;
        let sql = deleted_keys_sql(
            self.client.project_id(),
            &self.tracking_dataset,
            &self.source_dataset,
            table_name,
            key_column,
            limit,
        )?;

        let rows = self.client.query_rows(&sql, "find_deleted_keys").await?;
        rows.iter().map(|r| record_from_row(r, "find_deleted_keys")).collect()
    }
}

/// Ledger records with no live row and no recorded DELETE.
fn deleted_keys_sql(
    project: &str,
    tracking_dataset: &str,
    source_dataset: &str,
    table_name: &str,
    key_column: &str,
    limit: usize,
) -> Result<String> {
    // NOT IN would match nothing once the live key column holds a NULL.
    Ok(format!(
        r#"
        SELECT {columns}
        FROM {table} c
        WHERE c.table_name = {table_name}
          AND NOT EXISTS (
            SELECT 1 FROM {live} t WHERE t.{key} = c.primary_key
          )
          AND NOT EXISTS (
            SELECT 1 FROM {audit} a
            WHERE a.table_name = c.table_name
              AND a.primary_key = c.primary_key
              AND a.change_kind = 'DELETE'
          )
        ORDER BY c.primary_key
        LIMIT {limit}
        "#,
        columns = BqLedger::select_columns(),
        table = table_ref(project, tracking_dataset, CHECKSUM_TABLE)?,
        table_name = string_literal(table_name),
        live = table_ref(project, source_dataset, table_name)?,
        key = ident(key_column)?,
        audit = table_ref(project, tracking_dataset, AUDIT_TABLE)?,
        limit = limit,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_row() {
        let row = Row::new()
            .with("id", 9)
            .with("table_name", "orders")
            .with("primary_key", 12)
            .with("fingerprint", 4_000_000_000i64);

        let record = record_from_row(&row, "test").unwrap();
        assert_eq!(record, ChecksumRecord::new("orders", 12, 4_000_000_000).with_id(9));
    }

    #[test]
    fn test_record_from_row_rejects_oversized_fingerprint() {
        let row = Row::new()
            .with("id", 1)
            .with("table_name", "orders")
            .with("primary_key", 1)
            .with("fingerprint", 1i64 << 40);

        assert!(record_from_row(&row, "test").is_err());
    }

    #[test]
    fn test_deleted_keys_sql_skips_audited_deletions() {
        let sql = deleted_keys_sql("proj", "rowdrift", "sales", "orders", "order_id", 3).unwrap();

        assert!(sql.contains("FROM `proj.rowdrift._rowdrift_checksums` c"));
        assert!(sql.contains("SELECT 1 FROM `proj.sales.orders` t WHERE t.`order_id` = c.primary_key"));
        assert!(sql.contains("SELECT 1 FROM `proj.rowdrift._rowdrift_audit` a"));
        assert!(sql.contains("AND a.change_kind = 'DELETE'"));
        assert!(sql.contains("LIMIT 3"));
    }

    #[test]
    fn test_deleted_keys_sql_rejects_unsafe_key_column() {
        assert!(deleted_keys_sql("proj", "rowdrift", "sales", "orders", "id; DROP", 1).is_err());
    }
}
