use async_trait::async_trait;
use chrono::Utc;
use crate::error::Result;
use crate::row::Row;
use crate::store::{require_table_name, validate_audit_entry, AuditEntry, AuditLog, ChangeKind};
use super::client::BqClient;
use super::sql::{int_column, new_row_id, string_column, string_literal, table_ref, timestamp_column, timestamp_literal};

pub const AUDIT_TABLE: &str = "_rowdrift_audit";

/// Append-only audit trail kept in a BigQuery table of the tracking dataset.
pub struct BqAuditLog {
    client: BqClient,
    dataset: String,
}

impl BqAuditLog {
    pub fn new(client: BqClient, dataset: impl Into<String>) -> Self {
        Self {
            client,
            dataset: dataset.into(),
        }
    }

    fn table(&self) -> Result<String> {
        table_ref(self.client.project_id(), &self.dataset, AUDIT_TABLE)
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let create_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INT64 NOT NULL,
                primary_key INT64 NOT NULL,
                table_name STRING NOT NULL,
                change_kind STRING NOT NULL,
                change_timestamp TIMESTAMP NOT NULL
            )
            PARTITION BY DATE(change_timestamp)
            CLUSTER BY table_name, primary_key
            "#,
            table = self.table()?,
        );

        self.client.execute(&create_sql, "ensure_audit_table").await?;
        Ok(())
    }
}

fn entry_from_row(row: &Row, operation: &str) -> Result<AuditEntry> {
    let change_kind: ChangeKind = string_column(row, "change_kind", operation)?.parse()?;
    Ok(AuditEntry {
        id: Some(int_column(row, "id", operation)?),
        table_name: string_column(row, "table_name", operation)?,
        primary_key: int_column(row, "primary_key", operation)?,
        change_kind,
        timestamp: timestamp_column(row, "change_timestamp"),
    })
}

#[async_trait]
impl AuditLog for BqAuditLog {
    async fn insert(&self, entry: &AuditEntry) -> Result<i64> {
        validate_audit_entry(entry)?;
        let id = new_row_id();
        let timestamp = entry.timestamp.unwrap_or_else(Utc::now);

        let sql = format!(
            r#"
            INSERT INTO {table} (id, primary_key, table_name, change_kind, change_timestamp)
            VALUES ({id}, {primary_key}, {table_name}, '{change_kind}', {timestamp})
            "#,
            table = self.table()?,
            id = id,
            primary_key = entry.primary_key,
            table_name = string_literal(&entry.table_name),
            change_kind = entry.change_kind.as_str(),
            timestamp = timestamp_literal(&timestamp),
        );

        self.client.execute(&sql, "insert_audit").await?;
        Ok(id)
    }

    async fn was_already_deleted(&self, table_name: &str, primary_key: i64) -> Result<bool> {
        let sql = format!(
            r#"
            SELECT COUNT(*) AS deletions
            FROM {table}
            WHERE table_name = {table_name}
              AND primary_key = {primary_key}
              AND change_kind = 'DELETE'
            "#,
            table = self.table()?,
            table_name = string_literal(table_name),
            primary_key = primary_key,
        );

        let count = self.client.query_single_int(&sql, "was_already_deleted").await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn recent(&self, table_name: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        require_table_name(table_name)?;
        let sql = format!(
            r#"
            SELECT id, primary_key, table_name, change_kind, change_timestamp
            FROM {table}
            WHERE table_name = {table_name}
            ORDER BY change_timestamp DESC
            LIMIT {limit}
            "#,
            table = self.table()?,
            table_name = string_literal(table_name),
            limit = limit,
        );

        let rows = self.client.query_rows(&sql, "recent_audit").await?;
        rows.iter().map(|r| entry_from_row(r, "recent_audit")).collect()
    }
}
