use async_trait::async_trait;
use crate::error::Result;
use crate::row::Row;
use crate::store::{validate_snapshot_args, TableSnapshot};
use super::client::BqClient;
use super::sql::{ident, table_ref};

/// Full-table reads of monitored tables in one dataset.
pub struct BqSnapshot {
    client: BqClient,
    dataset: String,
}

impl BqSnapshot {
    pub fn new(client: BqClient, dataset: impl Into<String>) -> Self {
        Self {
            client,
            dataset: dataset.into(),
        }
    }

    fn select_sql(&self, table_name: &str, order_column: &str) -> Result<String> {
        Ok(format!(
            "SELECT * FROM {table} ORDER BY {order}",
            table = table_ref(self.client.project_id(), &self.dataset, table_name)?,
            order = ident(order_column)?,
        ))
    }
}

#[async_trait]
impl TableSnapshot for BqSnapshot {
    async fn list_rows(&self, table_name: &str, order_column: &str) -> Result<Vec<Row>> {
        validate_snapshot_args(table_name, order_column)?;
        let sql = self.select_sql(table_name, order_column)?;
        self.client.query_rows(&sql, "list_rows").await
    }
}
