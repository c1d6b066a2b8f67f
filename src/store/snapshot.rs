use async_trait::async_trait;
use crate::error::Result;
use crate::row::Row;

/// Reads the live contents of a monitored table.
#[async_trait]
pub trait TableSnapshot: Send + Sync {
    /// Every live row, ascending by `order_column`.
    async fn list_rows(&self, table_name: &str, order_column: &str) -> Result<Vec<Row>>;
}
