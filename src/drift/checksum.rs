use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use crate::error::{Result, RowDriftError};
use crate::row::Row;

/// Order in which a row's columns are fed into the fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnOrder {
    /// As materialized by the snapshot read. Compatible with fingerprints
    /// already stored by earlier passes.
    #[default]
    Natural,
    /// Column names ascending, independent of materialization order.
    Sorted,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowChecksum {
    order: ColumnOrder,
}

impl RowChecksum {
    pub fn new(order: ColumnOrder) -> Self {
        Self { order }
    }

    /// CRC-32 over each column name followed by its canonical value; nulls
    /// contribute the name only. An empty row yields 0.
    pub fn calculate(&self, row: &Row) -> u32 {
        let mut hasher = Hasher::new();
        match self.order {
            ColumnOrder::Natural => {
                for (name, value) in row.iter() {
                    feed(&mut hasher, name, value.canonical());
                }
            }
            ColumnOrder::Sorted => {
                let mut columns: Vec<_> = row.iter().collect();
                columns.sort_by(|a, b| a.0.cmp(b.0));
                for (name, value) in columns {
                    feed(&mut hasher, name, value.canonical());
                }
            }
        }
        hasher.finalize()
    }

    /// Same as [`calculate`](Self::calculate) for callers holding an optional row.
    pub fn try_calculate(&self, row: Option<&Row>) -> Result<u32> {
        row.map(|r| self.calculate(r))
            .ok_or_else(|| RowDriftError::InvalidInput("Row cannot be absent".to_string()))
    }
}

fn feed(hasher: &mut Hasher, name: &str, canonical: Option<String>) {
    hasher.update(name.as_bytes());
    if let Some(value) = canonical {
        hasher.update(value.as_bytes());
    }
}
