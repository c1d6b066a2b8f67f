mod checksum;
mod state;
mod reconciler;

pub use checksum::{ColumnOrder, RowChecksum};
pub use state::{PassReport, RecordedChange, RowFailure};
pub use reconciler::Reconciler;
