use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::store::ChangeKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedChange {
    pub primary_key: i64,
    pub change_kind: ChangeKind,
    pub audit_id: i64,
    pub fingerprint: Option<u32>,
}

/// A live row skipped because it could not be reconciled.
#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    /// `None` when the row's key could not be read.
    pub primary_key: Option<i64>,
    pub error: String,
}

/// Outcome of one reconciliation pass over a single table.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub table_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows_scanned: usize,
    pub unchanged: usize,
    /// Deleted keys whose DELETE was recorded by an earlier pass.
    pub already_deleted: Vec<i64>,
    pub changes: Vec<RecordedChange>,
    pub failures: Vec<RowFailure>,
}

impl PassReport {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            started_at: Utc::now(),
            finished_at: None,
            rows_scanned: 0,
            unchanged: 0,
            already_deleted: Vec::new(),
            changes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, change: RecordedChange) {
        self.changes.push(change);
    }

    pub fn fail(&mut self, failure: RowFailure) {
        self.failures.push(failure);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.change_kind == kind).count()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at.map(|f| (f - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(pk: i64, kind: ChangeKind) -> RecordedChange {
        RecordedChange { primary_key: pk, change_kind: kind, audit_id: pk, fingerprint: None }
    }

    #[test]
    fn test_counts_by_kind() {
        let mut report = PassReport::new("orders");
        report.record(change(1, ChangeKind::Insert));
        report.record(change(2, ChangeKind::Insert));
        report.record(change(3, ChangeKind::Delete));

        assert_eq!(report.count(ChangeKind::Insert), 2);
        assert_eq!(report.count(ChangeKind::Update), 0);
        assert_eq!(report.count(ChangeKind::Delete), 1);
        assert!(report.has_changes());
    }

    #[test]
    fn test_failures_make_report_unclean() {
        let mut report = PassReport::new("orders");
        assert!(report.is_clean());
        report.fail(RowFailure { primary_key: Some(4), error: "boom".into() });
        assert!(!report.is_clean());
    }

    #[test]
    fn test_duration_after_finish() {
        let mut report = PassReport::new("orders");
        assert!(report.duration_ms().is_none());
        report.finish();
        assert!(report.duration_ms().unwrap() >= 0);
    }
}
