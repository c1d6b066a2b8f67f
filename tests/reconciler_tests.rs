use rowdrift::{
    AuditEntry, ChangeKind, ChecksumLedger, ChecksumRecord, ColumnOrder, MemoryStore,
    MonitorConfig, Reconciler, RowDriftError, Row, RowChecksum, StoreOp,
};

const TABLE: &str = "orders";
const KEY: &str = "order_id";

fn order(id: i64, status: &str, amount: i64) -> Row {
    Row::new()
        .with(KEY, id)
        .with("status", status)
        .with("amount", amount)
}

fn monitor() -> MonitorConfig {
    MonitorConfig::new(TABLE, KEY)
}

async fn seeded_store(rows: Vec<Row>) -> MemoryStore {
    let store = MemoryStore::new();
    store.set_table(TABLE, rows).await;
    store
}

fn kinds(entries: &[AuditEntry]) -> Vec<(i64, ChangeKind)> {
    entries.iter().map(|e| (e.primary_key, e.change_kind)).collect()
}

#[tokio::test]
async fn test_first_pass_inserts_every_row() {
    let store = seeded_store(vec![order(3, "new", 30), order(1, "new", 10), order(2, "paid", 20)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.rows_scanned, 3);
    assert_eq!(report.count(ChangeKind::Insert), 3);
    assert!(report.is_clean());
    assert!(report.finished_at.is_some());

    // Rows are visited in ascending key order.
    assert_eq!(
        kinds(&store.audit_entries().await),
        vec![(1, ChangeKind::Insert), (2, ChangeKind::Insert), (3, ChangeKind::Insert)]
    );
    assert_eq!(store.checksums().await.len(), 3);
}

#[tokio::test]
async fn test_repeated_pass_without_changes_is_idempotent() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "paid", 20)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    reconciler.run_pass().await.unwrap();
    let checksums_before = store.checksums().await;
    let audit_before = store.audit_entries().await.len();

    let second = reconciler.run_pass().await.unwrap();

    assert!(!second.has_changes());
    assert_eq!(second.unchanged, 2);
    assert_eq!(store.checksums().await, checksums_before);
    assert_eq!(store.audit_entries().await.len(), audit_before);
}

#[tokio::test]
async fn test_modified_row_produces_single_update() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    reconciler.run_pass().await.unwrap();

    store.upsert_row(TABLE, KEY, order(2, "shipped", 20)).await;
    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.count(ChangeKind::Update), 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.changes[0].primary_key, 2);

    let expected = RowChecksum::default().calculate(&order(2, "shipped", 20));
    let record = store.find_by_key(TABLE, 2).await.unwrap().unwrap();
    assert_eq!(record.fingerprint, expected);
    assert_eq!(report.changes[0].fingerprint, Some(expected));

    // The ledger keeps one record per key; updates never add rows.
    assert_eq!(store.checksums().await.len(), 2);
}

#[tokio::test]
async fn test_deletion_is_audited_exactly_once() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    reconciler.run_pass().await.unwrap();

    store.delete_row(TABLE, KEY, 2).await;
    let first = reconciler.run_pass().await.unwrap();
    let second = reconciler.run_pass().await.unwrap();

    assert_eq!(first.count(ChangeKind::Delete), 1);
    assert!(!second.has_changes());

    let deletes: Vec<_> = store
        .audit_entries()
        .await
        .into_iter()
        .filter(|e| e.change_kind == ChangeKind::Delete)
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].primary_key, 2);

    // Stale ledger records are the deletion signal and are never removed.
    assert!(store.find_by_key(TABLE, 2).await.unwrap().is_some());
}

#[tokio::test]
async fn test_later_deletion_is_audited_on_a_following_pass() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20), order(3, "new", 30)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    reconciler.run_pass().await.unwrap();

    store.delete_row(TABLE, KEY, 2).await;
    reconciler.run_pass().await.unwrap();

    // Key 2 stays in the ledger with its DELETE recorded; it must not mask key 3.
    store.delete_row(TABLE, KEY, 3).await;
    let report = reconciler.run_pass().await.unwrap();
    assert_eq!(report.count(ChangeKind::Delete), 1);
    assert_eq!(report.changes[0].primary_key, 3);

    for _ in 0..3 {
        assert!(!reconciler.run_pass().await.unwrap().has_changes());
    }

    let deleted: Vec<i64> = store
        .audit_entries()
        .await
        .iter()
        .filter(|e| e.change_kind == ChangeKind::Delete)
        .map(|e| e.primary_key)
        .collect();
    assert_eq!(deleted, vec![2, 3]);
}

#[tokio::test]
async fn test_default_limit_drains_gaps_one_per_pass() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20), order(3, "new", 30)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    reconciler.run_pass().await.unwrap();

    store.delete_row(TABLE, KEY, 2).await;
    store.delete_row(TABLE, KEY, 3).await;

    let first = reconciler.run_pass().await.unwrap();
    let second = reconciler.run_pass().await.unwrap();
    let third = reconciler.run_pass().await.unwrap();

    assert_eq!(first.changes.iter().map(|c| c.primary_key).collect::<Vec<_>>(), vec![2]);
    assert_eq!(second.changes.iter().map(|c| c.primary_key).collect::<Vec<_>>(), vec![3]);
    assert!(!third.has_changes());
}

#[tokio::test]
async fn test_higher_delete_limit_audits_several_gaps() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20), order(3, "new", 30)]).await;
    let reconciler = Reconciler::new(
        monitor().with_max_deletes_per_pass(5),
        &store, &store, &store,
    ).unwrap();
    reconciler.run_pass().await.unwrap();

    store.delete_row(TABLE, KEY, 1).await;
    store.delete_row(TABLE, KEY, 3).await;
    let report = reconciler.detect_deletions().await.unwrap();

    let deleted: Vec<i64> = report.changes.iter().map(|c| c.primary_key).collect();
    assert_eq!(deleted, vec![1, 3]);
    assert!(report.changes.iter().all(|c| c.change_kind == ChangeKind::Delete && c.fingerprint.is_none()));
}

#[tokio::test]
async fn test_deletions_run_before_row_scan() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    store.seed_checksum(ChecksumRecord::new(TABLE, 9, 0)).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    reconciler.run_pass().await.unwrap();

    assert_eq!(
        kinds(&store.audit_entries().await),
        vec![(9, ChangeKind::Delete), (1, ChangeKind::Insert)]
    );
}

#[tokio::test]
async fn test_row_failures_are_collected_and_scan_continues() {
    let store = seeded_store(vec![
        order(1, "new", 10),
        Row::new().with(KEY, "ord-9").with("status", "new"),
        order(2, "new", 20),
    ]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let report = reconciler.run_pass().await.unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].primary_key.is_none());
    assert!(report.failures[0].error.contains(KEY));
    assert_eq!(kinds(&store.audit_entries().await), vec![(1, ChangeKind::Insert), (2, ChangeKind::Insert)]);

    // The row is picked up by the next pass once its key is readable.
    store.set_table(TABLE, vec![order(1, "new", 10), order(9, "new", 90), order(2, "new", 20)]).await;
    let retry = reconciler.run_pass().await.unwrap();
    assert!(retry.is_clean());
    assert_eq!(retry.count(ChangeKind::Insert), 1);
    assert_eq!(retry.changes[0].primary_key, 9);
}

#[tokio::test]
async fn test_store_failure_in_row_scan_aborts_pass() {
    let store = seeded_store(vec![order(1, "new", 10), order(2, "new", 20), order(3, "new", 30)]).await;
    store.fail_on_key(StoreOp::InsertAudit, 2).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let err = reconciler.run_pass().await.unwrap_err();
    assert!(err.is_store_failure());

    assert_eq!(kinds(&store.audit_entries().await), vec![(1, ChangeKind::Insert)]);
    // The checksum for key 2 was written before its audit append failed; key 3 is never reached.
    let keys: Vec<i64> = store.checksums().await.iter().map(|r| r.primary_key).collect();
    assert_eq!(keys, vec![1, 2]);
    assert!(store.find_by_key(TABLE, 3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_failure_on_every_audit_insert_is_returned() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    store.fail_on(StoreOp::InsertAudit).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let result = reconciler.run_pass().await;

    assert!(matches!(result, Err(RowDriftError::Store(_))));
}

#[tokio::test]
async fn test_fail_fast_aborts_on_invalid_row_but_keeps_committed_changes() {
    let store = seeded_store(vec![
        Row::new().with(KEY, "ord-9").with("status", "new"),
        order(1, "new", 10),
    ]).await;
    store.seed_checksum(ChecksumRecord::new(TABLE, 7, 0)).await;
    let reconciler = Reconciler::new(monitor().fail_fast(), &store, &store, &store).unwrap();

    let err = reconciler.run_pass().await.unwrap_err();
    assert!(matches!(err, RowDriftError::Validation(_)));

    // The deletion recorded before the row scan stays recorded.
    assert_eq!(kinds(&store.audit_entries().await), vec![(7, ChangeKind::Delete)]);
    assert!(store.find_by_key(TABLE, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_snapshot_failure_aborts_pass() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    store.fail_on(StoreOp::ListRows).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    assert!(reconciler.run_pass().await.is_err());
    assert!(store.audit_entries().await.is_empty());
    assert_eq!(store.call_count(StoreOp::FindByKey).await, 0);
}

#[tokio::test]
async fn test_deletion_phase_failure_skips_row_scan() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    store.fail_on(StoreOp::FindDeletedKeys).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    assert!(reconciler.run_pass().await.is_err());
    assert_eq!(store.call_count(StoreOp::ListRows).await, 0);
}

#[tokio::test]
async fn test_missing_table_is_an_error() {
    let store = MemoryStore::new();
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let err = reconciler.run_pass().await.unwrap_err();
    assert!(err.to_string().contains(TABLE));
}

#[tokio::test]
async fn test_empty_table_is_a_clean_noop() {
    let store = seeded_store(vec![]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.rows_scanned, 0);
    assert!(!report.has_changes());
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_string_primary_key_is_parsed() {
    let store = seeded_store(vec![Row::new().with(KEY, "42").with("status", "new")]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.changes[0].primary_key, 42);
    assert!(store.find_by_key(TABLE, 42).await.unwrap().is_some());
}

#[tokio::test]
async fn test_null_primary_key_is_row_failure() {
    let store = seeded_store(vec![
        Row::new().with(KEY, Option::<i64>::None).with("status", "orphan"),
        order(1, "new", 10),
    ]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();

    let report = reconciler.run_pass().await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].primary_key.is_none());
    assert_eq!(report.count(ChangeKind::Insert), 1);
}

#[tokio::test]
async fn test_reused_key_after_deletion() {
    let store = seeded_store(vec![order(5, "new", 50)]).await;
    let reconciler = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    reconciler.run_pass().await.unwrap();

    store.delete_row(TABLE, KEY, 5).await;
    reconciler.run_pass().await.unwrap();

    // Same key comes back with different content: the stale ledger record
    // turns it into an UPDATE rather than an INSERT.
    store.upsert_row(TABLE, KEY, order(5, "reissued", 55)).await;
    let report = reconciler.run_pass().await.unwrap();
    assert_eq!(report.count(ChangeKind::Update), 1);
    assert_eq!(report.count(ChangeKind::Insert), 0);

    // A second deletion of the reused key is not audited again.
    store.delete_row(TABLE, KEY, 5).await;
    let report = reconciler.run_pass().await.unwrap();
    assert!(!report.has_changes());

    assert_eq!(
        kinds(&store.audit_entries().await),
        vec![(5, ChangeKind::Insert), (5, ChangeKind::Delete), (5, ChangeKind::Update)]
    );
}

#[tokio::test]
async fn test_sorted_order_ignores_column_permutation() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    let reconciler = Reconciler::new(
        monitor().with_column_order(ColumnOrder::Sorted),
        &store, &store, &store,
    ).unwrap();
    reconciler.run_pass().await.unwrap();

    let permuted = Row::new()
        .with("amount", 10)
        .with("status", "new")
        .with(KEY, 1);
    store.set_table(TABLE, vec![permuted]).await;

    let report = reconciler.run_pass().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert!(!report.has_changes());
}

#[tokio::test]
async fn test_tables_are_tracked_independently() {
    let store = seeded_store(vec![order(1, "new", 10)]).await;
    store.set_table("customers", vec![Row::new().with("customer_id", 1).with("name", "Ada")]).await;

    let orders = Reconciler::new(monitor(), &store, &store, &store).unwrap();
    let customers = Reconciler::new(MonitorConfig::new("customers", "customer_id"), &store, &store, &store).unwrap();

    orders.run_pass().await.unwrap();
    customers.run_pass().await.unwrap();

    assert_eq!(store.checksums().await.len(), 2);
    assert!(store.find_by_key("customers", 1).await.unwrap().is_some());

    store.delete_row("customers", "customer_id", 1).await;
    let report = orders.run_pass().await.unwrap();
    assert!(!report.has_changes());
}
