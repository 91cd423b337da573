//! PostgreSQL store tests
//!
//! Need a reachable database in `DATABASE_URL`; run with
//! `cargo test -p hdir-server --test pg_store_tests -- --ignored`.

use hdir_server::{
    models::{
        BulkStatus, ErrorDetail, HospitalFilter, HospitalPatch, NewHospital, NewOperation,
        Progress,
    },
    store::{HospitalStore, OperationStore, PgStore, RecordStore, StoreError},
};
use sqlx::PgPool;

async fn open_batch(store: &PgStore, id: &str, rows: i64) {
    store
        .create_operation(NewOperation {
            id: id.to_string(),
            total_rows: rows,
            file_content: Some(b"name,address\nA,1\n".to_vec()),
        })
        .await
        .unwrap();
}

fn hospital(name: &str, batch_id: &str) -> NewHospital {
    NewHospital {
        name: name.to_string(),
        address: "1 Main St".to_string(),
        phone: None,
        creation_batch_id: batch_id.to_string(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_activation_is_all_or_nothing(pool: PgPool) {
    let store = PgStore::new(pool);
    store.health_check().await.unwrap();
    open_batch(&store, "batch", 2).await;

    store.insert(hospital("A", "batch")).await.unwrap();
    store.insert(hospital("B", "batch")).await.unwrap();
    let inactive = store.query(&HospitalFilter::batch("batch")).await.unwrap();
    assert!(inactive.iter().all(|r| !r.active));

    assert_eq!(store.complete_and_activate("batch").await.unwrap(), Some(2));
    let active = store.query(&HospitalFilter::batch("batch")).await.unwrap();
    assert!(active.iter().all(|r| r.active));

    // Already completed: nothing changes
    assert_eq!(store.complete_and_activate("batch").await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_checkpoint_and_transition(pool: PgPool) {
    let store = PgStore::new(pool);
    open_batch(&store, "batch", 4).await;

    let applied = store
        .checkpoint(
            "batch",
            Progress {
                current_row: 2,
                processed_rows: 1,
                failed_rows: 1,
            },
            &[ErrorDetail {
                row: 2,
                error: "Name and address are required".into(),
                data: "{}".into(),
            }],
        )
        .await
        .unwrap();
    assert!(applied);

    assert!(store
        .transition("batch", &[BulkStatus::InProgress], BulkStatus::Paused, None)
        .await
        .unwrap());
    assert!(!store
        .transition("batch", &[BulkStatus::InProgress], BulkStatus::Paused, None)
        .await
        .unwrap());
    assert!(store
        .transition("batch", &[BulkStatus::Paused], BulkStatus::InProgress, Some(3))
        .await
        .unwrap());

    let op = store.get_operation("batch").await.unwrap().unwrap();
    assert_eq!(op.status, BulkStatus::InProgress);
    assert_eq!(op.current_row, 3);
    assert_eq!(op.failed_rows, 1);
    assert_eq!(op.error_details.len(), 1);
    assert!(op.has_content());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_cascade_delete(pool: PgPool) {
    let store = PgStore::new(pool);
    open_batch(&store, "batch", 1).await;
    store.insert(hospital("A", "batch")).await.unwrap();

    assert_eq!(store.delete_operation_cascade("batch").await.unwrap(), Some(1));
    assert!(store.get_operation("batch").await.unwrap().is_none());
    assert_eq!(store.count(&HospitalFilter::batch("batch")).await.unwrap(), 0);
    assert_eq!(store.delete_operation_cascade("batch").await.unwrap(), None);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_insert_requires_operation(pool: PgPool) {
    let store = PgStore::new(pool);
    assert!(store.insert(hospital("A", "missing")).await.is_err());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_update_sets_and_clears_phone(pool: PgPool) {
    let store = PgStore::new(pool);
    open_batch(&store, "batch", 1).await;
    let record = store.insert(hospital("A", "batch")).await.unwrap();

    let patch = HospitalPatch {
        phone: Some(Some("555-0100".into())),
        ..Default::default()
    };
    let updated = store.update(record.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.phone.as_deref(), Some("555-0100"));

    let patch = HospitalPatch {
        name: Some("A East".into()),
        ..Default::default()
    };
    let updated = store.update(record.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.phone.as_deref(), Some("555-0100"));

    let patch = HospitalPatch {
        phone: Some(None),
        ..Default::default()
    };
    let updated = store.update(record.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.phone, None);
    assert_eq!(updated.name, "A East");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_bulk_insert_keeps_row_order(pool: PgPool) {
    let store = PgStore::new(pool);
    open_batch(&store, "batch", 3).await;

    let records = store
        .bulk_insert(vec![hospital("A", "batch"), hospital("B", "batch"), hospital("C", "batch")])
        .await
        .unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["A", "B", "C"]);
    assert!(records.iter().all(|r| !r.active));

    let err = store
        .bulk_insert(vec![hospital("D", "batch"), hospital("E", "missing")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownBatch(_)));
    assert_eq!(store.count(&HospitalFilter::batch("batch")).await.unwrap(), 3);
}
