//! End-to-end ingestion scenarios over the engine, tracker and scheduler

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{setup_state, FaultyStore};
use hdir_ingest::{interpret, prepare, InterpretOptions, PreparedBatch};
use hdir_server::{
    ingest::{IngestError, RunOptions},
    models::{BulkStatus, HospitalFilter},
    store::{HospitalStore, MemoryStore, OperationStore},
};

fn prepared(csv: &str) -> PreparedBatch {
    prepare(&interpret(csv.as_bytes(), InterpretOptions::default()).unwrap())
}

fn csv_of(count: usize) -> String {
    let mut csv = String::from("name,address,phone\n");
    for i in 1..=count {
        csv.push_str(&format!("Hospital {i},{i} Main St,555-{i:04}\n"));
    }
    csv
}

#[tokio::test]
async fn test_clean_batch_activates_every_record() {
    let store = Arc::new(MemoryStore::new());
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(5));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let result = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, BulkStatus::Completed);
    assert!(result.activated);
    assert_eq!(result.processed, 5);

    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.active));

    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.current_row, 5);
    assert!(op.completed_at.is_some());
}

#[tokio::test]
async fn test_one_bad_row_keeps_whole_batch_inactive() {
    let store = Arc::new(MemoryStore::new());
    let state = setup_state(store.clone());
    let batch = prepared("name,address\nA,1 Main\n,2 Main\nC,3 Main\n");

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let result = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, BulkStatus::Failed);
    assert_eq!((result.processed, result.failed), (2, 1));

    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.active));

    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.error_details.len(), 1);
    assert_eq!(op.error_details[0].row, 2);
}

#[tokio::test]
async fn test_store_fault_is_recorded_against_its_row() {
    let store = Arc::new(FaultyStore::new());
    store.fail_insert_of("Hospital 2");
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(3));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let result = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, BulkStatus::Failed);
    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.failed_rows, 1);
    assert_eq!(op.error_details[0].row, 2);
    assert!(op.error_details[0].error.contains("injected insert fault"));
}

#[tokio::test]
async fn test_rejected_bulk_insert_falls_back_to_single_rows() {
    let store = Arc::new(FaultyStore::new());
    store.fail_insert_of("Hospital 2");
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(4));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let options = RunOptions {
        checkpoint_interval: 10,
        row_delay: Duration::ZERO,
    };
    let result = state.engine.run(&op.id, &batch.rows, options).await.unwrap();

    assert_eq!(result.status, BulkStatus::Failed);
    assert_eq!((result.processed, result.failed), (3, 1));
    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.current_row, 4);
    assert_eq!(op.error_details.len(), 1);
    assert_eq!(op.error_details[0].row, 2);

    let names: Vec<String> = store
        .query(&HospitalFilter::batch(&op.id))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, ["Hospital 1", "Hospital 3", "Hospital 4"]);
}

#[tokio::test]
async fn test_pause_then_resume_finishes_without_duplicates() {
    let store = Arc::new(FaultyStore::new());
    store.pause_after_inserts(3);
    let state = setup_state(store.clone());
    let csv = csv_of(6);
    let batch = prepared(&csv);

    let op = state
        .engine
        .open_batch(&batch, Some(csv.clone().into_bytes()))
        .await
        .unwrap();
    let first = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(first.status, BulkStatus::Paused);
    assert_eq!(first.processed, 3);
    assert!(!first.activated);
    let paused = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(paused.current_row, 3);

    let plan = state.tracker.prepare_resume(&op.id, None).await.unwrap();
    assert_eq!(plan.summary().resumed_from_row, 4);
    let second = state
        .engine
        .run(&op.id, &plan.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(second.status, BulkStatus::Completed);
    assert_eq!(second.processed, 6);
    assert_eq!(second.outcomes.len(), 3);
    assert_eq!(second.outcomes[0].row(), 4);

    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.active));
}

#[tokio::test]
async fn test_resume_past_checkpoint_never_activates() {
    let store = Arc::new(FaultyStore::new());
    store.pause_after_inserts(1);
    let state = setup_state(store.clone());
    let csv = csv_of(6);
    let batch = prepared(&csv);

    let op = state
        .engine
        .open_batch(&batch, Some(csv.clone().into_bytes()))
        .await
        .unwrap();
    let first = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first.status, BulkStatus::Paused);

    let plan = state.tracker.prepare_resume(&op.id, Some(5)).await.unwrap();
    assert_eq!(plan.summary().resumed_from_row, 5);
    let second = state
        .engine
        .run(&op.id, &plan.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(second.status, BulkStatus::Failed);
    assert!(!second.activated);
    assert_eq!((second.processed, second.failed), (3, 3));

    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.current_row, 6);
    assert!(op.processed_rows + op.failed_rows <= op.current_row);
    let skipped: Vec<i64> = op.error_details.iter().map(|e| e.row).collect();
    assert_eq!(skipped, [2, 3, 4]);

    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| !r.active));
}

#[tokio::test]
async fn test_resume_failed_batch_after_fixing_store() {
    let store = Arc::new(FaultyStore::new());
    store.fail_insert_of("Hospital 4");
    store.pause_after_inserts(3);
    let state = setup_state(store.clone());
    let csv = csv_of(5);
    let batch = prepared(&csv);

    let op = state
        .engine
        .open_batch(&batch, Some(csv.clone().into_bytes()))
        .await
        .unwrap();
    let first = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first.status, BulkStatus::Paused);

    // Resuming continues after the checkpoint; row 4 still fails
    let plan = state.tracker.prepare_resume(&op.id, None).await.unwrap();
    let second = state
        .engine
        .run(&op.id, &plan.rows, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(second.status, BulkStatus::Failed);
    assert_eq!((second.processed, second.failed), (4, 1));

    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.current_row, 5);
    assert_eq!(op.error_details.len(), 1);
    assert_eq!(op.error_details[0].row, 4);
    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert!(records.iter().all(|r| !r.active));
}

#[tokio::test]
async fn test_activation_retried_before_failing() {
    let store = Arc::new(FaultyStore::new());
    store.fail_activations(1);
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(2));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let result = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, BulkStatus::Completed);
    assert!(result.activated);
}

#[tokio::test]
async fn test_exhausted_activation_fails_batch() {
    let store = Arc::new(FaultyStore::new());
    store.fail_activations(u32::MAX);
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(2));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let result = state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, BulkStatus::Failed);
    assert!(!result.activated);

    let stored = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(stored.error_details.len(), 1);
    assert_eq!(stored.error_details[0].row, 0);
    assert!(stored.error_details[0]
        .error
        .starts_with("Batch activation failed"));

    let records = store.query(&HospitalFilter::batch(&op.id)).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.active));
}

#[tokio::test]
async fn test_delete_during_run_cancels_pass() {
    let store = Arc::new(MemoryStore::new());
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(20));
    assert_eq!(batch.rows.len(), 20);

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let engine = state.engine.clone();
    let id = op.id.clone();
    let rows = batch.rows.clone();
    let task = tokio::spawn(async move {
        engine
            .run(&id, &rows, RunOptions::every_row(Duration::from_millis(20)))
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    state.tracker.delete(&op.id).await.unwrap();

    let outcome = task.await.unwrap();
    assert!(matches!(outcome, Err(IngestError::Cancelled(_))));
    assert!(store.get_operation(&op.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_subscriber_sees_final_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(3));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let mut receiver = state.progress.register(&op.id);
    state
        .engine
        .run(&op.id, &batch.rows, RunOptions::default())
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Ok(snapshot) = receiver.try_recv() {
        seen.push(snapshot);
    }

    assert!(seen.len() >= 3);
    let rows: Vec<i64> = seen.iter().map(|s| s.current_row).collect();
    assert!(rows.windows(2).all(|w| w[0] <= w[1]));
    let last = seen.last().unwrap();
    assert_eq!(last.status, BulkStatus::Completed);
    assert_eq!(last.progress_percentage, 100.0);
}

#[tokio::test]
async fn test_scheduled_batch_runs_to_completion() {
    let store = Arc::new(MemoryStore::new());
    let state = setup_state(store.clone());
    let batch = prepared(&csv_of(4));

    let op = state.engine.open_batch(&batch, None).await.unwrap();
    let engine = state.engine.clone();
    let id = op.id.clone();
    let handle = state
        .scheduler
        .submit(&op.id, async move {
            engine.run(&id, &batch.rows, RunOptions::default()).await
        })
        .unwrap();

    handle.await.unwrap();
    assert!(!state.scheduler.is_running(&op.id));
    let op = store.get_operation(&op.id).await.unwrap().unwrap();
    assert_eq!(op.status, BulkStatus::Completed);
    assert_eq!(op.processed_rows, 4);
}
