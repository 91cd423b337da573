//! Background batch scheduler
//!
//! Each batch runs as its own tokio task. A supervisor task awaits it and
//! turns an error or panic into a failed operation, so a batch is never left
//! `in_progress` with nothing driving it. At most one task per batch id runs
//! at a time.
//!
//! Synchronous uploads go through [`BatchScheduler::run`], which waits for
//! the same supervised task. A caller that goes away mid-request leaves the
//! batch running to its end.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::engine::IngestError;
use super::progress::ProgressPublisher;
use super::types::BatchResult;
use crate::models::ErrorDetail;
use crate::store::{OperationStore, RecordStore};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Bulk operation '{0}' already has a running task")]
    AlreadyRunning(String),

    #[error("Bulk operation '{batch_id}' aborted: {error}")]
    Aborted { batch_id: String, error: String },
}

#[derive(Clone)]
pub struct BatchScheduler {
    running: Arc<Mutex<HashSet<String>>>,
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn ProgressPublisher>,
}

impl BatchScheduler {
    pub fn new(store: Arc<dyn RecordStore>, publisher: Arc<dyn ProgressPublisher>) -> Self {
        Self {
            running: Arc::new(Mutex::new(HashSet::new())),
            store,
            publisher,
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self, batch_id: &str) -> bool {
        self.running().contains(batch_id)
    }

    pub fn running_count(&self) -> usize {
        self.running().len()
    }

    /// Run `task` for `batch_id` in the background.
    ///
    /// The returned handle completes once the task has finished and any
    /// failure has been recorded.
    pub fn submit<F>(&self, batch_id: &str, task: F) -> Result<JoinHandle<()>, SchedulerError>
    where
        F: Future<Output = Result<BatchResult, IngestError>> + Send + 'static,
    {
        if !self.running().insert(batch_id.to_string()) {
            return Err(SchedulerError::AlreadyRunning(batch_id.to_string()));
        }

        let worker = tokio::spawn(task);
        let scheduler = self.clone();
        let batch_id = batch_id.to_string();
        tracing::info!(batch_id = %batch_id, "Batch task scheduled");

        Ok(tokio::spawn(async move {
            let fault = match worker.await {
                Ok(Ok(result)) => {
                    tracing::info!(
                        batch_id = %batch_id,
                        status = %result.status,
                        processed = result.processed,
                        failed = result.failed,
                        "Batch task finished"
                    );
                    None
                },
                Ok(Err(IngestError::Cancelled(_))) => {
                    tracing::info!(batch_id = %batch_id, "Batch deleted while running");
                    None
                },
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) if e.is_panic() => Some("ingestion task panicked".to_string()),
                Err(e) => Some(e.to_string()),
            };

            if let Some(error) = fault {
                tracing::error!(batch_id = %batch_id, error = %error, "Batch task failed");
                scheduler.record_fault(&batch_id, error).await;
            }

            scheduler.running().remove(&batch_id);
        }))
    }

    /// Run `task` like [`submit`](Self::submit) and wait for its result.
    ///
    /// Returns once the supervisor is done, so an abort is already recorded
    /// on the operation when the error comes back.
    pub async fn run<F>(&self, batch_id: &str, task: F) -> Result<BatchResult, SchedulerError>
    where
        F: Future<Output = Result<BatchResult, IngestError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let supervisor = self.submit(batch_id, async move {
            let result = task.await;
            let _ = tx.send(match &result {
                Ok(batch) => Ok(batch.clone()),
                Err(e) => Err(e.to_string()),
            });
            result
        })?;

        if let Err(e) = supervisor.await {
            tracing::error!(batch_id, error = %e, "Batch supervisor failed");
        }

        let error = match rx.await {
            Ok(Ok(result)) => return Ok(result),
            Ok(Err(error)) => error,
            Err(_) => "ingestion task panicked".to_string(),
        };
        Err(SchedulerError::Aborted {
            batch_id: batch_id.to_string(),
            error,
        })
    }

    async fn record_fault(&self, batch_id: &str, error: String) {
        let detail = ErrorDetail {
            row: 0,
            error: format!("Ingestion aborted: {error}"),
            data: String::new(),
        };
        match self.store.fail_operation(batch_id, Some(detail)).await {
            Ok(true) => {},
            Ok(false) => return,
            Err(e) => {
                tracing::error!(batch_id, error = %e, "Could not mark batch failed");
                return;
            },
        }
        if let Ok(Some(operation)) = self.store.get_operation(batch_id).await {
            self.publisher.publish(&operation.snapshot());
        }
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("running", &self.running_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::progress::NoopPublisher;
    use crate::models::{BulkStatus, NewOperation};
    use crate::store::{MemoryStore, OperationStore, StoreError};

    async fn setup() -> (Arc<MemoryStore>, BatchScheduler) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_operation(NewOperation {
                id: "batch".into(),
                total_rows: 1,
                file_content: None,
            })
            .await
            .unwrap();
        let scheduler = BatchScheduler::new(store.clone(), Arc::new(NoopPublisher));
        (store, scheduler)
    }

    fn finished() -> BatchResult {
        BatchResult {
            batch_id: "batch".into(),
            status: BulkStatus::Completed,
            total: 1,
            processed: 1,
            failed: 0,
            activated: true,
            outcomes: vec![],
        }
    }

    #[tokio::test]
    async fn test_one_task_per_batch() {
        let (_, scheduler) = setup().await;
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = scheduler
            .submit("batch", async move {
                let _ = rx.await;
                Ok(finished())
            })
            .unwrap();
        assert!(scheduler.is_running("batch"));
        assert!(matches!(
            scheduler.submit("batch", async { Ok(finished()) }),
            Err(SchedulerError::AlreadyRunning(_))
        ));

        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(!scheduler.is_running("batch"));
        assert_eq!(scheduler.running_count(), 0);
    }

    #[tokio::test]
    async fn test_error_marks_batch_failed() {
        let (store, scheduler) = setup().await;
        let handle = scheduler
            .submit("batch", async {
                Err(IngestError::Store(StoreError::Corrupt("bad row".into())))
            })
            .unwrap();
        handle.await.unwrap();

        let op = store.get_operation("batch").await.unwrap().unwrap();
        assert_eq!(op.status, BulkStatus::Failed);
        assert_eq!(op.error_details.len(), 1);
        assert_eq!(op.error_details[0].row, 0);
        assert!(op.error_details[0].error.contains("bad row"));
    }

    #[tokio::test]
    async fn test_panic_marks_batch_failed() {
        let (store, scheduler) = setup().await;
        let handle = scheduler
            .submit("batch", async {
                if true {
                    panic!("row handler exploded");
                }
                Ok(finished())
            })
            .unwrap();
        handle.await.unwrap();

        let op = store.get_operation("batch").await.unwrap().unwrap();
        assert_eq!(op.status, BulkStatus::Failed);
        assert_eq!(op.error_details[0].error, "Ingestion aborted: ingestion task panicked");
        assert!(!scheduler.is_running("batch"));
    }

    #[tokio::test]
    async fn test_run_returns_the_result() {
        let (_, scheduler) = setup().await;
        let result = scheduler.run("batch", async { Ok(finished()) }).await.unwrap();
        assert_eq!(result, finished());
        assert!(!scheduler.is_running("batch"));
    }

    #[tokio::test]
    async fn test_run_records_abort_before_returning() {
        let (store, scheduler) = setup().await;
        let err = scheduler
            .run("batch", async {
                Err(IngestError::Store(StoreError::Corrupt("checkpoint lost".into())))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Aborted { .. }));
        assert!(err.to_string().contains("checkpoint lost"));

        let op = store.get_operation("batch").await.unwrap().unwrap();
        assert_eq!(op.status, BulkStatus::Failed);
        assert_eq!(op.error_details[0].row, 0);
        assert!(op.error_details[0].error.starts_with("Ingestion aborted:"));
    }

    #[tokio::test]
    async fn test_run_survives_caller_going_away() {
        let (store, scheduler) = setup().await;
        let (tx, rx) = oneshot::channel::<()>();

        let caller = tokio::spawn({
            let scheduler = scheduler.clone();
            async move {
                scheduler
                    .run("batch", async move {
                        let _ = rx.await;
                        Err(IngestError::Store(StoreError::Corrupt("late fault".into())))
                    })
                    .await
            }
        });
        while !scheduler.is_running("batch") {
            tokio::task::yield_now().await;
        }
        caller.abort();
        let _ = caller.await;

        tx.send(()).unwrap();
        while scheduler.is_running("batch") {
            tokio::task::yield_now().await;
        }
        let op = store.get_operation("batch").await.unwrap().unwrap();
        assert_eq!(op.status, BulkStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_leaves_store_untouched() {
        let (store, scheduler) = setup().await;
        let handle = scheduler
            .submit("batch", async { Err(IngestError::Cancelled("batch".into())) })
            .unwrap();
        handle.await.unwrap();

        let op = store.get_operation("batch").await.unwrap().unwrap();
        assert_eq!(op.status, BulkStatus::InProgress);
    }
}
