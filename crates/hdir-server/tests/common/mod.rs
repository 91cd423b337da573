//! Shared fixtures for hdir-server integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use hdir_server::{
    api,
    config::{CorsConfig, IngestConfig},
    features::FeatureState,
    models::{
        BulkOperation, BulkStatus, ErrorDetail, HospitalFilter, HospitalPatch, HospitalRecord,
        NewHospital, NewOperation, Progress,
    },
    store::{HospitalStore, MemoryStore, OperationStore, RecordStore, StoreError, StoreResult},
};
use serde_json::Value;

pub const BOUNDARY: &str = "hdir-test-boundary";

/// MemoryStore with switchable faults
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// Inserts of hospitals with these names fail
    failing_names: Mutex<HashSet<String>>,
    /// Number of upcoming activation attempts that fail
    activation_failures: AtomicU32,
    /// Pause the batch once this many inserts have succeeded (0 = never)
    pause_after_inserts: AtomicUsize,
    inserts: AtomicUsize,
    /// Every checkpoint write fails
    checkpoints_fail: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_insert_of(&self, name: &str) {
        self.failing_names
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    pub fn clear_insert_faults(&self) {
        self.failing_names.lock().unwrap().clear();
    }

    pub fn fail_activations(&self, attempts: u32) {
        self.activation_failures.store(attempts, Ordering::SeqCst);
    }

    pub fn fail_checkpoints(&self) {
        self.checkpoints_fail.store(true, Ordering::SeqCst);
    }

    pub fn pause_after_inserts(&self, inserts: usize) {
        self.inserts.store(0, Ordering::SeqCst);
        self.pause_after_inserts.store(inserts, Ordering::SeqCst);
    }
}

#[async_trait]
impl HospitalStore for FaultyStore {
    async fn insert(&self, hospital: NewHospital) -> StoreResult<HospitalRecord> {
        if self.failing_names.lock().unwrap().contains(&hospital.name) {
            return Err(StoreError::Corrupt(format!("injected insert fault for {}", hospital.name)));
        }
        let batch_id = hospital.creation_batch_id.clone();
        let record = self.inner.insert(hospital).await?;

        let limit = self.pause_after_inserts.load(Ordering::SeqCst);
        if limit > 0 && self.inserts.fetch_add(1, Ordering::SeqCst) + 1 == limit {
            self.inner
                .transition(&batch_id, &[BulkStatus::InProgress], BulkStatus::Paused, None)
                .await?;
        }
        Ok(record)
    }

    async fn bulk_insert(&self, hospitals: Vec<NewHospital>) -> StoreResult<Vec<HospitalRecord>> {
        // One bad row rejects the whole statement
        let failing = self.failing_names.lock().unwrap().clone();
        if let Some(h) = hospitals.iter().find(|h| failing.contains(&h.name)) {
            return Err(StoreError::Corrupt(format!("injected insert fault for {}", h.name)));
        }
        self.inner.bulk_insert(hospitals).await
    }

    async fn get(&self, id: i64) -> StoreResult<Option<HospitalRecord>> {
        self.inner.get(id).await
    }

    async fn update(&self, id: i64, patch: HospitalPatch) -> StoreResult<Option<HospitalRecord>> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete(id).await
    }

    async fn query(&self, filter: &HospitalFilter) -> StoreResult<Vec<HospitalRecord>> {
        self.inner.query(filter).await
    }

    async fn count(&self, filter: &HospitalFilter) -> StoreResult<i64> {
        self.inner.count(filter).await
    }


    async fn bulk_delete(&self, filter: &HospitalFilter) -> StoreResult<u64> {
        self.inner.bulk_delete(filter).await
    }
}

#[async_trait]
impl OperationStore for FaultyStore {
    async fn create_operation(&self, operation: NewOperation) -> StoreResult<BulkOperation> {
        self.inner.create_operation(operation).await
    }

    async fn get_operation(&self, id: &str) -> StoreResult<Option<BulkOperation>> {
        self.inner.get_operation(id).await
    }

    async fn list_operations(
        &self,
        status: Option<BulkStatus>,
        limit: i64,
    ) -> StoreResult<Vec<BulkOperation>> {
        self.inner.list_operations(status, limit).await
    }

    async fn checkpoint(
        &self,
        id: &str,
        progress: Progress,
        new_errors: &[ErrorDetail],
    ) -> StoreResult<bool> {
        if self.checkpoints_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("injected checkpoint fault".into()));
        }
        self.inner.checkpoint(id, progress, new_errors).await
    }

    async fn transition(
        &self,
        id: &str,
        from: &[BulkStatus],
        to: BulkStatus,
        cursor: Option<i64>,
    ) -> StoreResult<bool> {
        self.inner.transition(id, from, to, cursor).await
    }

    async fn complete_and_activate(&self, id: &str) -> StoreResult<Option<u64>> {
        let remaining = self.activation_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.activation_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Corrupt("injected activation fault".into()));
        }
        self.inner.complete_and_activate(id).await
    }

    async fn fail_operation(&self, id: &str, error: Option<ErrorDetail>) -> StoreResult<bool> {
        self.inner.fail_operation(id, error).await
    }

    async fn delete_operation_cascade(&self, id: &str) -> StoreResult<Option<u64>> {
        self.inner.delete_operation_cascade(id).await
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Ingest settings with no artificial delays
pub fn fast_ingest() -> IngestConfig {
    IngestConfig {
        default_row_delay_secs: 0.0,
        ..IngestConfig::default()
    }
}

pub fn setup_state(store: Arc<dyn RecordStore>) -> FeatureState {
    FeatureState::new(store, fast_ingest())
}

pub fn setup_app(state: FeatureState) -> Router {
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    };
    api::create_router(state, &cors)
}

/// Multipart body with a single `file` field
pub fn multipart_request(uri: &str, filename: &str, content: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\
         \r\n\
         {content}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
