//! Feature modules implementing the directory API
//!
//! Each feature is a vertical slice:
//! - `commands/` - write operations
//! - `queries/` - read operations
//! - `routes.rs` - HTTP handlers and error mapping
//!
//! # Features
//!
//! - **hospitals**: single-record CRUD and batch lookups
//! - **bulk**: CSV uploads, dry-run validation, progress and the operation
//!   lifecycle (pause, resume, delete), plus the live progress socket

pub mod bulk;
pub mod hospitals;
pub mod shared;

use std::sync::Arc;

use axum::Router;

use crate::config::IngestConfig;
use crate::ingest::{BatchScheduler, BulkOperationTracker, IngestionEngine, ProgressRegistry};
use crate::store::RecordStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub store: Arc<dyn RecordStore>,
    pub engine: Arc<IngestionEngine>,
    pub tracker: Arc<BulkOperationTracker>,
    pub scheduler: BatchScheduler,
    pub progress: ProgressRegistry,
    pub ingest: IngestConfig,
}

impl FeatureState {
    /// Wire the ingestion components around one store
    pub fn new(store: Arc<dyn RecordStore>, ingest: IngestConfig) -> Self {
        let progress = ProgressRegistry::new();
        let publisher = Arc::new(progress.clone());

        Self {
            engine: Arc::new(IngestionEngine::new(
                store.clone(),
                publisher.clone(),
                ingest.activation_retries,
            )),
            tracker: Arc::new(BulkOperationTracker::new(
                store.clone(),
                publisher.clone(),
                ingest.interpret_options(),
            )),
            scheduler: BatchScheduler::new(store.clone(), publisher),
            store,
            progress,
            ingest,
        }
    }
}

/// Creates the API router with all feature routes mounted
///
/// - `/hospitals` - records and uploads
/// - `/bulk/operations` - operation lifecycle
/// - `/ws/bulk` - live progress
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest(
            "/hospitals",
            hospitals::hospitals_routes().merge(bulk::upload_routes()),
        )
        .nest("/bulk/operations", bulk::operations_routes())
        .nest("/ws/bulk", bulk::progress_routes())
        .with_state(state)
}
