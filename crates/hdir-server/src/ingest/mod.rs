//! Batch ingestion
//!
//! - [`engine`] walks a batch's rows, checkpoints progress and gates
//!   activation on a clean pass
//! - [`tracker`] pauses, resumes and deletes operations
//! - [`scheduler`] supervises batch passes, background or awaited
//! - [`progress`] fans snapshots out to live subscribers

pub mod engine;
pub mod progress;
pub mod scheduler;
pub mod tracker;
pub mod types;

pub use engine::{IngestError, IngestionEngine, RunOptions};
pub use progress::{NoopPublisher, ProgressPublisher, ProgressRegistry};
pub use scheduler::{BatchScheduler, SchedulerError};
pub use tracker::{BulkOperationTracker, ResumePlan, ResumeSummary, TrackerError, TrackerResult};
pub use types::{BatchResult, RowOutcome};
