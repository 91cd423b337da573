//! Hospital directory server
//!
//! HTTP service for hospital records with bulk CSV ingestion.
//!
//! # Overview
//!
//! - **Records**: single-hospital CRUD and batch lookups
//! - **Bulk ingestion**: uploads are interpreted and validated by
//!   `hdir-ingest`, then written row by row by the [`ingest::IngestionEngine`]
//!   with durable checkpoints
//! - **Activation gating**: a batch's hospitals become active together, and
//!   only when every row succeeded
//! - **Lifecycle**: batches can be paused, resumed from their checkpoint and
//!   deleted with their records
//! - **Live progress**: snapshots are pushed to WebSocket subscribers
//!
//! # Architecture
//!
//! - [`store`] - storage traits with PostgreSQL and in-memory backends
//! - [`ingest`] - engine, tracker, scheduler and progress registry
//! - [`features`] - CQRS-style HTTP slices (commands, queries, routes)
//! - [`api`] - router assembly and response envelopes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdir_server::{api, config::Config, features::FeatureState, store::MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = FeatureState::new(Arc::new(MemoryStore::new()), config.ingest.clone());
//!     let app = api::create_router(state, &config.cors);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod api;
pub mod config;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod store;
