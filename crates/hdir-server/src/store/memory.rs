//! In-memory record store
//!
//! One mutex guards both tables, so every trait method is atomic with respect
//! to every other. Used by tests and by `HDIR_STORE=memory`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{HospitalStore, OperationStore, RecordStore, StoreError, StoreResult};
use crate::models::{
    BulkOperation, BulkStatus, ErrorDetail, HospitalFilter, HospitalPatch, HospitalRecord,
    NewHospital, NewOperation, Progress,
};

#[derive(Default)]
struct State {
    next_id: i64,
    hospitals: BTreeMap<i64, HospitalRecord>,
    operations: BTreeMap<String, BulkOperation>,
    /// Creation order, for newest-first listing
    sequence: Vec<String>,
}

impl State {
    fn insert(&mut self, hospital: NewHospital) -> StoreResult<HospitalRecord> {
        if !self.operations.contains_key(&hospital.creation_batch_id) {
            return Err(StoreError::UnknownBatch(hospital.creation_batch_id));
        }
        self.next_id += 1;
        let record = HospitalRecord {
            id: self.next_id,
            name: hospital.name,
            address: hospital.address,
            phone: hospital.phone,
            creation_batch_id: hospital.creation_batch_id,
            active: false,
            created_at: Utc::now(),
        };
        self.hospitals.insert(record.id, record.clone());
        Ok(record)
    }

    fn matching_ids(&self, filter: &HospitalFilter) -> Vec<i64> {
        self.hospitals
            .values()
            .filter(|r| filter.matches(r))
            .map(|r| r.id)
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HospitalStore for MemoryStore {
    async fn insert(&self, hospital: NewHospital) -> StoreResult<HospitalRecord> {
        self.state.lock().await.insert(hospital)
    }

    async fn bulk_insert(&self, hospitals: Vec<NewHospital>) -> StoreResult<Vec<HospitalRecord>> {
        let mut state = self.state.lock().await;
        if let Some(missing) = hospitals
            .iter()
            .find(|h| !state.operations.contains_key(&h.creation_batch_id))
        {
            return Err(StoreError::UnknownBatch(missing.creation_batch_id.clone()));
        }
        hospitals.into_iter().map(|h| state.insert(h)).collect()
    }

    async fn get(&self, id: i64) -> StoreResult<Option<HospitalRecord>> {
        Ok(self.state.lock().await.hospitals.get(&id).cloned())
    }

    async fn update(&self, id: i64, patch: HospitalPatch) -> StoreResult<Option<HospitalRecord>> {
        let mut state = self.state.lock().await;
        Ok(state.hospitals.get_mut(&id).map(|record| {
            patch.apply(record);
            record.clone()
        }))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state.lock().await.hospitals.remove(&id).is_some())
    }

    async fn query(&self, filter: &HospitalFilter) -> StoreResult<Vec<HospitalRecord>> {
        let state = self.state.lock().await;
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(state
            .hospitals
            .values()
            .filter(|r| filter.matches(r))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &HospitalFilter) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.hospitals.values().filter(|r| filter.matches(r)).count() as i64)
    }


    async fn bulk_delete(&self, filter: &HospitalFilter) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let ids = state.matching_ids(filter);
        for id in &ids {
            state.hospitals.remove(id);
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl OperationStore for MemoryStore {
    async fn create_operation(&self, operation: NewOperation) -> StoreResult<BulkOperation> {
        let mut state = self.state.lock().await;
        if state.operations.contains_key(&operation.id) {
            return Err(StoreError::DuplicateBatch(operation.id));
        }
        let now = Utc::now();
        let created = BulkOperation {
            id: operation.id.clone(),
            status: BulkStatus::InProgress,
            total_rows: operation.total_rows,
            processed_rows: 0,
            failed_rows: 0,
            current_row: 0,
            error_details: Vec::new(),
            file_content: operation.file_content,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.operations.insert(operation.id.clone(), created.clone());
        state.sequence.push(operation.id);
        Ok(created)
    }

    async fn get_operation(&self, id: &str) -> StoreResult<Option<BulkOperation>> {
        Ok(self.state.lock().await.operations.get(id).cloned())
    }

    async fn list_operations(
        &self,
        status: Option<BulkStatus>,
        limit: i64,
    ) -> StoreResult<Vec<BulkOperation>> {
        let state = self.state.lock().await;
        Ok(state
            .sequence
            .iter()
            .rev()
            .filter_map(|id| state.operations.get(id))
            .filter(|op| status.map_or(true, |s| op.status == s))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn checkpoint(
        &self,
        id: &str,
        progress: Progress,
        new_errors: &[ErrorDetail],
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(op) = state.operations.get_mut(id) else {
            return Ok(false);
        };
        op.current_row = progress.current_row;
        op.processed_rows = progress.processed_rows;
        op.failed_rows = progress.failed_rows;
        op.error_details.extend_from_slice(new_errors);
        op.updated_at = Utc::now();
        Ok(true)
    }

    async fn transition(
        &self,
        id: &str,
        from: &[BulkStatus],
        to: BulkStatus,
        cursor: Option<i64>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(op) = state.operations.get_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&op.status) {
            return Ok(false);
        }
        op.status = to;
        if to == BulkStatus::InProgress {
            if let Some(cursor) = cursor {
                op.current_row = cursor;
            }
            op.completed_at = None;
        }
        op.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_and_activate(&self, id: &str) -> StoreResult<Option<u64>> {
        let mut state = self.state.lock().await;
        match state.operations.get(id) {
            Some(op) if op.status == BulkStatus::InProgress => {},
            _ => return Ok(None),
        }

        let patch = HospitalPatch::activate();
        let mut activated = 0;
        for record in state.hospitals.values_mut() {
            if record.creation_batch_id == id {
                patch.apply(record);
                activated += 1;
            }
        }

        if let Some(op) = state.operations.get_mut(id) {
            let now = Utc::now();
            op.status = BulkStatus::Completed;
            op.completed_at = Some(now);
            op.updated_at = now;
        }
        Ok(Some(activated))
    }

    async fn fail_operation(&self, id: &str, error: Option<ErrorDetail>) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let Some(op) = state.operations.get_mut(id) else {
            return Ok(false);
        };
        if op.status != BulkStatus::InProgress {
            return Ok(false);
        }
        let now = Utc::now();
        op.status = BulkStatus::Failed;
        op.error_details.extend(error);
        op.completed_at = Some(now);
        op.updated_at = now;
        Ok(true)
    }

    async fn delete_operation_cascade(&self, id: &str) -> StoreResult<Option<u64>> {
        let mut state = self.state.lock().await;
        if state.operations.remove(id).is_none() {
            return Ok(None);
        }
        state.sequence.retain(|s| s != id);
        let before = state.hospitals.len();
        state.hospitals.retain(|_, r| r.creation_batch_id != id);
        Ok(Some((before - state.hospitals.len()) as u64))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
