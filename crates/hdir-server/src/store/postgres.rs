//! PostgreSQL record store
//!
//! `hospitals.creation_batch_id` references `bulk_operations.id` with
//! `ON DELETE CASCADE`, so deleting an operation removes its hospitals in the
//! same statement. Row errors live in a JSONB array that checkpoints extend
//! with `||`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

use super::{HospitalStore, OperationStore, RecordStore, StoreError, StoreResult};
use crate::models::{
    BulkOperation, BulkStatus, ErrorDetail, HospitalFilter, HospitalPatch, HospitalRecord,
    NewHospital, NewOperation, Progress,
};

const HOSPITAL_COLUMNS: &str = "id, name, address, phone, creation_batch_id, active, created_at";

const OPERATION_COLUMNS: &str = "id, status, total_rows, processed_rows, failed_rows, current_row, \
     error_details, file_content, created_at, updated_at, completed_at";

#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[derive(sqlx::FromRow)]
struct OperationRow {
    id: String,
    status: String,
    total_rows: i64,
    processed_rows: i64,
    failed_rows: i64,
    current_row: i64,
    error_details: Json<Vec<ErrorDetail>>,
    file_content: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OperationRow> for BulkOperation {
    type Error = StoreError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        Ok(BulkOperation {
            status: row
                .status
                .parse()
                .map_err(|e: crate::models::operation::UnknownStatus| {
                    StoreError::Corrupt(e.to_string())
                })?,
            id: row.id,
            total_rows: row.total_rows,
            processed_rows: row.processed_rows,
            failed_rows: row.failed_rows,
            current_row: row.current_row,
            error_details: row.error_details.0,
            file_content: row.file_content,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &HospitalFilter) {
    builder.push(" WHERE TRUE");
    if let Some(batch) = &filter.creation_batch_id {
        builder.push(" AND creation_batch_id = ").push_bind(batch.clone());
    }
    if let Some(active) = filter.active {
        builder.push(" AND active = ").push_bind(active);
    }
}

#[async_trait]
impl HospitalStore for PgStore {
    #[tracing::instrument(skip(self, hospital), fields(batch_id = %hospital.creation_batch_id))]
    async fn insert(&self, hospital: NewHospital) -> StoreResult<HospitalRecord> {
        let batch_id = hospital.creation_batch_id.clone();
        sqlx::query_as::<_, HospitalRecord>(&format!(
            "INSERT INTO hospitals (name, address, phone, creation_batch_id, active) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING {HOSPITAL_COLUMNS}"
        ))
        .bind(hospital.name)
        .bind(hospital.address)
        .bind(hospital.phone)
        .bind(hospital.creation_batch_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::UnknownBatch(batch_id)
            } else {
                StoreError::Database(e)
            }
        })
    }

    async fn bulk_insert(&self, hospitals: Vec<NewHospital>) -> StoreResult<Vec<HospitalRecord>> {
        if hospitals.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::new("INSERT INTO hospitals (name, address, phone, creation_batch_id, active) ");
        builder.push_values(hospitals, |mut row, h| {
            row.push_bind(h.name)
                .push_bind(h.address)
                .push_bind(h.phone)
                .push_bind(h.creation_batch_id)
                .push_bind(false);
        });
        builder.push(format!(" RETURNING {HOSPITAL_COLUMNS}"));

        let mut records: Vec<HospitalRecord> = builder
            .build_query_as()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::UnknownBatch("bulk insert".to_string())
                } else {
                    StoreError::Database(e)
                }
            })?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn get(&self, id: i64) -> StoreResult<Option<HospitalRecord>> {
        Ok(sqlx::query_as::<_, HospitalRecord>(&format!(
            "SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?)
    }

    async fn update(&self, id: i64, patch: HospitalPatch) -> StoreResult<Option<HospitalRecord>> {
        Ok(sqlx::query_as::<_, HospitalRecord>(&format!(
            "UPDATE hospitals SET \
                name = COALESCE($2, name), \
                address = COALESCE($3, address), \
                phone = CASE WHEN $4 THEN $5 ELSE phone END, \
                active = COALESCE($6, active) \
             WHERE id = $1 RETURNING {HOSPITAL_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.address)
        .bind(patch.phone.is_some())
        .bind(patch.phone.flatten())
        .bind(patch.active)
        .fetch_optional(&*self.pool)
        .await?)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM hospitals WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: &HospitalFilter) -> StoreResult<Vec<HospitalRecord>> {
        let mut builder = QueryBuilder::new(format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals"));
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY id");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit.max(0));
        }
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ").push_bind(offset.max(0));
        }
        Ok(builder.build_query_as().fetch_all(&*self.pool).await?)
    }

    async fn count(&self, filter: &HospitalFilter) -> StoreResult<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM hospitals");
        push_filter(&mut builder, filter);
        let (count,): (i64,) = builder.build_query_as().fetch_one(&*self.pool).await?;
        Ok(count)
    }


    async fn bulk_delete(&self, filter: &HospitalFilter) -> StoreResult<u64> {
        let mut builder = QueryBuilder::new("DELETE FROM hospitals");
        push_filter(&mut builder, filter);
        Ok(builder.build().execute(&*self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl OperationStore for PgStore {
    #[tracing::instrument(skip(self, operation), fields(batch_id = %operation.id))]
    async fn create_operation(&self, operation: NewOperation) -> StoreResult<BulkOperation> {
        let id = operation.id.clone();
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "INSERT INTO bulk_operations (id, status, total_rows, file_content) \
             VALUES ($1, $2, $3, $4) RETURNING {OPERATION_COLUMNS}"
        ))
        .bind(operation.id)
        .bind(BulkStatus::InProgress.as_str())
        .bind(operation.total_rows)
        .bind(operation.file_content)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                StoreError::DuplicateBatch(id)
            } else {
                StoreError::Database(e)
            }
        })?;
        row.try_into()
    }

    async fn get_operation(&self, id: &str) -> StoreResult<Option<BulkOperation>> {
        sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM bulk_operations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?
        .map(BulkOperation::try_from)
        .transpose()
    }

    async fn list_operations(
        &self,
        status: Option<BulkStatus>,
        limit: i64,
    ) -> StoreResult<Vec<BulkOperation>> {
        sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM bulk_operations \
             WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit.max(0))
        .fetch_all(&*self.pool)
        .await?
        .into_iter()
        .map(BulkOperation::try_from)
        .collect()
    }

    #[tracing::instrument(skip(self, new_errors), fields(batch_id = %id, current_row = progress.current_row))]
    async fn checkpoint(
        &self,
        id: &str,
        progress: Progress,
        new_errors: &[ErrorDetail],
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE bulk_operations SET \
                current_row = $2, processed_rows = $3, failed_rows = $4, \
                error_details = error_details || $5::jsonb, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(progress.current_row)
        .bind(progress.processed_rows)
        .bind(progress.failed_rows)
        .bind(Json(new_errors))
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, from), fields(batch_id = %id, to = %to))]
    async fn transition(
        &self,
        id: &str,
        from: &[BulkStatus],
        to: BulkStatus,
        cursor: Option<i64>,
    ) -> StoreResult<bool> {
        let from: Vec<&str> = from.iter().map(BulkStatus::as_str).collect();
        let reopening = to == BulkStatus::InProgress;
        let result = sqlx::query(
            "UPDATE bulk_operations SET \
                status = $2, \
                current_row = CASE WHEN $3 THEN COALESCE($4, current_row) ELSE current_row END, \
                completed_at = CASE WHEN $3 THEN NULL ELSE completed_at END, \
                updated_at = NOW() \
             WHERE id = $1 AND status = ANY($5)",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(reopening)
        .bind(cursor)
        .bind(from)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(batch_id = %id))]
    async fn complete_and_activate(&self, id: &str) -> StoreResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        // Row lock so a concurrent pause cannot slip in between the check and
        // the activation.
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM bulk_operations WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if !matches!(status, Some((ref s,)) if s == BulkStatus::InProgress.as_str()) {
            tx.rollback().await?;
            return Ok(None);
        }

        let activated = sqlx::query("UPDATE hospitals SET active = TRUE WHERE creation_batch_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "UPDATE bulk_operations SET status = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(BulkStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(activated))
    }

    #[tracing::instrument(skip(self, error), fields(batch_id = %id))]
    async fn fail_operation(&self, id: &str, error: Option<ErrorDetail>) -> StoreResult<bool> {
        let errors: Vec<ErrorDetail> = error.into_iter().collect();
        let result = sqlx::query(
            "UPDATE bulk_operations SET \
                status = $2, error_details = error_details || $3::jsonb, \
                completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(id)
        .bind(BulkStatus::Failed.as_str())
        .bind(Json(errors))
        .bind(BulkStatus::InProgress.as_str())
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(batch_id = %id))]
    async fn delete_operation_cascade(&self, id: &str) -> StoreResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;

        let hospitals = sqlx::query("DELETE FROM hospitals WHERE creation_batch_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM bulk_operations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(hospitals))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&*self.pool).await?;
        Ok(())
    }
}
