//! SQLite ingestion-job repository.

use sqlx::Row;
use uuid::Uuid;

use mnemon_core::store::JobStore;
use mnemon_types::error::StoreError;
use mnemon_types::job::{Job, JobStatus};

use super::{format_datetime, parse_datetime, parse_uuid, query_err, SqliteStore};

struct JobRow {
    id: String,
    status: String,
    metadata: String,
    created_at: String,
    completed_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_job(self) -> Result<Job, StoreError> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| StoreError::Query(format!("invalid job metadata JSON: {e}")))?;
        Ok(Job {
            id: parse_uuid(&self.id)?,
            status,
            metadata,
            created_at: parse_datetime(&self.created_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
        })
    }
}

fn metadata_json(job: &Job) -> Result<String, StoreError> {
    serde_json::to_string(&job.metadata)
        .map_err(|e| StoreError::Query(format!("serialize job metadata: {e}")))
}

impl JobStore for SqliteStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO jobs (id, status, metadata, created_at, completed_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(job.status.to_string())
        .bind(metadata_json(job)?)
        .bind(format_datetime(&job.created_at))
        .bind(job.completed_at.as_ref().map(format_datetime))
        .execute(self.writer())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("job {} already exists", job.id))
            }
            other => query_err(other),
        })?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.reader())
            .await
            .map_err(query_err)?;
        row.map(|r| JobRow::from_row(&r).map_err(query_err)?.into_job())
            .transpose()
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, metadata = ?, completed_at = ? WHERE id = ?",
        )
        .bind(job.status.to_string())
        .bind(metadata_json(job)?)
        .bind(job.completed_at.as_ref().map(format_datetime))
        .bind(job.id.to_string())
        .execute(self.writer())
        .await
        .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::temp_store;

    #[tokio::test]
    async fn test_job_lifecycle_roundtrip() {
        let (store, _dir) = temp_store().await;
        let mut job = Job::new();
        store.create_job(&job).await.unwrap();

        job.transition(JobStatus::Running, serde_json::Map::new())
            .unwrap();
        store.update_job(&job).await.unwrap();

        let mut metadata = serde_json::Map::new();
        metadata.insert("passages_attached".to_string(), 7.into());
        job.transition(JobStatus::Completed, metadata).unwrap();
        store.update_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.metadata["passages_attached"], 7);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_job_is_not_found() {
        let (store, _dir) = temp_store().await;
        let job = Job::new();
        assert!(matches!(
            store.update_job(&job).await.unwrap_err(),
            StoreError::NotFound
        ));
    }
}
