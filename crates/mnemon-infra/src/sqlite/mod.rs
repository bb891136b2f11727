//! SQLite storage layer.
//!
//! One [`SqliteStore`] implements all five store traits from
//! `mnemon-core`, backed by WAL-mode split read/write connection pools.
//! Each trait implementation lives in its own module.

pub mod agent;
pub mod job;
pub mod message;
pub mod passage;
pub mod pool;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use mnemon_core::embed::BoxEmbedder;
use mnemon_types::error::StoreError;

use self::pool::DatabasePool;

/// SQLite-backed store implementing the agent, block, recall, archival,
/// and job contracts.
pub struct SqliteStore {
    pool: DatabasePool,
    embedder: BoxEmbedder,
}

impl SqliteStore {
    /// Create a store over an existing pool. The embedder computes
    /// write-once passage vectors at insert time.
    pub fn new(pool: DatabasePool, embedder: BoxEmbedder) -> Self {
        Self { pool, embedder }
    }

    pub(crate) fn reader(&self) -> &sqlx::SqlitePool {
        &self.pool.reader
    }

    pub(crate) fn writer(&self) -> &sqlx::SqlitePool {
        &self.pool.writer
    }

    pub(crate) fn embedder(&self) -> &BoxEmbedder {
        &self.embedder
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers shared by the repository modules
// ---------------------------------------------------------------------------

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    s.parse::<Uuid>()
        .map_err(|e| StoreError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn query_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            StoreError::Connection
        }
        other => StoreError::Query(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::SubsecRound;
    use mnemon_core::embed::HashingEmbedder;

    /// Open a store on a fresh temp-file database.
    pub async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let store = SqliteStore::new(pool, BoxEmbedder::new(HashingEmbedder::new(64)));
        (store, dir)
    }

    #[test]
    fn test_datetime_roundtrip_preserves_ordering() {
        let early = Utc::now();
        let late = early + chrono::Duration::microseconds(1);
        let a = format_datetime(&early);
        let b = format_datetime(&late);
        assert!(a < b);
        assert_eq!(parse_datetime(&a).unwrap(), early.trunc_subsecs(6));
    }
}
