//! Long-running job tracking for source ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Status of an ingestion job. Transitions are forward-only:
/// created -> running -> (completed | failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether moving to `next` is a legal forward transition.
    pub fn can_transition(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Created, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Created => write!(f, "created"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(JobStatus::Created),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("invalid job status: '{other}'")),
        }
    }
}

/// Errors from job state transitions.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("illegal job transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}

/// Tracks a long-running ingestion task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Result metadata (e.g. processed-item counts); overwritten on each
    /// transition.
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            status: JobStatus::Created,
            metadata: Map::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advance the job state machine, overwriting the metadata map.
    ///
    /// Rejects anything other than a forward transition.
    pub fn transition(
        &mut self,
        next: JobStatus,
        metadata: Map<String, Value>,
    ) -> Result<(), JobError> {
        if !self.status.can_transition(next) {
            return Err(JobError::IllegalTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.metadata = metadata;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Created,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let s = status.to_string();
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_forward_only_transitions() {
        let mut job = Job::new();
        job.transition(JobStatus::Running, Map::new()).unwrap();

        let mut meta = Map::new();
        meta.insert("num_passages".to_string(), json!(12));
        job.transition(JobStatus::Completed, meta).unwrap();
        assert_eq!(job.metadata["num_passages"], json!(12));
        assert!(job.completed_at.is_some());

        // Terminal states admit no further transitions
        let err = job.transition(JobStatus::Running, Map::new()).unwrap_err();
        assert!(matches!(err, JobError::IllegalTransition { .. }));
    }

    #[test]
    fn test_no_skipping_running() {
        let mut job = Job::new();
        assert!(job.transition(JobStatus::Completed, Map::new()).is_err());
        assert!(job.transition(JobStatus::Failed, Map::new()).is_err());
    }

    #[test]
    fn test_transition_overwrites_metadata() {
        let mut job = Job::new();
        let mut meta = Map::new();
        meta.insert("stage".to_string(), json!("parsing"));
        job.transition(JobStatus::Running, meta).unwrap();

        let mut done = Map::new();
        done.insert("num_documents".to_string(), json!(3));
        job.transition(JobStatus::Completed, done).unwrap();
        assert!(job.metadata.get("stage").is_none());
        assert_eq!(job.metadata["num_documents"], json!(3));
    }
}
