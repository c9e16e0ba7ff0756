//! Export job records.
//!
//! An [`ExportJob`] is a queued, retryable unit of work meaning "deliver this
//! bundle to this notebook". The queue itself is passive: status transitions
//! are driven by whoever processes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    /// Returns true while the job may still be delivered.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// How the export was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Queued automatically after a confident routing decision.
    #[default]
    Auto,
    /// Queued by an explicit user action.
    Manual,
}

/// A queued delivery of one bundle to one notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub job_id: Uuid,
    pub bundle_id: String,
    pub notebook_ref: String,
    pub dedupe_key: String,
    #[serde(default)]
    pub mode: ExportMode,
    pub status: JobStatus,
    /// Number of times the job has been started.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Advisory: the earliest time a processor should try again.
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Bumped on every write; used for optimistic updates.
    pub updated_at: DateTime<Utc>,
}

impl ExportJob {
    /// Returns the fields an optimistic writer compares against.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            updated_at: self.updated_at,
        }
    }
}

/// Input for creating an export job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExportJob {
    pub bundle_id: String,
    pub notebook_ref: String,
    pub dedupe_key: String,
    #[serde(default)]
    pub mode: ExportMode,
}

/// A merge-patch over an export job. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub attempts: Option<u32>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the error.
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<Option<String>>,
    pub notebook_ref: Option<String>,
    pub mode: Option<ExportMode>,
}

impl JobPatch {
    /// Applies the patch to a job in place.
    pub fn apply(&self, job: &mut ExportJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(attempts) = self.attempts {
            job.attempts = attempts;
        }
        if let Some(at) = self.next_attempt_at {
            job.next_attempt_at = at;
        }
        if let Some(err) = &self.last_error {
            job.last_error = err.clone();
        }
        if let Some(notebook_ref) = &self.notebook_ref {
            job.notebook_ref = notebook_ref.clone();
        }
        if let Some(mode) = self.mode {
            job.mode = mode;
        }
    }
}

/// What an optimistic writer saw before its async step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
}

/// Distinguishes an absent `lastError` from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job() -> ExportJob {
        let now = Utc::now();
        ExportJob {
            job_id: Uuid::new_v4(),
            bundle_id: "bundle-1".to_string(),
            notebook_ref: "nb-1".to_string(),
            dedupe_key: "k".to_string(),
            mode: ExportMode::Auto,
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            next_attempt_at: now,
            last_error: Some("boom".to_string()),
            updated_at: now,
        }
    }

    #[test]
    fn patch_leaves_absent_fields_alone() {
        let mut job = make_job();
        let patch: JobPatch = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        patch.apply(&mut job);

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        assert_eq!(job.notebook_ref, "nb-1");
    }

    #[test]
    fn patch_null_clears_last_error() {
        let mut job = make_job();
        let patch: JobPatch = serde_json::from_str(r#"{"lastError":null}"#).unwrap();
        patch.apply(&mut job);

        assert!(job.last_error.is_none());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn active_statuses() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(!JobStatus::Done.is_active());
        assert!(!JobStatus::Failed.is_active());
    }
}
