use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;
use crate::error::AppError;

/// Kind of unit of work; one handler per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Import,
    Extract,
    Summarize,
    ClassifyThemes,
    WeeklyDigest,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Import,
        JobKind::Extract,
        JobKind::Summarize,
        JobKind::ClassifyThemes,
        JobKind::WeeklyDigest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Import => "import",
            JobKind::Extract => "extract",
            JobKind::Summarize => "summarize",
            JobKind::ClassifyThemes => "classify_themes",
            JobKind::WeeklyDigest => "weekly_digest",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AppError::Invalid(format!("unknown job kind: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(AppError::Invalid(format!("unknown job status: {}", other))),
        }
    }
}

/// A durable job row.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub owner_id: Option<OwnerId>,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Attempts started so far, including the one in progress.
    pub attempts: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub dedupe_key: Option<String>,
    pub run_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub owner_id: Option<OwnerId>,
    pub payload: serde_json::Value,
    pub max_attempts: u32,
    pub dedupe_key: Option<String>,
}

/// Jobs the worker has no free slot for right now. A claim passes over them
/// so they stay pending instead of occupying a worker slot.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    /// Kinds whose global cap is used up.
    pub kinds: Vec<JobKind>,
    /// Owners whose per-kind cap is used up.
    pub owners: Vec<(JobKind, OwnerId)>,
}

impl ClaimFilter {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty() && self.owners.is_empty()
    }

    /// Whether a job of `kind` owned by `owner` must be passed over.
    pub fn skips(&self, kind: &str, owner: Option<&str>) -> bool {
        if self.kinds.iter().any(|k| k.as_str() == kind) {
            return true;
        }
        match owner {
            Some(owner) => self
                .owners
                .iter()
                .any(|(k, o)| k.as_str() == kind && o.as_str() == owner),
            None => false,
        }
    }
}
