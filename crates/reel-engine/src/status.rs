//! Job status document.
//!
//! Rewritten on every transition through a temporary file and a rename so a
//! concurrent reader never sees a partial document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReelResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Queued,
    Preprocess,
    Analyze,
    Edl,
    Render,
    Done,
    Failed,
}

impl JobStep {
    /// Progress reported when the step starts.
    pub fn progress(&self) -> f64 {
        match self {
            JobStep::Queued => 0.0,
            JobStep::Preprocess => 0.1,
            JobStep::Analyze => 0.3,
            JobStep::Edl => 0.45,
            JobStep::Render => 0.7,
            JobStep::Done | JobStep::Failed => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Queued => "queued",
            JobStep::Preprocess => "preprocess",
            JobStep::Analyze => "analyze",
            JobStep::Edl => "edl",
            JobStep::Render => "render",
            JobStep::Done => "done",
            JobStep::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifacts {
    pub preview: PathBuf,
    #[serde(rename = "final")]
    pub final_path: PathBuf,
    pub edl: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub status: JobState,
    pub step: JobStep,
    pub progress: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn queued(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Queued,
            step: JobStep::Queued,
            progress: JobStep::Queued.progress(),
            message: "Queued".to_string(),
            artifacts: None,
            updated_at: Utc::now(),
        }
    }

    pub fn running(job_id: impl Into<String>, step: JobStep, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Running,
            step,
            progress: step.progress(),
            message: message.into(),
            artifacts: None,
            updated_at: Utc::now(),
        }
    }

    pub fn complete(job_id: impl Into<String>, artifacts: Artifacts) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Complete,
            step: JobStep::Done,
            progress: JobStep::Done.progress(),
            message: "Ready".to_string(),
            artifacts: Some(artifacts),
            updated_at: Utc::now(),
        }
    }

    pub fn failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobState::Error,
            step: JobStep::Failed,
            progress: JobStep::Failed.progress(),
            message: message.into(),
            artifacts: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobState::Complete | JobState::Error)
    }
}

/// Stamp `updated_at` and atomically replace the status file.
pub async fn write_status(path: &Path, status: &JobStatus) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut stamped = status.clone();
    stamped.updated_at = Utc::now();

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, serde_json::to_string_pretty(&stamped)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// `Ok(None)` when no status has been written yet.
pub async fn read_status(path: &Path) -> ReelResult<Option<JobStatus>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
