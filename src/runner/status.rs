use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::extractors::CredentialSource;

/// Coarse lifecycle state of the tracked job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Ready,
    Downloading,
    Converting,
    Complete,
    Error,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Error)
    }

    /// Whether a running job may move from `self` to `next`
    pub fn can_transition_to(self, next: JobState) -> bool {
        match (self, next) {
            (_, JobState::Ready) => false,
            (current, _) if current.is_terminal() => false,
            (JobState::Ready, JobState::Downloading) => true,
            (JobState::Ready, _) => false,
            _ => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Ready => "ready",
            JobState::Downloading => "downloading",
            JobState::Converting => "converting",
            JobState::Complete => "complete",
            JobState::Error => "error",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped line of the job log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub state: JobState,
    pub message: String,
}

/// Outcome of a completed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub title: String,
    pub output_path: PathBuf,
    /// Credential source the successful attempt used
    pub credential_source: CredentialSource,
}

/// Snapshot of the single tracked job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: Option<Uuid>,
    pub state: JobState,
    pub message: String,
    pub log: Vec<LogEntry>,
    pub result: Option<JobResult>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            job_id: None,
            state: JobState::Ready,
            message: "Enter a video URL to start a download".to_string(),
            log: Vec::new(),
            result: None,
        }
    }
}

impl JobStatus {
    fn push(&mut self, message: String) {
        self.log.push(LogEntry {
            at: Utc::now(),
            state: self.state,
            message: message.clone(),
        });
        self.message = message;
    }
}

/// Process-wide job status record; every read and write goes through one lock.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<JobStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current status
    pub fn snapshot(&self) -> JobStatus {
        self.inner.lock().clone()
    }

    /// Reset the record for a new job, returning the job it displaced if that job was still running.
    pub(crate) fn begin(&self, job_id: Uuid, message: &str) -> Option<Uuid> {
        let mut status = self.inner.lock();

        let displaced = match (status.job_id, status.state.is_terminal()) {
            (Some(previous), false) => Some(previous),
            _ => None,
        };

        *status = JobStatus {
            job_id: Some(job_id),
            state: JobState::Downloading,
            message: message.to_string(),
            log: Vec::new(),
            result: None,
        };

        displaced
    }

    /// Apply `update` if `job_id` is still the tracked job and it has not finished.
    fn update_job<F>(&self, job_id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut JobStatus) -> bool,
    {
        let mut status = self.inner.lock();

        if status.job_id != Some(job_id) {
            tracing::debug!(%job_id, "Dropping status update from preempted job");
            return false;
        }
        if status.state.is_terminal() {
            return false;
        }

        update(&mut status)
    }
}

/// Write access to the status board scoped to a single job
#[derive(Debug, Clone)]
pub struct JobHandle {
    board: Arc<StatusBoard>,
    job_id: Uuid,
}

impl JobHandle {
    pub fn new(board: Arc<StatusBoard>, job_id: Uuid) -> Self {
        Self { board, job_id }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Append a log entry without changing state
    pub fn log(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.board.update_job(self.job_id, |status| {
            status.push(message);
            true
        })
    }

    /// Move to `state`, always appending an entry
    pub fn transition(&self, state: JobState, message: impl Into<String>) -> bool {
        self.report(state, message, true)
    }

    /// Update state and message; a log entry is appended when the state changes or `force_log` is set.
    pub fn report(&self, state: JobState, message: impl Into<String>, force_log: bool) -> bool {
        let message = message.into();
        self.board.update_job(self.job_id, |status| {
            if !status.state.can_transition_to(state) {
                tracing::warn!(from = %status.state, to = %state, "Ignoring invalid job state transition");
                return false;
            }

            let changed = status.state != state;
            status.state = state;
            if changed || force_log {
                status.push(message);
            } else {
                status.message = message;
            }
            true
        })
    }

    /// Finish successfully with `result`
    pub fn complete(&self, result: JobResult, message: impl Into<String>) -> bool {
        let message = message.into();
        self.board.update_job(self.job_id, |status| {
            status.state = JobState::Complete;
            status.result = Some(result);
            status.push(message);
            true
        })
    }

    /// Finish with an error
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.transition(JobState::Error, message)
    }
}
