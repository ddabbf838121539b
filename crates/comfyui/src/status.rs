//! Job lifecycle types shared by the transport and the orchestrator.

use std::fmt;

use serde::Serialize;

use kontext_core::types::Timestamp;

/// Coarse lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Position in the lifecycle; terminal states share the highest rank.
    pub fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Completed | JobState::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress observation for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Human-readable detail.
    pub message: Option<String>,
    /// Backend job (prompt) ID, once known.
    pub job_id: Option<String>,
    /// Queue position returned at enqueue time.
    pub queue_number: Option<i64>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            message: None,
            job_id: None,
            queue_number: None,
        }
    }

    pub fn pending() -> Self {
        Self::new(JobState::Pending)
    }

    pub fn running() -> Self {
        Self::new(JobState::Running)
    }

    pub fn completed() -> Self {
        Self::new(JobState::Completed)
    }

    pub fn failed() -> Self {
        Self::new(JobState::Failed)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_queue_number(mut self, number: i64) -> Self {
        self.queue_number = Some(number);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Identifies one enqueued job; the key used for polling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobHandle {
    pub job_id: String,
    /// Queue position assigned by the backend.
    pub number: i64,
    pub submitted_at: Timestamp,
}

/// One retrievable output file of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputAsset {
    pub filename: String,
    pub subfolder: String,
    /// Storage kind on the backend (`output`, `temp`, `input`).
    pub kind: String,
}
