//! Completion polling for an enqueued job.
//!
//! ComfyUI offers no completion callback over plain HTTP, so the job's
//! history entry is read at a fixed interval until it reaches a terminal
//! state or the wall-clock deadline passes.

use std::time::Duration;

use tokio::time::Instant;

use kontext_comfyui::api::ComfyUIApi;
use kontext_comfyui::history::OutputManifest;
use kontext_comfyui::status::{JobHandle, JobState};

use crate::error::ProcessError;
use crate::progress::ProgressReporter;

/// Default delay between two history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default time a job may take from the first poll until completion.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress message while the job has no history entry yet.
pub const QUEUED_MESSAGE: &str = "Waiting in queue";

/// Polling cadence and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

/// Poll until the job completes, fails, or the deadline passes.
///
/// Every poll emits one progress notification: `pending` while the job is
/// still queued, otherwise the backend's status. The deadline is wall clock
/// from the first poll and also bounds each history request, so a stalled
/// backend cannot hold the job past it. The sleep before the next poll is
/// clamped to the remaining time and no request starts after the deadline.
/// On completion the job's output manifest is returned.
pub async fn wait_for_completion(
    api: &ComfyUIApi,
    job: &JobHandle,
    config: &PollConfig,
    reporter: &mut ProgressReporter<'_>,
) -> Result<OutputManifest, ProcessError> {
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut polls: u32 = 0;

    let timed_out = |polls: u32| {
        tracing::warn!(
            job_id = %job.job_id,
            polls,
            timeout_ms = config.timeout.as_millis() as u64,
            "Job timed out",
        );
        ProcessError::Timeout {
            job_id: job.job_id.clone(),
            timeout: config.timeout,
        }
    };

    loop {
        if Instant::now() >= deadline {
            return Err(timed_out(polls));
        }

        polls += 1;
        let outcome = match tokio::time::timeout_at(deadline, api.poll_once(&job.job_id)).await {
            Ok(outcome) => outcome?,
            Err(_) => return Err(timed_out(polls)),
        };

        let mut status = outcome.status.with_queue_number(job.number);
        if !outcome.found && status.message.is_none() {
            status.message = Some(QUEUED_MESSAGE.to_string());
        }

        tracing::debug!(
            job_id = %job.job_id,
            poll = polls,
            found = outcome.found,
            state = %status.state,
            "Polled job status",
        );

        match status.state {
            JobState::Completed => {
                reporter.emit(status);
                tracing::info!(
                    job_id = %job.job_id,
                    polls,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Job completed",
                );
                return Ok(outcome.outputs.unwrap_or_default());
            }
            JobState::Failed => {
                let message = status
                    .message
                    .clone()
                    .unwrap_or_else(|| "no details reported".to_string());
                reporter.emit(status);
                tracing::warn!(job_id = %job.job_id, message = %message, "Job failed on backend");
                return Err(ProcessError::BackendJobFailed {
                    job_id: job.job_id.clone(),
                    message,
                });
            }
            JobState::Pending | JobState::Running => {
                reporter.emit(status);
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(config.interval.min(remaining)).await;
    }
}
