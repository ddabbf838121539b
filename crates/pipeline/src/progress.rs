//! Progress reporting for running jobs.
//!
//! The caller passes a [`ProgressSink`]; the orchestrator wraps it in a
//! [`ProgressReporter`] that keeps the emitted sequence well-formed:
//! `pending* -> running* -> (completed | failed)`, with the terminal status
//! emitted at most once and always last.

use tokio::sync::mpsc;

use kontext_comfyui::status::JobStatus;

/// Receives job status notifications. Called synchronously from the job task.
pub trait ProgressSink: Send + Sync {
    fn report(&self, status: &JobStatus);
}

impl<F> ProgressSink for F
where
    F: Fn(&JobStatus) + Send + Sync,
{
    fn report(&self, status: &JobStatus) {
        self(status)
    }
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _status: &JobStatus) {}
}

/// Forwards notifications into a bounded channel consumed by a UI task.
///
/// A full channel drops the notification instead of stalling the job.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<JobStatus>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<JobStatus>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobStatus>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, status: &JobStatus) {
        if let Err(e) = self.tx.try_send(status.clone()) {
            tracing::debug!(error = %e, state = %status.state, "Dropped progress notification");
        }
    }
}

/// Enforces ordering on top of a caller-supplied sink.
pub struct ProgressReporter<'a> {
    sink: &'a dyn ProgressSink,
    rank: u8,
    finished: bool,
    job_id: Option<String>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            rank: 0,
            finished: false,
            job_id: None,
        }
    }

    /// Attach a job ID to every later notification that lacks one.
    pub fn set_job_id(&mut self, job_id: impl Into<String>) {
        self.job_id = Some(job_id.into());
    }

    /// Whether a terminal status has been emitted.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Forward a status unless it would break the ordering guarantee.
    ///
    /// Returns `true` if the status reached the sink.
    pub fn emit(&mut self, mut status: JobStatus) -> bool {
        if self.finished {
            tracing::debug!(state = %status.state, "Suppressed progress after terminal status");
            return false;
        }

        let rank = status.state.rank();
        if rank < self.rank {
            tracing::debug!(state = %status.state, "Suppressed out-of-order progress");
            return false;
        }

        if status.job_id.is_none() {
            status.job_id = self.job_id.clone();
        }

        self.rank = rank;
        self.finished = status.is_terminal();
        self.sink.report(&status);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontext_comfyui::status::JobState;
    use std::sync::Mutex;

    fn states(seen: &Mutex<Vec<JobStatus>>) -> Vec<JobState> {
        seen.lock().unwrap().iter().map(|s| s.state).collect()
    }

    #[test]
    fn forwards_monotonic_sequence() {
        let seen = Mutex::new(Vec::new());
        let sink = |s: &JobStatus| seen.lock().unwrap().push(s.clone());
        let mut reporter = ProgressReporter::new(&sink);

        assert!(reporter.emit(JobStatus::pending()));
        assert!(reporter.emit(JobStatus::pending()));
        assert!(reporter.emit(JobStatus::running()));
        assert!(reporter.emit(JobStatus::completed()));
        assert!(reporter.is_finished());

        assert_eq!(
            states(&seen),
            vec![JobState::Pending, JobState::Pending, JobState::Running, JobState::Completed]
        );
    }

    #[test]
    fn drops_regressions() {
        let seen = Mutex::new(Vec::new());
        let sink = |s: &JobStatus| seen.lock().unwrap().push(s.clone());
        let mut reporter = ProgressReporter::new(&sink);

        reporter.emit(JobStatus::running());
        assert!(!reporter.emit(JobStatus::pending()));
        assert_eq!(states(&seen), vec![JobState::Running]);
    }

    #[test]
    fn nothing_after_terminal() {
        let seen = Mutex::new(Vec::new());
        let sink = |s: &JobStatus| seen.lock().unwrap().push(s.clone());
        let mut reporter = ProgressReporter::new(&sink);

        reporter.emit(JobStatus::completed());
        assert!(!reporter.emit(JobStatus::failed()));
        assert!(!reporter.emit(JobStatus::completed()));
        assert_eq!(states(&seen), vec![JobState::Completed]);
    }

    #[test]
    fn fills_in_job_id() {
        let seen = Mutex::new(Vec::new());
        let sink = |s: &JobStatus| seen.lock().unwrap().push(s.clone());
        let mut reporter = ProgressReporter::new(&sink);

        reporter.emit(JobStatus::pending());
        reporter.set_job_id("abc");
        reporter.emit(JobStatus::running());
        reporter.emit(JobStatus::completed().with_job_id("explicit"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].job_id, None);
        assert_eq!(seen[1].job_id.as_deref(), Some("abc"));
        assert_eq!(seen[2].job_id.as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn channel_sink_delivers_and_drops_when_full() {
        let (sink, mut rx) = ChannelSink::channel(1);
        sink.report(&JobStatus::pending());
        sink.report(&JobStatus::running());

        assert_eq!(rx.recv().await.unwrap().state, JobState::Pending);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_progress_accepts_everything() {
        let mut reporter = ProgressReporter::new(&NoProgress);
        assert!(reporter.emit(JobStatus::failed()));
    }
}
