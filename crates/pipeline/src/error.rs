//! Error taxonomy of an image edit job.

use std::fmt;
use std::time::Duration;

use kontext_comfyui::api::ComfyUIApiError;
use kontext_core::error::CoreError;

/// Stage of a job's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStage {
    Idle,
    Uploading,
    Validating,
    Enqueuing,
    Polling,
    Resolving,
    Completed,
    Failed,
}

impl ProcessStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStage::Idle => "idle",
            ProcessStage::Uploading => "uploading",
            ProcessStage::Validating => "validating",
            ProcessStage::Enqueuing => "enqueuing",
            ProcessStage::Polling => "polling",
            ProcessStage::Resolving => "resolving",
            ProcessStage::Completed => "completed",
            ProcessStage::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat classification of every failure a job can end with.
///
/// The UI layer keys its user-facing messages on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Network,
    TemplateLoad,
    TemplateShape,
    WorkflowValidation,
    Upload,
    Enqueue,
    Timeout,
    BackendJobFailed,
    NoOutput,
    AssetFetch,
    Api,
    MalformedResponse,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Bad request arguments or a template problem.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Any transport-level failure, forwarded unchanged.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error("Workflow validation failed: {}", .0.join("; "))]
    WorkflowValidation(Vec<String>),

    #[error("Job {job_id} did not finish within {}s", .timeout.as_secs())]
    Timeout { job_id: String, timeout: Duration },

    #[error("ComfyUI reported job {job_id} as failed: {message}")]
    BackendJobFailed { job_id: String, message: String },

    #[error("Job {job_id} completed without any output images")]
    NoOutput { job_id: String },
}

impl ProcessError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ProcessError::Core(CoreError::InvalidInput(message.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Core(core) => match core {
                CoreError::InvalidInput(_) | CoreError::Validation(_) => ErrorKind::InvalidInput,
                CoreError::TemplateLoad { .. } => ErrorKind::TemplateLoad,
                CoreError::TemplateShape { .. } => ErrorKind::TemplateShape,
            },
            ProcessError::Api(api) => match api {
                ComfyUIApiError::Network { .. } => ErrorKind::Network,
                ComfyUIApiError::Upload(_) => ErrorKind::Upload,
                ComfyUIApiError::Enqueue { .. } => ErrorKind::Enqueue,
                ComfyUIApiError::AssetFetch { .. } => ErrorKind::AssetFetch,
                ComfyUIApiError::ApiError { .. } => ErrorKind::Api,
                ComfyUIApiError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
                ComfyUIApiError::InvalidRequest(_) => ErrorKind::InvalidInput,
            },
            ProcessError::WorkflowValidation(_) => ErrorKind::WorkflowValidation,
            ProcessError::Timeout { .. } => ErrorKind::Timeout,
            ProcessError::BackendJobFailed { .. } => ErrorKind::BackendJobFailed,
            ProcessError::NoOutput { .. } => ErrorKind::NoOutput,
        }
    }
}

/// A failed job: the error plus the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("Image processing failed while {stage}: {error}")]
pub struct ProcessFailure {
    pub stage: ProcessStage,
    #[source]
    pub error: ProcessError,
}

impl ProcessFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_of_local_errors() {
        assert_eq!(ProcessError::invalid_input("x").kind(), ErrorKind::InvalidInput);
        assert_eq!(
            ProcessError::WorkflowValidation(vec!["a".into()]).kind(),
            ErrorKind::WorkflowValidation
        );
        assert_eq!(
            ProcessError::Timeout {
                job_id: "j".into(),
                timeout: Duration::from_secs(2),
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            ProcessError::NoOutput { job_id: "j".into() }.kind(),
            ErrorKind::NoOutput
        );
    }

    #[test]
    fn kinds_of_forwarded_errors() {
        let shape = ProcessError::from(CoreError::TemplateShape {
            role: "prompt-text",
            node_id: "16".into(),
        });
        assert_eq!(shape.kind(), ErrorKind::TemplateShape);

        let enqueue = ProcessError::from(ComfyUIApiError::Enqueue {
            status: 400,
            body: "bad".into(),
        });
        assert_eq!(enqueue.kind(), ErrorKind::Enqueue);
    }

    #[test]
    fn validation_message_lists_every_error() {
        let err = ProcessError::WorkflowValidation(vec!["first".into(), "second".into()]);
        assert_eq!(err.to_string(), "Workflow validation failed: first; second");
    }

    #[test]
    fn failure_display_names_stage() {
        let failure = ProcessFailure {
            stage: ProcessStage::Polling,
            error: ProcessError::Timeout {
                job_id: "abc".into(),
                timeout: Duration::from_secs(300),
            },
        };
        assert_eq!(
            failure.to_string(),
            "Image processing failed while polling: Job abc did not finish within 300s"
        );
        assert_eq!(failure.kind(), ErrorKind::Timeout);
    }
}
