//! Image edit job orchestration.
//!
//! One call to [`JobOrchestrator::process_image`] drives a job through
//! `idle -> uploading -> validating -> enqueuing -> polling -> resolving`
//! and ends in `completed` or `failed`. Steps run strictly in sequence and
//! nothing is retried; the first error ends the job and is returned
//! together with the stage it happened in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use kontext_comfyui::api::ComfyUIApi;
use kontext_comfyui::history::first_asset_per_node;
use kontext_comfyui::status::{JobStatus, OutputAsset};
use kontext_core::workflow::{self, TemplateBindings, WorkflowTemplate};
use kontext_core::workflow_store::WorkflowStore;

use crate::error::{ProcessError, ProcessFailure, ProcessStage};
use crate::poll::{wait_for_completion, PollConfig};
use crate::progress::{ProgressReporter, ProgressSink};

/// Image file handed over by the UI layer.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, filename: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            filename: filename.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Input of one edit job.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub image: Option<ImageUpload>,
    pub prompt: String,
}

impl ProcessRequest {
    pub fn new(image: ImageUpload, prompt: impl Into<String>) -> Self {
        Self {
            image: Some(image),
            prompt: prompt.into(),
        }
    }
}

/// Output of a completed job.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Bytes of the first output image.
    pub image: Vec<u8>,
    /// URL the image can be fetched from again.
    pub locator: String,
    pub job_id: String,
    /// Wall-clock time from submission to fetched result.
    pub elapsed: Duration,
    pub asset: OutputAsset,
}

/// Reachability of the orchestrator's collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealth {
    pub backend: bool,
    pub workflow: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub poll: PollConfig,
    pub bindings: TemplateBindings,
}

/// Drives image edit jobs against one ComfyUI instance.
pub struct JobOrchestrator {
    api: ComfyUIApi,
    workflows: WorkflowStore,
    config: OrchestratorConfig,
    /// Set once the backend has answered a health check.
    initialized: AtomicBool,
}

/// Bookkeeping for a single `process_image` call.
struct JobRun<'a> {
    stage: ProcessStage,
    started: Instant,
    reporter: ProgressReporter<'a>,
}

impl<'a> JobRun<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            stage: ProcessStage::Idle,
            started: Instant::now(),
            reporter: ProgressReporter::new(sink),
        }
    }

    /// Move to `stage` without notifying the caller.
    fn enter(&mut self, stage: ProcessStage) {
        tracing::debug!(from = %self.stage, to = %stage, "Job stage transition");
        self.stage = stage;
    }

    /// Move to a pre-polling `stage` and report it as pending.
    fn advance(&mut self, stage: ProcessStage, message: &str) {
        self.enter(stage);
        self.reporter.emit(JobStatus::pending().with_message(message));
    }

    fn fail(mut self, error: ProcessError) -> ProcessFailure {
        let stage = self.stage;
        tracing::error!(stage = %stage, kind = ?error.kind(), error = %error, "Image processing failed");
        self.reporter
            .emit(JobStatus::failed().with_message(error.to_string()));
        self.enter(ProcessStage::Failed);
        ProcessFailure { stage, error }
    }
}

impl JobOrchestrator {
    pub fn new(api: ComfyUIApi, workflows: WorkflowStore, config: OrchestratorConfig) -> Self {
        Self {
            api,
            workflows,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Probe the backend and load the workflow template.
    ///
    /// Idempotent. Called implicitly by the first job; calling it up front
    /// surfaces configuration problems before the user submits anything.
    pub async fn initialize(&self) -> Result<(), ProcessError> {
        if self.initialized.load(Ordering::Acquire) && self.workflows.is_loaded().await {
            return Ok(());
        }

        let stats = self.api.check_health().await?;
        tracing::info!(
            api_url = %self.api.api_url(),
            comfyui_version = %stats.system.comfyui_version,
            devices = stats.devices.len(),
            "ComfyUI is reachable",
        );
        self.initialized.store(true, Ordering::Release);

        self.workflows.load().await?;
        Ok(())
    }

    /// The cached workflow template, loading it if needed.
    pub async fn template(&self) -> Result<Arc<WorkflowTemplate>, ProcessError> {
        Ok(self.workflows.load().await?)
    }

    /// Run one image edit job end to end.
    ///
    /// `progress` receives `pending` while the job is prepared and queued,
    /// then the polled backend status; the final notification is
    /// `completed` or `failed`.
    pub async fn process_image(
        &self,
        request: ProcessRequest,
        progress: &dyn ProgressSink,
    ) -> Result<ProcessResult, ProcessFailure> {
        let mut run = JobRun::new(progress);
        match self.run_job(&mut run, request).await {
            Ok(result) => {
                run.enter(ProcessStage::Completed);
                tracing::info!(
                    job_id = %result.job_id,
                    output = %result.asset.filename,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "Image processing completed",
                );
                Ok(result)
            }
            Err(error) => Err(run.fail(error)),
        }
    }

    async fn run_job(
        &self,
        run: &mut JobRun<'_>,
        request: ProcessRequest,
    ) -> Result<ProcessResult, ProcessError> {
        let (image, prompt) = check_request(request)?;

        run.advance(ProcessStage::Uploading, "Uploading image");
        self.ensure_reachable().await?;
        let uploaded = self
            .api
            .upload_asset(image.bytes, &image.filename, &image.mime_type)
            .await?;

        run.advance(ProcessStage::Validating, "Preparing workflow");
        let template = self.workflows.load().await?;
        let bindings = &self.config.bindings;
        let payload = workflow::instantiate(&template, bindings, &uploaded.name, &prompt)?;
        let report = workflow::validate(payload.workflow(), bindings);
        if !report.is_ok() {
            return Err(ProcessError::WorkflowValidation(report.errors));
        }
        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "Workflow validation warning");
        }

        run.advance(ProcessStage::Enqueuing, "Submitting job");
        let job = self.api.enqueue_job(&payload).await?;
        run.reporter.set_job_id(job.job_id.clone());

        run.enter(ProcessStage::Polling);
        let manifest =
            wait_for_completion(&self.api, &job, &self.config.poll, &mut run.reporter).await?;

        run.enter(ProcessStage::Resolving);
        let asset = first_asset_per_node(&manifest)
            .into_iter()
            .next()
            .ok_or_else(|| ProcessError::NoOutput {
                job_id: job.job_id.clone(),
            })?;
        let bytes = self
            .api
            .fetch_asset(&asset.filename, &asset.subfolder, &asset.kind)
            .await?;
        let locator = self.api.asset_url(&asset)?;

        Ok(ProcessResult {
            image: bytes,
            locator,
            job_id: job.job_id,
            elapsed: run.started.elapsed(),
            asset,
        })
    }

    /// Report which collaborators are usable. Never fails.
    pub async fn service_health(&self) -> ServiceHealth {
        let backend = match self.api.check_health().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "ComfyUI health check failed");
                false
            }
        };

        let workflow = match self.workflows.load().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Workflow template check failed");
                false
            }
        };

        let message = match (backend, workflow) {
            (true, true) => "All services are available".to_string(),
            (false, true) => format!("ComfyUI is unreachable at {}", self.api.api_url()),
            (true, false) => "The workflow template could not be loaded".to_string(),
            (false, false) => format!(
                "ComfyUI is unreachable at {} and the workflow template could not be loaded",
                self.api.api_url()
            ),
        };

        ServiceHealth {
            backend,
            workflow,
            message,
        }
    }

    /// Ask the backend to stop whatever it is executing.
    ///
    /// Advisory: requests this client already has in flight still complete.
    pub async fn interrupt(&self) -> Result<(), ProcessError> {
        self.api.interrupt().await?;
        Ok(())
    }

    /// Forget the cached template and the health check result.
    pub async fn cleanup(&self) {
        self.workflows.reset().await;
        self.initialized.store(false, Ordering::Release);
        tracing::debug!("Orchestrator state reset");
    }

    async fn ensure_reachable(&self) -> Result<(), ProcessError> {
        if !self.initialized.load(Ordering::Acquire) {
            self.api.check_health().await?;
            self.initialized.store(true, Ordering::Release);
        }
        Ok(())
    }
}

/// Reject requests that can never succeed, before any network traffic.
fn check_request(request: ProcessRequest) -> Result<(ImageUpload, String), ProcessError> {
    let image = match request.image {
        Some(image) if !image.bytes.is_empty() => image,
        Some(_) => return Err(ProcessError::invalid_input("The selected image file is empty")),
        None => return Err(ProcessError::invalid_input("No image selected")),
    };

    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ProcessError::invalid_input("Prompt must not be empty"));
    }

    Ok((image, prompt.to_string()))
}
