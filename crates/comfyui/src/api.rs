//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (health, upload, workflow submission,
//! history polling, output download, queue control, interruption) using
//! [`reqwest`]. Every failure is mapped onto [`ComfyUIApiError`]; raw
//! transport errors never leave this module.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use kontext_core::workflow::JobPayload;

use crate::history::{HistoryResponse, OutputManifest};
use crate::models::{QueuePromptRequest, QueueStatus, SubmitResponse, SystemStats, UploadResponse};
use crate::status::{JobHandle, JobStatus, OutputAsset};

/// Prefix of the per-instance client ID sent with every enqueue.
const CLIENT_ID_PREFIX: &str = "kontext";

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    /// Generated once per instance so the backend can correlate our requests.
    client_id: String,
}

/// Result of a single history poll for one job.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// `false` while the job is still waiting in the queue.
    pub found: bool,
    pub status: JobStatus,
    /// Per-node output assets, present once the job has a history entry.
    pub outputs: Option<OutputManifest>,
}

/// Why an image upload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum UploadFailure {
    #[error("ComfyUI refused the upload (HTTP 403), check its CORS and access configuration")]
    Forbidden,

    #[error("Image is too large for ComfyUI (HTTP 413), upload an image under 10 MB")]
    TooLarge,

    #[error("ComfyUI does not accept this image format (HTTP 415), upload a JPG or PNG")]
    UnsupportedFormat,

    #[error("ComfyUI server error (HTTP {status}), check the ComfyUI service")]
    Server { status: u16, body: String },

    #[error("Upload failed (HTTP {status}): {body}")]
    Other { status: u16, body: String },
}

impl UploadFailure {
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            403 => UploadFailure::Forbidden,
            413 => UploadFailure::TooLarge,
            415 => UploadFailure::UnsupportedFormat,
            500..=599 => UploadFailure::Server { status, body },
            _ => UploadFailure::Other { status, body },
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            UploadFailure::Forbidden => 403,
            UploadFailure::TooLarge => 413,
            UploadFailure::UnsupportedFormat => 415,
            UploadFailure::Server { status, .. } | UploadFailure::Other { status, .. } => *status,
        }
    }
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The request never got a response (connection refused, DNS, timeout).
    #[error("Cannot reach ComfyUI at {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// `POST /upload/image` returned a non-2xx status.
    #[error(transparent)]
    Upload(#[from] UploadFailure),

    /// `POST /prompt` returned a non-2xx status.
    #[error("ComfyUI rejected the job ({status}): {body}")]
    Enqueue { status: u16, body: String },

    /// `GET /view` returned a non-2xx status.
    #[error("Failed to fetch output '{filename}' from ComfyUI ({status})")]
    AssetFetch { status: u16, filename: String },

    /// Any other endpoint returned a non-2xx status.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    /// The request could not be built from the given arguments.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (for custom timeouts or connection pooling).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            client_id: format!("{CLIENT_ID_PREFIX}-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Base HTTP URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Reachability check: `GET /system_stats`.
    pub async fn check_health(&self) -> Result<SystemStats, ComfyUIApiError> {
        let url = self.url("/system_stats");
        let response = self.send(self.client.get(&url), &url).await?;
        let response = Self::ensure_success(response).await?;
        Self::parse_json(response, &url).await
    }

    /// Upload an input image via multipart `POST /upload/image`.
    ///
    /// The returned `name` is what the workflow must reference; ComfyUI
    /// renames files that collide with existing ones.
    pub async fn upload_asset(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<UploadResponse, ComfyUIApiError> {
        let url = self.url("/upload/image");
        let size = bytes.len();

        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| {
                ComfyUIApiError::InvalidRequest(format!("invalid MIME type '{mime_type}': {e}"))
            })?;
        let form = Form::new()
            .part("image", part)
            .text("type", "input")
            .text("subfolder", "");

        tracing::debug!(filename, mime_type, size, "Uploading image to ComfyUI");

        let response = self.send(self.client.post(&url).multipart(form), &url).await?;
        let status = response.status();
        if !status.is_success() {
            let body = Self::error_body(response).await;
            tracing::warn!(status = status.as_u16(), body = %body, "Image upload rejected");
            return Err(UploadFailure::from_status(status.as_u16(), body).into());
        }

        let uploaded: UploadResponse = Self::parse_json(response, &url).await?;
        tracing::info!(name = %uploaded.name, size, "Image uploaded to ComfyUI");
        Ok(uploaded)
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow and this
    /// instance's client ID. Returns a handle carrying the server-assigned
    /// `prompt_id` and queue position.
    pub async fn enqueue_job(&self, payload: &JobPayload) -> Result<JobHandle, ComfyUIApiError> {
        let url = self.url("/prompt");
        let body = QueuePromptRequest {
            prompt: payload,
            client_id: &self.client_id,
        };

        let response = self.send(self.client.post(&url).json(&body), &url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ComfyUIApiError::Enqueue {
                status: status.as_u16(),
                body: Self::error_body(response).await,
            });
        }

        let submitted: SubmitResponse = Self::parse_json(response, &url).await?;
        if submitted.has_node_errors() {
            tracing::warn!(
                prompt_id = %submitted.prompt_id,
                node_errors = ?submitted.node_errors,
                "ComfyUI accepted the job with node errors",
            );
        }
        tracing::info!(
            prompt_id = %submitted.prompt_id,
            number = submitted.number,
            "Workflow submitted to ComfyUI",
        );

        Ok(JobHandle {
            job_id: submitted.prompt_id,
            number: submitted.number,
            submitted_at: chrono::Utc::now(),
        })
    }

    /// Retrieve execution history.
    ///
    /// `GET /history/{prompt_id}` for one prompt, `GET /history` for all.
    pub async fn history(&self, prompt_id: Option<&str>) -> Result<HistoryResponse, ComfyUIApiError> {
        let url = match prompt_id {
            Some(id) => self.url(&format!("/history/{id}")),
            None => self.url("/history"),
        };
        let response = self.send(self.client.get(&url), &url).await?;
        let response = Self::ensure_success(response).await?;
        Self::parse_json(response, &url).await
    }

    /// Poll the history once for a single job.
    pub async fn poll_once(&self, job_id: &str) -> Result<PollOutcome, ComfyUIApiError> {
        let history = self.history(Some(job_id)).await?;

        Ok(match history.get(job_id) {
            Some(item) => PollOutcome {
                found: true,
                status: item.job_status(job_id),
                outputs: Some(item.output_manifest()),
            },
            None => PollOutcome {
                found: false,
                status: JobStatus::pending().with_job_id(job_id),
                outputs: None,
            },
        })
    }

    /// Download an output file via `GET /view`.
    pub async fn fetch_asset(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let url = self.url("/view");
        let request = self
            .client
            .get(&url)
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)]);

        let response = self.send(request, &url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ComfyUIApiError::AssetFetch {
                status: status.as_u16(),
                filename: filename.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ComfyUIApiError::Network { url, source })?;
        tracing::debug!(filename, size = bytes.len(), "Fetched output asset");
        Ok(bytes.to_vec())
    }

    /// `/view` URL at which an output asset can be downloaded.
    pub fn asset_url(&self, asset: &OutputAsset) -> Result<String, ComfyUIApiError> {
        reqwest::Url::parse_with_params(
            &self.url("/view"),
            &[
                ("filename", asset.filename.as_str()),
                ("subfolder", asset.subfolder.as_str()),
                ("type", asset.kind.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|e| ComfyUIApiError::InvalidRequest(format!("invalid asset URL: {e}")))
    }

    /// Interrupt the currently running execution immediately.
    ///
    /// Sends a `POST /interrupt` request. This does not target a
    /// specific prompt -- it interrupts whatever is executing right now.
    pub async fn interrupt(&self) -> Result<(), ComfyUIApiError> {
        let url = self.url("/interrupt");
        let response = self.send(self.client.post(&url), &url).await?;
        Self::ensure_success(response).await?;
        tracing::info!("Interrupt sent to ComfyUI");
        Ok(())
    }

    /// Remove a queued prompt via `POST /queue`.
    pub async fn cancel_job(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let url = self.url("/queue");
        let body = serde_json::json!({
            "delete": [prompt_id],
        });
        let response = self.send(self.client.post(&url).json(&body), &url).await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Drop every pending prompt via `DELETE /queue`.
    pub async fn clear_queue(&self) -> Result<(), ComfyUIApiError> {
        let url = self.url("/queue");
        let body = serde_json::json!({ "clear": true });
        let response = self.send(self.client.delete(&url).json(&body), &url).await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Running and pending prompts via `GET /queue`.
    pub async fn queue_status(&self) -> Result<QueueStatus, ComfyUIApiError> {
        let url = self.url("/queue");
        let response = self.send(self.client.get(&url), &url).await?;
        let response = Self::ensure_success(response).await?;
        Self::parse_json(response, &url).await
    }

    // ---- private helpers ----

    fn url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", self.api_url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        request.send().await.map_err(|source| {
            tracing::debug!(url, error = %source, "ComfyUI request failed");
            ComfyUIApiError::Network {
                url: url.to_string(),
                source,
            }
        })
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body: Self::error_body(response).await,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<T, ComfyUIApiError> {
        let text = response
            .text()
            .await
            .map_err(|source| ComfyUIApiError::Network {
                url: url.to_string(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|e| ComfyUIApiError::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn error_body(response: reqwest::Response) -> String {
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();
        match response.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => reason,
        }
    }
}

impl ComfyUIApiError {
    /// HTTP status carried by the error, if the backend answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        let code = match self {
            ComfyUIApiError::Upload(failure) => failure.status(),
            ComfyUIApiError::Enqueue { status, .. }
            | ComfyUIApiError::AssetFetch { status, .. }
            | ComfyUIApiError::ApiError { status, .. } => *status,
            _ => return None,
        };
        StatusCode::from_u16(code).ok()
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ComfyUIApiError::Network { .. })
    }
}
