use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use kontext_core::workflow_store::DEFAULT_WORKFLOW_PATH;

/// Which address the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Requests go through the local development proxy.
    Development,
    /// Requests go straight to ComfyUI.
    Production,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI on port 8188.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    /// Base URL of the ComfyUI HTTP API actually used.
    pub api_url: String,
    pub workflow_path: PathBuf,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Where processed images are written.
    pub output_dir: PathBuf,
    pub log_format: LogFormat,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                              |
    /// |--------------------------------|--------------------------------------|
    /// | `KONTEXT_ENV`                  | `production`                         |
    /// | `COMFYUI_API_URL`              | `http://localhost:8188`              |
    /// | `KONTEXT_DEV_PROXY_URL`        | `http://localhost:3000/api/comfyui`  |
    /// | `KONTEXT_WORKFLOW_PATH`        | `workflows/Kontext_Image_Edit.json`  |
    /// | `COMFYUI_POLL_INTERVAL_MS`     | `1000`                               |
    /// | `COMFYUI_JOB_TIMEOUT_SECS`     | `300`                                |
    /// | `COMFYUI_REQUEST_TIMEOUT_SECS` | `60`                                 |
    /// | `KONTEXT_OUTPUT_DIR`           | `output`                             |
    /// | `KONTEXT_LOG_FORMAT`           | `text`                               |
    ///
    /// In development the proxy URL replaces `COMFYUI_API_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let environment = match get("KONTEXT_ENV", "production").to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        };

        let api_url = match environment {
            Environment::Development => {
                get("KONTEXT_DEV_PROXY_URL", "http://localhost:3000/api/comfyui")
            }
            Environment::Production => get("COMFYUI_API_URL", "http://localhost:8188"),
        };

        let poll_interval_ms: u64 = get("COMFYUI_POLL_INTERVAL_MS", "1000")
            .parse()
            .context("COMFYUI_POLL_INTERVAL_MS must be a valid u64")?;

        let job_timeout_secs: u64 = get("COMFYUI_JOB_TIMEOUT_SECS", "300")
            .parse()
            .context("COMFYUI_JOB_TIMEOUT_SECS must be a valid u64")?;

        let request_timeout_secs: u64 = get("COMFYUI_REQUEST_TIMEOUT_SECS", "60")
            .parse()
            .context("COMFYUI_REQUEST_TIMEOUT_SECS must be a valid u64")?;

        let log_format = match get("KONTEXT_LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            environment,
            api_url,
            workflow_path: PathBuf::from(get("KONTEXT_WORKFLOW_PATH", DEFAULT_WORKFLOW_PATH)),
            poll_interval: Duration::from_millis(poll_interval_ms),
            job_timeout: Duration::from_secs(job_timeout_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
            output_dir: PathBuf::from(get("KONTEXT_OUTPUT_DIR", "output")),
            log_format,
        })
    }
}
