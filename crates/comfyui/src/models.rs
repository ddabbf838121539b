//! Request and response bodies for the ComfyUI HTTP endpoints.

use serde::{Deserialize, Serialize};

use kontext_core::workflow::JobPayload;

/// Body of `POST /prompt`.
#[derive(Debug, Serialize)]
pub struct QueuePromptRequest<'a> {
    pub prompt: &'a JobPayload,
    pub client_id: &'a str,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i64,
    /// Per-node validation errors, if any.
    #[serde(default)]
    pub node_errors: Option<serde_json::Value>,
}

impl SubmitResponse {
    pub fn has_node_errors(&self) -> bool {
        match &self.node_errors {
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(serde_json::Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

/// Response of `POST /upload/image`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    /// Name the backend stored the file under (may differ from the upload name).
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Response of `GET /system_stats`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemStats {
    pub system: SystemInfo,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemInfo {
    pub os: String,
    pub ram_total: u64,
    pub ram_free: u64,
    pub comfyui_version: String,
    pub python_version: String,
    pub pytorch_version: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub vram_total: u64,
    pub vram_free: u64,
}

/// Response of `GET /queue`.
///
/// Each entry is the backend's `[number, prompt_id, prompt, extra_data, ...]`
/// tuple, kept raw.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueueStatus {
    pub queue_running: Vec<serde_json::Value>,
    pub queue_pending: Vec<serde_json::Value>,
}

impl QueueStatus {
    pub fn running_ids(&self) -> Vec<String> {
        prompt_ids(&self.queue_running)
    }

    pub fn pending_ids(&self) -> Vec<String> {
        prompt_ids(&self.queue_pending)
    }

    pub fn is_idle(&self) -> bool {
        self.queue_running.is_empty() && self.queue_pending.is_empty()
    }
}

fn prompt_ids(entries: &[serde_json::Value]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.get(1).and_then(|id| id.as_str()))
        .map(str::to_string)
        .collect()
}
