//! ComfyUI `/history` response types and their interpretation.
//!
//! `GET /history/{prompt_id}` returns `{}` while the prompt is still
//! queued, and afterwards an object keyed by prompt ID:
//!
//! ```json
//! {
//!   "abc": {
//!     "outputs": { "15": { "images": [{ "filename": "x.png", "subfolder": "", "type": "output" }] } },
//!     "status": { "status_str": "success", "completed": true, "messages": [["execution_start", {}]] }
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::Deserialize;

use crate::status::{JobState, JobStatus, OutputAsset};

/// `status_str` value ComfyUI reports for failed or interrupted prompts.
const STATUS_ERROR: &str = "error";

/// Default storage kind for output images lacking a `type` field.
const DEFAULT_OUTPUT_KIND: &str = "output";

/// Whole history response, keyed by prompt ID in document order.
pub type HistoryResponse = IndexMap<String, HistoryItem>;

/// Per-node outputs of one prompt: node ID to asset list.
pub type OutputManifest = IndexMap<String, Vec<OutputAsset>>;

/// One prompt's entry in the history.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryItem {
    /// Raw per-node outputs. Kept loosely typed because custom nodes emit
    /// arbitrary keys (`images`, `gifs`, `text`, ...).
    #[serde(default)]
    pub outputs: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Execution status block of a history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// `[event_type, data]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<(String, serde_json::Value)>,
}

/// Payload of an `execution_error` status message.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

impl HistoryStatus {
    /// Map the backend status onto a [`JobState`].
    ///
    /// `status_str == "error"` is a failure, the `completed` flag is
    /// success, and anything else counts as still running so the poll
    /// timeout stays the backstop for states we cannot classify.
    pub fn state(&self) -> JobState {
        if self.status_str == STATUS_ERROR {
            JobState::Failed
        } else if self.completed {
            JobState::Completed
        } else {
            JobState::Running
        }
    }

    /// Human-readable detail for the current state.
    pub fn message(&self) -> Option<String> {
        if self.state() == JobState::Failed {
            if let Some(error) = self.execution_error() {
                let node = if error.node_type.is_empty() {
                    error.node_id.clone()
                } else {
                    format!("{} ({})", error.node_id, error.node_type)
                };
                return Some(format!(
                    "{}: {} [node {node}]",
                    error.exception_type, error.exception_message
                ));
            }
            if self.has_message("execution_interrupted") {
                return Some("Execution interrupted".to_string());
            }
        }

        if self.status_str.is_empty() {
            None
        } else {
            Some(self.status_str.clone())
        }
    }

    /// The first `execution_error` message, if one was recorded.
    pub fn execution_error(&self) -> Option<ErrorData> {
        self.messages
            .iter()
            .filter(|(kind, _)| kind == "execution_error")
            .find_map(|(_, data)| serde_json::from_value(data.clone()).ok())
    }

    fn has_message(&self, kind: &str) -> bool {
        self.messages.iter().any(|(k, _)| k == kind)
    }
}

impl HistoryItem {
    /// Job status for this entry; entries without a status block are running.
    pub fn job_status(&self, job_id: &str) -> JobStatus {
        let status = self.status.clone().unwrap_or_default();
        let mut job_status = JobStatus::new(status.state()).with_job_id(job_id);
        job_status.message = status.message();
        job_status
    }

    /// All image assets, grouped per output node in document order.
    ///
    /// Entries without a usable `filename` are skipped; nodes that produced
    /// no images are omitted.
    pub fn output_manifest(&self) -> OutputManifest {
        self.outputs
            .iter()
            .filter_map(|(node_id, output)| {
                let assets: Vec<OutputAsset> = output
                    .get("images")
                    .and_then(|v| v.as_array())
                    .map(|images| images.iter().filter_map(parse_output_image).collect())
                    .unwrap_or_default();
                (!assets.is_empty()).then(|| (node_id.clone(), assets))
            })
            .collect()
    }
}

/// Take the first asset of every node, preserving node order.
pub fn first_asset_per_node(manifest: &OutputManifest) -> Vec<OutputAsset> {
    manifest
        .values()
        .filter_map(|assets| assets.first().cloned())
        .collect()
}

fn parse_output_image(value: &serde_json::Value) -> Option<OutputAsset> {
    let filename = value.get("filename")?.as_str()?;
    if filename.is_empty() {
        return None;
    }
    let subfolder = value.get("subfolder").and_then(|v| v.as_str()).unwrap_or("");
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_OUTPUT_KIND);

    Some(OutputAsset {
        filename: filename.to_string(),
        subfolder: subfolder.to_string(),
        kind: kind.to_string(),
    })
}
