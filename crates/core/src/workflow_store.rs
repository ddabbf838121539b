//! Cached access to the workflow template.
//!
//! [`WorkflowStore`] reads the template from its [`TemplateSource`] on
//! first use and hands out shared, read-only copies afterwards. Jobs never
//! mutate the cached template; [`crate::workflow::instantiate`] clones it.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::workflow::WorkflowTemplate;

/// Default location of the bundled workflow, relative to the working directory.
pub const DEFAULT_WORKFLOW_PATH: &str = "workflows/Kontext_Image_Edit.json";

/// Where the template JSON comes from.
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// A JSON file on disk.
    File(PathBuf),
    /// JSON text held in memory (embedded workflows, tests).
    Inline(String),
}

impl TemplateSource {
    fn describe(&self) -> String {
        match self {
            TemplateSource::File(path) => path.display().to_string(),
            TemplateSource::Inline(_) => "<inline>".to_string(),
        }
    }
}

impl Default for TemplateSource {
    fn default() -> Self {
        TemplateSource::File(PathBuf::from(DEFAULT_WORKFLOW_PATH))
    }
}

/// Loads and caches the workflow template.
pub struct WorkflowStore {
    source: TemplateSource,
    cached: RwLock<Option<Arc<WorkflowTemplate>>>,
}

impl WorkflowStore {
    pub fn new(source: TemplateSource) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    /// Return the cached template, reading the source on first use.
    pub async fn load(&self) -> Result<Arc<WorkflowTemplate>, CoreError> {
        if let Some(template) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(template));
        }

        let mut cached = self.cached.write().await;
        // Another task may have filled the cache while we waited.
        if let Some(template) = cached.as_ref() {
            return Ok(Arc::clone(template));
        }

        let template = Arc::new(self.read_source().await?);
        tracing::info!(
            source = %self.source.describe(),
            node_count = template.len(),
            "Workflow template loaded",
        );
        *cached = Some(Arc::clone(&template));
        Ok(template)
    }

    /// Whether a template is currently cached.
    pub async fn is_loaded(&self) -> bool {
        self.cached.read().await.is_some()
    }

    /// Drop the cached template so the next [`load`](Self::load) re-reads it.
    pub async fn reset(&self) {
        *self.cached.write().await = None;
        tracing::debug!("Workflow template cache cleared");
    }

    async fn read_source(&self) -> Result<WorkflowTemplate, CoreError> {
        let load_error = |message: String| CoreError::TemplateLoad {
            source_name: self.source.describe(),
            message,
        };

        let json = match &self.source {
            TemplateSource::File(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| load_error(e.to_string()))?,
            TemplateSource::Inline(json) => json.clone(),
        };

        let template = WorkflowTemplate::from_json(&json)
            .map_err(|e| load_error(format!("invalid workflow JSON: {e}")))?;

        if template.is_empty() {
            return Err(load_error("workflow contains no nodes".to_string()));
        }

        Ok(template)
    }
}
