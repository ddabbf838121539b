//! ComfyUI workflow template model.
//!
//! A workflow is a JSON object keyed by node ID where each value carries a
//! `class_type`, an `inputs` object, and optional `_meta`. The template is
//! parsed once into a typed tree; each job clones it and injects the
//! uploaded image name and the user prompt into the designated nodes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Node class types and input field names
// ---------------------------------------------------------------------------

/// Class type expected on the input-image node.
pub const LOAD_IMAGE_CLASS: &str = "LoadImage";

/// Input field on the image node that receives the uploaded asset name.
pub const IMAGE_INPUT_FIELD: &str = "image";

/// Input field on the text node that receives the user prompt.
pub const TEXT_INPUT_FIELD: &str = "text";

/// Input field on the output node that connects it to an image source.
pub const OUTPUT_IMAGES_FIELD: &str = "images";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Optional display metadata attached to a node (`_meta` in the JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub title: String,
}

/// A single node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Literal values and `[source_node_id, output_index]` connections.
    #[serde(default)]
    pub inputs: IndexMap<String, serde_json::Value>,
    /// ComfyUI class type (e.g. "KSampler", "LoadImage").
    pub class_type: String,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
}

impl WorkflowNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            inputs: IndexMap::new(),
            class_type: class_type.into(),
            meta: None,
        }
    }

    /// Builder-style helper for setting one input value.
    pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Returns the input as a string slice if it holds a JSON string.
    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(|v| v.as_str())
    }

    /// Display title from `_meta`, if any.
    pub fn title(&self) -> Option<&str> {
        self.meta.as_ref().map(|m| m.title.as_str())
    }
}

/// A workflow graph: node ID to node, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowTemplate {
    nodes: IndexMap<String, WorkflowNode>,
}

impl WorkflowTemplate {
    /// Parse a workflow from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn node(&self, node_id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Insert or replace a node, returning the previous one.
    pub fn insert(&mut self, node_id: impl Into<String>, node: WorkflowNode) -> Option<WorkflowNode> {
        self.nodes.insert(node_id.into(), node)
    }

    /// Remove a node while keeping the order of the remaining ones.
    pub fn remove(&mut self, node_id: &str) -> Option<WorkflowNode> {
        self.nodes.shift_remove(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &WorkflowNode)> {
        self.nodes.iter()
    }

    /// Classify nodes by role for display.
    ///
    /// Class types containing `Load` or `Input` are inputs, those containing
    /// `Save` or `Output` are outputs, everything else is processing.
    pub fn summary(&self) -> WorkflowSummary {
        let mut summary = WorkflowSummary {
            node_count: self.nodes.len(),
            ..Default::default()
        };

        for (node_id, node) in &self.nodes {
            let class_type = node.class_type.as_str();
            let entry = format!("{node_id}: {class_type}");
            if class_type.contains("Load") || class_type.contains("Input") {
                summary.input_nodes.push(entry);
            } else if class_type.contains("Save") || class_type.contains("Output") {
                summary.output_nodes.push(entry);
            } else {
                summary.processing_nodes.push(entry);
            }
        }

        summary
    }

    fn node_mut(&mut self, node_id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(node_id)
    }
}

/// A concrete workflow ready to be enqueued: a template copy with the
/// runtime parameters injected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobPayload {
    workflow: WorkflowTemplate,
}

impl JobPayload {
    pub fn workflow(&self) -> &WorkflowTemplate {
        &self.workflow
    }

    pub fn into_workflow(self) -> WorkflowTemplate {
        self.workflow
    }
}

/// Node IDs that play each role in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBindings {
    pub image_node: String,
    pub text_node: String,
    pub sampler_node: String,
    pub decode_node: String,
    pub output_node: String,
}

impl Default for TemplateBindings {
    /// Node IDs of the bundled `Kontext_Image_Edit.json` workflow.
    fn default() -> Self {
        Self {
            image_node: "13".to_string(),
            text_node: "16".to_string(),
            sampler_node: "14".to_string(),
            decode_node: "3".to_string(),
            output_node: "15".to_string(),
        }
    }
}

impl TemplateBindings {
    /// All required nodes as `(role, node_id)` pairs.
    pub fn required_nodes(&self) -> [(&'static str, &str); 5] {
        [
            ("input-image", self.image_node.as_str()),
            ("prompt-text", self.text_node.as_str()),
            ("output", self.output_node.as_str()),
            ("decode", self.decode_node.as_str()),
            ("sampler", self.sampler_node.as_str()),
        ]
    }
}

/// Outcome of [`validate`]. Warnings never block submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// `true` iff there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Node breakdown produced by [`WorkflowTemplate::summary`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowSummary {
    pub node_count: usize,
    pub input_nodes: Vec<String>,
    pub output_nodes: Vec<String>,
    pub processing_nodes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Build a job payload from the template.
///
/// The template is cloned before mutation, so payloads built from the same
/// template never see each other's parameters. Fails with
/// [`CoreError::TemplateShape`] if the image or text node is missing. A
/// present image node with an unexpected class type only logs a warning.
pub fn instantiate(
    template: &WorkflowTemplate,
    bindings: &TemplateBindings,
    image_asset_name: &str,
    prompt: &str,
) -> Result<JobPayload, CoreError> {
    let image_node = template
        .node(&bindings.image_node)
        .ok_or_else(|| CoreError::TemplateShape {
            role: "input-image",
            node_id: bindings.image_node.clone(),
        })?;

    if !template.contains(&bindings.text_node) {
        return Err(CoreError::TemplateShape {
            role: "prompt-text",
            node_id: bindings.text_node.clone(),
        });
    }

    if image_node.class_type != LOAD_IMAGE_CLASS {
        tracing::warn!(
            node_id = %bindings.image_node,
            class_type = %image_node.class_type,
            "Image node is not a {LOAD_IMAGE_CLASS} node, injecting image anyway",
        );
    }

    let mut workflow = template.clone();

    if let Some(node) = workflow.node_mut(&bindings.image_node) {
        node.inputs.insert(
            IMAGE_INPUT_FIELD.to_string(),
            serde_json::Value::String(image_asset_name.to_string()),
        );
    }
    if let Some(node) = workflow.node_mut(&bindings.text_node) {
        node.inputs.insert(
            TEXT_INPUT_FIELD.to_string(),
            serde_json::Value::String(prompt.to_string()),
        );
    }

    tracing::debug!(
        image = %image_asset_name,
        prompt_len = prompt.len(),
        "Injected job parameters into workflow",
    );

    Ok(JobPayload { workflow })
}

/// Check that a workflow is fit for submission. Never mutates it.
pub fn validate(workflow: &WorkflowTemplate, bindings: &TemplateBindings) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (role, node_id) in bindings.required_nodes() {
        if !workflow.contains(node_id) {
            report
                .errors
                .push(format!("Missing required {role} node '{node_id}'"));
        }
    }

    if let Some(node) = workflow.node(&bindings.image_node) {
        if !has_text(node, IMAGE_INPUT_FIELD) {
            report.warnings.push(format!(
                "Input-image node '{}' has no image set",
                bindings.image_node
            ));
        }
    }

    if let Some(node) = workflow.node(&bindings.text_node) {
        if !has_text(node, TEXT_INPUT_FIELD) {
            report.warnings.push(format!(
                "Prompt-text node '{}' has no prompt text set",
                bindings.text_node
            ));
        }
    }

    if let Some(node) = workflow.node(&bindings.output_node) {
        if !node.inputs.contains_key(OUTPUT_IMAGES_FIELD) {
            report.errors.push(format!(
                "Output node '{}' has no '{OUTPUT_IMAGES_FIELD}' input connection",
                bindings.output_node
            ));
        }
    }

    report
}

fn has_text(node: &WorkflowNode, field: &str) -> bool {
    node.input_str(field).is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    // -- Helper: the five-node skeleton of the Kontext workflow ----------------

    // Raw text, so the node order below is the order the parser sees.
    const SAMPLE: &str = r#"{
        "3": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["14", 0], "vae": ["10", 0] }
        },
        "13": {
            "class_type": "LoadImage",
            "inputs": { "image": "placeholder.png" },
            "_meta": { "title": "Load Image" }
        },
        "14": {
            "class_type": "KSampler",
            "inputs": { "seed": 42, "steps": 20, "positive": ["6", 0] }
        },
        "15": {
            "class_type": "SaveImage",
            "inputs": { "images": ["3", 0], "filename_prefix": "kontext" }
        },
        "16": {
            "class_type": "TextInput",
            "inputs": { "text": "" }
        }
    }"#;

    fn sample_template() -> WorkflowTemplate {
        WorkflowTemplate::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn parse_preserves_document_order() {
        let template = sample_template();
        let ids: Vec<&str> = template.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["3", "13", "14", "15", "16"]);
        assert_eq!(template.node("13").unwrap().title(), Some("Load Image"));
    }

    #[test]
    fn parse_rejects_node_without_class_type() {
        let result = WorkflowTemplate::from_json(r#"{"1": {"inputs": {}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn instantiate_injects_image_and_prompt() {
        let template = sample_template();
        let payload =
            instantiate(&template, &TemplateBindings::default(), "upload.png", "make it blue")
                .unwrap();

        let workflow = payload.workflow();
        assert_eq!(workflow.node("13").unwrap().input_str("image"), Some("upload.png"));
        assert_eq!(workflow.node("16").unwrap().input_str("text"), Some("make it blue"));
    }

    #[test]
    fn instantiate_leaves_template_untouched() {
        let template = sample_template();
        let bindings = TemplateBindings::default();

        let first = instantiate(&template, &bindings, "a.png", "first prompt").unwrap();
        let second = instantiate(&template, &bindings, "b.png", "second prompt").unwrap();

        assert_eq!(first.workflow().node("13").unwrap().input_str("image"), Some("a.png"));
        assert_eq!(first.workflow().node("16").unwrap().input_str("text"), Some("first prompt"));
        assert_eq!(second.workflow().node("16").unwrap().input_str("text"), Some("second prompt"));
        assert_eq!(template.node("13").unwrap().input_str("image"), Some("placeholder.png"));
        assert_eq!(template.node("16").unwrap().input_str("text"), Some(""));
    }

    #[test]
    fn instantiate_fails_without_image_node() {
        let mut template = sample_template();
        template.remove("13");

        let result = instantiate(&template, &TemplateBindings::default(), "a.png", "p");
        assert_matches!(
            result,
            Err(CoreError::TemplateShape { role: "input-image", ref node_id }) if node_id == "13"
        );
    }

    #[test]
    fn instantiate_fails_without_text_node() {
        let mut template = sample_template();
        template.remove("16");

        let result = instantiate(&template, &TemplateBindings::default(), "a.png", "p");
        assert_matches!(result, Err(CoreError::TemplateShape { role: "prompt-text", .. }));
    }

    #[test]
    fn instantiate_tolerates_unexpected_image_class() {
        let mut template = sample_template();
        template.insert(
            "13",
            WorkflowNode::new("LoadImageFromUrl").with_input("image", json!("")),
        );

        let payload =
            instantiate(&template, &TemplateBindings::default(), "a.png", "p").unwrap();
        assert_eq!(payload.workflow().node("13").unwrap().input_str("image"), Some("a.png"));
    }

    #[test]
    fn validate_accepts_instantiated_payload() {
        let bindings = TemplateBindings::default();
        let payload = instantiate(&sample_template(), &bindings, "a.png", "p").unwrap();

        let report = validate(payload.workflow(), &bindings);
        assert!(report.is_ok());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn validate_reports_missing_sampler() {
        let mut template = sample_template();
        template.remove("14");

        let report = validate(&template, &TemplateBindings::default());
        assert!(!report.is_ok());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("'14'"));
        assert!(report.errors[0].contains("sampler"));
    }

    #[test]
    fn validate_warns_on_empty_prompt() {
        let template = sample_template();

        let report = validate(&template, &TemplateBindings::default());
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'16'"));
    }

    #[test]
    fn validate_warns_on_non_string_image() {
        let mut template = sample_template();
        template.insert("13", WorkflowNode::new("LoadImage").with_input("image", json!(7)));

        let report = validate(&template, &TemplateBindings::default());
        assert!(report.is_ok());
        assert!(report.warnings.iter().any(|w| w.contains("'13'")));
    }

    #[test]
    fn validate_requires_output_connection() {
        let mut template = sample_template();
        template.insert(
            "15",
            WorkflowNode::new("SaveImage").with_input("filename_prefix", json!("kontext")),
        );

        let report = validate(&template, &TemplateBindings::default());
        assert!(!report.is_ok());
        assert!(report.errors[0].contains("'15'"));
    }

    #[test]
    fn validate_reports_every_missing_node() {
        let report = validate(&WorkflowTemplate::default(), &TemplateBindings::default());
        assert_eq!(report.errors.len(), 5);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn summary_classifies_nodes() {
        let summary = sample_template().summary();

        assert_eq!(summary.node_count, 5);
        assert_eq!(summary.input_nodes, vec!["13: LoadImage", "16: TextInput"]);
        assert_eq!(summary.output_nodes, vec!["15: SaveImage"]);
        assert_eq!(summary.processing_nodes, vec!["3: VAEDecode", "14: KSampler"]);
    }

    #[test]
    fn payload_serializes_as_plain_workflow_object() {
        let bindings = TemplateBindings::default();
        let payload = instantiate(&sample_template(), &bindings, "a.png", "p").unwrap();

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["13"]["inputs"]["image"], "a.png");
        assert_eq!(value["13"]["_meta"]["title"], "Load Image");
        assert!(value["16"].get("_meta").is_none());
    }
}
