#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to load workflow template from {source_name}: {message}")]
    TemplateLoad { source_name: String, message: String },

    #[error("Workflow template is missing the {role} node '{node_id}'")]
    TemplateShape { role: &'static str, node_id: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
