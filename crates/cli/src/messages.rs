//! User-facing wording for failed jobs.

use kontext_pipeline::error::{ErrorKind, ProcessFailure};

/// Short explanation of a failure suitable for the terminal.
///
/// Kinds without a dedicated hint fall back to the error's own message.
pub fn user_message(failure: &ProcessFailure, api_url: &str) -> String {
    match failure.kind() {
        ErrorKind::Network => format!(
            "ComfyUI is not running or not reachable, make sure the service is up ({api_url})"
        ),
        ErrorKind::TemplateLoad | ErrorKind::TemplateShape | ErrorKind::WorkflowValidation => {
            format!("Workflow configuration error, check the workflow file: {}", failure.error)
        }
        ErrorKind::Upload => format!("Image upload failed: {}", failure.error),
        ErrorKind::Timeout => {
            "Processing timed out, the image may be too large or the service busy. Try again later"
                .to_string()
        }
        ErrorKind::InvalidInput => failure.error.to_string(),
        _ => format!("Processing failed: {}", failure.error),
    }
}
