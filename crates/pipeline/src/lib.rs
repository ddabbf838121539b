//! End-to-end image edit jobs against a ComfyUI backend.
//!
//! [`orchestrator::JobOrchestrator`] composes the workflow store and the
//! ComfyUI transport into one operation: upload, inject parameters,
//! validate, enqueue, poll to completion, and fetch the output image.

pub mod error;
pub mod orchestrator;
pub mod poll;
pub mod progress;
