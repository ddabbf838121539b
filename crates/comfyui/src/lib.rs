//! ComfyUI REST client library.
//!
//! Provides the HTTP transport used to drive a ComfyUI server (upload,
//! enqueue, history polling, output download, interruption) together
//! with typed wire models and job status interpretation.

pub mod api;
pub mod history;
pub mod models;
pub mod status;
