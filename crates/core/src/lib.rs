//! Shared domain types for the Kontext image-edit client.
//!
//! Holds the workflow template model (parsing, parameter injection,
//! validation, caching), image file checks, and the UI state store.

pub mod app_state;
pub mod error;
pub mod image;
pub mod types;
pub mod workflow;
pub mod workflow_store;
