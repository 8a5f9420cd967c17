//! # DIT Common Library
//!
//! Shared code for the document ingestion tracker:
//! - Error types
//! - Event types (DitEvent enum) and the EventBus
//! - Configuration loading and resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
