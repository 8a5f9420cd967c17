//! dit-tracker library interface
//!
//! Document ingestion tracker core: bundle/file lifecycle, status
//! aggregation, staggered import and active-bundle selection.

pub mod error;
pub mod models;
pub mod services;
pub mod tracker;

pub use crate::error::{TrackerError, TrackerResult};
pub use crate::services::SelectionOutcome;
pub use crate::tracker::BundleTracker;
