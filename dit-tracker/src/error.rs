//! Error types for dit-tracker
//!
//! Every error is local, synchronous and recoverable: callers get it back
//! from the command that caused it and the tracker state is left unchanged.

use thiserror::Error;
use uuid::Uuid;

/// Tracker command error type
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Unknown (or already deleted) bundle
    #[error("Bundle not found: {0}")]
    NoSuchBundle(Uuid),

    /// Unknown file within an existing bundle
    #[error("File {file_id} not found in bundle {bundle_id}")]
    NoSuchFile { bundle_id: Uuid, file_id: Uuid },

    /// Adding a file would exceed the declared expected count
    #[error("Bundle {bundle_id} is full ({total_files} files expected)")]
    BundleFull { bundle_id: Uuid, total_files: usize },

    /// A bundle holds at most one `main` file
    #[error("Bundle {bundle_id} already has a main file")]
    DuplicateMainFile { bundle_id: Uuid },

    /// Command not allowed in the bundle's or file's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed command argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// dit-common error
    #[error("Common error: {0}")]
    Common(#[from] dit_common::Error),
}

/// Result type for tracker commands
pub type TrackerResult<T> = Result<T, TrackerError>;
