//! File lifecycle
//!
//! One uploaded document inside a bundle. Status moves
//! PARSING → COMPLETED | FAILED, COMPLETED → IMPORTING → IMPORTED, and
//! FAILED → PARSING only through an explicit retry.

use chrono::{DateTime, Utc};
use dit_common::events::{DitEvent, FileCategory, FileStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};

/// Opaque reference to uploaded content; never inspected by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Caller-supplied description of a file to add
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSpec {
    pub name: String,
    #[serde(default)]
    pub category: FileCategory,
    /// Classification tag for downstream collaborators
    #[serde(default)]
    pub break_by: Option<String>,
    pub raw_blob: BlobRef,
    /// Free-text context for downstream collaborators
    #[serde(default)]
    pub context: Option<String>,
}

impl FileSpec {
    pub fn new(name: impl Into<String>, category: FileCategory, raw_blob: BlobRef) -> Self {
        Self {
            name: name.into(),
            category,
            break_by: None,
            raw_blob,
            context: None,
        }
    }

    pub fn with_break_by(mut self, break_by: impl Into<String>) -> Self {
        self.break_by = Some(break_by.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// A file tracked within a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleFile {
    pub id: Uuid,
    pub name: String,
    pub category: FileCategory,
    pub break_by: Option<String>,
    pub status: FileStatus,
    pub raw_blob: BlobRef,
    pub context: Option<String>,
    /// Incremented on every status change
    ///
    /// Scheduled work captures the generation it was created for and leaves
    /// the file alone once it has moved on, even if it is back in the same
    /// status.
    #[serde(default)]
    pub generation: u64,
}

/// Record of one file status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTransition {
    pub file_id: Uuid,
    pub old_status: FileStatus,
    pub new_status: FileStatus,
    pub transitioned_at: DateTime<Utc>,
}

impl FileTransition {
    pub fn into_event(self, bundle_id: Uuid) -> DitEvent {
        DitEvent::FileStatusChanged {
            bundle_id,
            file_id: self.file_id,
            old_status: self.old_status,
            new_status: self.new_status,
            timestamp: self.transitioned_at,
        }
    }
}

impl BundleFile {
    /// New file, starting in `parsing`
    pub fn new(spec: FileSpec) -> Self {
        Self::with_status(spec, FileStatus::Parsing)
    }

    /// File with an explicit status, for wholesale replacement by callers
    pub fn with_status(spec: FileSpec, status: FileStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            category: spec.category,
            break_by: spec.break_by,
            status,
            raw_blob: spec.raw_blob,
            context: spec.context,
            generation: 0,
        }
    }

    pub fn is_main(&self) -> bool {
        self.category == FileCategory::Main
    }

    /// Still `parsing` in the lifecycle phase identified by `generation`
    pub fn is_parsing_at(&self, generation: u64) -> bool {
        self.status == FileStatus::Parsing && self.generation == generation
    }

    /// Move to `next`, rejecting transitions outside the lifecycle
    pub fn transition_to(&mut self, next: FileStatus) -> TrackerResult<FileTransition> {
        if !self.status.can_transition_to(next) {
            return Err(TrackerError::InvalidState(format!(
                "File {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        let transition = FileTransition {
            file_id: self.id,
            old_status: self.status,
            new_status: next,
            transitioned_at: Utc::now(),
        };
        self.status = next;
        self.generation = self.generation.wrapping_add(1);
        Ok(transition)
    }
}
