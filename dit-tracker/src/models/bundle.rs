//! Bundle model
//!
//! A named group of files with a declared expected size. The bundle status is
//! never assigned directly: it is re-derived from the files after every
//! mutation (see `services::status`).

use chrono::{DateTime, Utc};
use dit_common::events::{BundleStatus, DitEvent, FileStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};
use crate::models::BundleFile;
use crate::services::status::derive_status;

/// Bundle identifier
pub type BundleId = Uuid;

/// Caller-supplied description of a bundle to create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSpec {
    pub name: String,
    pub total_files: usize,
    /// Origin tag, opaque to the tracker
    pub source: String,
}

/// A tracked bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub source: String,
    /// Insertion order is the import order
    pub files: Vec<BundleFile>,
    pub total_files: usize,
    pub status: BundleStatus,
}

/// Derived status change produced by a re-derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub bundle_id: BundleId,
    pub old_status: BundleStatus,
    pub new_status: BundleStatus,
    pub changed_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn into_event(self) -> DitEvent {
        DitEvent::BundleStatusChanged {
            bundle_id: self.bundle_id,
            old_status: self.old_status,
            new_status: self.new_status,
            timestamp: self.changed_at,
        }
    }
}

/// Per-status file counts for import-status displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleProgress {
    pub bundle_id: BundleId,
    pub status: BundleStatus,
    /// Declared expected count
    pub total_files: usize,
    /// Files currently in the bundle
    pub present: usize,
    pub parsing: usize,
    pub completed: usize,
    pub failed: usize,
    pub importing: usize,
    pub imported: usize,
    /// Imported files as a share of `total_files` (0.0 - 100.0)
    pub percentage_imported: f64,
}

impl Bundle {
    /// Create an empty bundle in `incomplete`
    pub fn new(spec: BundleSpec) -> TrackerResult<Self> {
        if spec.total_files == 0 {
            return Err(TrackerError::InvalidInput(
                "total_files must be at least 1".to_string(),
            ));
        }
        if spec.name.trim().is_empty() {
            return Err(TrackerError::InvalidInput(
                "bundle name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            name: spec.name,
            created_at: Utc::now(),
            source: spec.source,
            files: Vec::new(),
            total_files: spec.total_files,
            status: BundleStatus::Incomplete,
        })
    }

    pub fn is_full(&self) -> bool {
        self.files.len() >= self.total_files
    }

    pub fn file(&self, file_id: Uuid) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.id == file_id)
    }

    pub fn file_mut(&mut self, file_id: Uuid) -> Option<&mut BundleFile> {
        self.files.iter_mut().find(|f| f.id == file_id)
    }

    /// Lookup that reports a missing file as `NoSuchFile`
    pub fn require_file_mut(&mut self, file_id: Uuid) -> TrackerResult<&mut BundleFile> {
        let bundle_id = self.id;
        self.file_mut(file_id)
            .ok_or(TrackerError::NoSuchFile { bundle_id, file_id })
    }

    pub fn main_file(&self) -> Option<&BundleFile> {
        self.files.iter().find(|f| f.is_main())
    }

    /// Reject file-set changes once an import has started
    pub fn ensure_not_import_locked(&self) -> TrackerResult<()> {
        if self.status.is_import_locked() {
            return Err(TrackerError::InvalidState(format!(
                "Bundle {} is {} and no longer accepts file changes",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Re-derive `status` from the files
    ///
    /// Returns the change when the derived status differs from the stored one.
    pub fn refresh_status(&mut self) -> Option<StatusChange> {
        let derived = derive_status(&self.files, self.total_files);
        if derived == self.status {
            return None;
        }

        let change = StatusChange {
            bundle_id: self.id,
            old_status: self.status,
            new_status: derived,
            changed_at: Utc::now(),
        };
        self.status = derived;
        Some(change)
    }

    pub fn progress(&self) -> BundleProgress {
        let count = |status: FileStatus| self.files.iter().filter(|f| f.status == status).count();
        let imported = count(FileStatus::Imported);

        BundleProgress {
            bundle_id: self.id,
            status: self.status,
            total_files: self.total_files,
            present: self.files.len(),
            parsing: count(FileStatus::Parsing),
            completed: count(FileStatus::Completed),
            failed: count(FileStatus::Failed),
            importing: count(FileStatus::Importing),
            imported,
            percentage_imported: (imported as f64 / self.total_files as f64) * 100.0,
        }
    }
}
