//! Bundle and file status type definitions
//!
//! Supporting types shared by the tracker and every event consumer.

use serde::{Deserialize, Serialize};

/// Processing status of a single file within a bundle
///
/// Legal transitions:
/// - `Parsing → Completed | Failed`
/// - `Completed → Importing → Imported`
/// - `Failed → Parsing` (explicit retry only)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Awaiting (or undergoing) content parsing
    Parsing,
    /// Parsed successfully
    Completed,
    /// Parsing failed; cleared only by a retry
    Failed,
    /// Import in progress
    Importing,
    /// Import finished
    Imported,
}

impl FileStatus {
    /// Whether `self → next` is a legal lifecycle transition
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Parsing, Completed)
                | (Parsing, Failed)
                | (Completed, Importing)
                | (Importing, Imported)
                | (Failed, Parsing)
        )
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Parsing => write!(f, "parsing"),
            FileStatus::Completed => write!(f, "completed"),
            FileStatus::Failed => write!(f, "failed"),
            FileStatus::Importing => write!(f, "importing"),
            FileStatus::Imported => write!(f, "imported"),
        }
    }
}

/// Aggregate status of a bundle, always derived from its files
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    Incomplete,
    Parsing,
    Completed,
    Failed,
    Importing,
    Imported,
}

impl BundleStatus {
    /// Bundles in these states no longer accept file-set changes
    pub fn is_import_locked(self) -> bool {
        matches!(self, BundleStatus::Importing | BundleStatus::Imported)
    }
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleStatus::Incomplete => write!(f, "incomplete"),
            BundleStatus::Parsing => write!(f, "parsing"),
            BundleStatus::Completed => write!(f, "completed"),
            BundleStatus::Failed => write!(f, "failed"),
            BundleStatus::Importing => write!(f, "importing"),
            BundleStatus::Imported => write!(f, "imported"),
        }
    }
}

/// Role of a file within its bundle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// The bundle's primary document (at most one per bundle)
    Main,
    #[default]
    Supporting,
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileCategory::Main => write!(f, "main"),
            FileCategory::Supporting => write!(f, "supporting"),
        }
    }
}
