//! Data models for dit-tracker
//!
//! - File lifecycle (one uploaded document)
//! - Bundle (named group of files with a derived status)

pub mod bundle;
pub mod file;

pub use bundle::{Bundle, BundleId, BundleProgress, BundleSpec, StatusChange};
pub use file::{BlobRef, BundleFile, FileSpec, FileTransition};
pub use dit_common::events::{BundleStatus, FileCategory, FileStatus};
