//! Status aggregation
//!
//! Maps a bundle's files and declared expected count to a bundle status.
//! The rules are an ordered cascade: the first matching branch wins, and the
//! branches overlap, so their order is part of the contract.
//!
//! | # | Guard                                   | Result                             |
//! |---|-----------------------------------------|------------------------------------|
//! | 1 | fewer files than `total_files`          | `incomplete`                       |
//! | 2 | every file `completed`                  | `completed`                        |
//! | 3 | any file `importing`                    | `importing`                        |
//! | 4 | any file `imported`                     | `imported` if all, else `incomplete` |
//! | 5 | any file `failed`                       | `failed`                           |
//! | 6 | any file `parsing`                      | `parsing`                          |
//! | 7 | otherwise                               | `incomplete`                       |
//!
//! Rule 4 downgrades a partially imported bundle to `incomplete`. During a
//! normal import the remaining files are still `importing`, so rule 3 masks
//! it; it only shows for file sets mixing `imported` with non-import states.

use dit_common::events::{BundleStatus, FileStatus};

use crate::models::BundleFile;

/// Derive the bundle status from its files
///
/// Pure and deterministic: no side effects, same input gives same output.
pub fn derive_status(files: &[BundleFile], total_files: usize) -> BundleStatus {
    let any = |status: FileStatus| files.iter().any(|f| f.status == status);
    let all = |status: FileStatus| files.iter().all(|f| f.status == status);

    if files.len() < total_files {
        BundleStatus::Incomplete
    } else if all(FileStatus::Completed) {
        BundleStatus::Completed
    } else if any(FileStatus::Importing) {
        BundleStatus::Importing
    } else if any(FileStatus::Imported) {
        if all(FileStatus::Imported) {
            BundleStatus::Imported
        } else {
            BundleStatus::Incomplete
        }
    } else if any(FileStatus::Failed) {
        BundleStatus::Failed
    } else if any(FileStatus::Parsing) {
        BundleStatus::Parsing
    } else {
        BundleStatus::Incomplete
    }
}
