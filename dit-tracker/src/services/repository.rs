//! Bundle repository
//!
//! Owns the authoritative bundle collection. Each bundle lives in its own
//! slot behind a per-bundle mutex; every read-modify-write of a bundle,
//! including the status re-derivation that follows it, happens under that
//! one lock. Scheduled work holds the slot, never the repository, so a
//! deleted bundle can be mutated at most in its detached slot and is never
//! resurrected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dit_common::events::{DitEvent, EventBus, FileCategory, FileStatus};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};
use crate::models::{Bundle, BundleFile, BundleId, BundleSpec, FileSpec};

/// Storage cell for one bundle
pub struct BundleSlot {
    id: BundleId,
    state: Mutex<Bundle>,
    /// Set (under the state lock) when the bundle is removed
    deleted: AtomicBool,
    /// Cancelled on deletion or shutdown; stops every scheduled task for this bundle
    cancel: CancellationToken,
}

impl BundleSlot {
    pub fn id(&self) -> BundleId {
        self.id
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Snapshot of the bundle
    pub async fn snapshot(&self) -> TrackerResult<Bundle> {
        let bundle = self.state.lock().await;
        if self.is_deleted() {
            return Err(TrackerError::NoSuchBundle(self.id));
        }
        Ok(bundle.clone())
    }

    /// Apply `mutate` under the bundle lock, then re-derive the status
    ///
    /// `mutate` must validate before it modifies: on `Err` the bundle is
    /// expected to be untouched. Events pushed by `mutate` and the resulting
    /// status change are emitted while the lock is still held, so subscribers
    /// see them in mutation order.
    pub async fn apply<T>(
        &self,
        event_bus: &EventBus,
        mutate: impl FnOnce(&mut Bundle, &mut Vec<DitEvent>) -> TrackerResult<T>,
    ) -> TrackerResult<(T, Bundle)> {
        let mut bundle = self.state.lock().await;
        if self.is_deleted() {
            return Err(TrackerError::NoSuchBundle(self.id));
        }

        let mut events = Vec::new();
        let value = mutate(&mut *bundle, &mut events)?;

        if let Some(change) = bundle.refresh_status() {
            debug!(
                bundle_id = %self.id,
                old_status = %change.old_status,
                new_status = %change.new_status,
                "Bundle status re-derived"
            );
            events.push(change.into_event());
        }

        for event in events {
            event_bus.emit_lossy(event);
        }

        Ok((value, bundle.clone()))
    }
}

/// Authoritative bundle collection
pub struct BundleRepository {
    /// Slots in creation order
    slots: RwLock<Vec<Arc<BundleSlot>>>,
    event_bus: EventBus,
    /// Parent of every slot token
    shutdown: CancellationToken,
}

impl BundleRepository {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            slots: RwLock::new(Vec::new()),
            event_bus,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Register a new, empty bundle
    pub async fn create(&self, spec: BundleSpec) -> TrackerResult<Bundle> {
        let bundle = Bundle::new(spec)?;
        let slot = Arc::new(BundleSlot {
            id: bundle.id,
            state: Mutex::new(bundle.clone()),
            deleted: AtomicBool::new(false),
            cancel: self.shutdown.child_token(),
        });

        self.slots.write().await.push(slot);

        info!(
            bundle_id = %bundle.id,
            name = %bundle.name,
            total_files = bundle.total_files,
            "Bundle created"
        );
        self.event_bus.emit_lossy(DitEvent::BundleCreated {
            bundle_id: bundle.id,
            name: bundle.name.clone(),
            total_files: bundle.total_files,
            timestamp: bundle.created_at,
        });

        Ok(bundle)
    }

    pub async fn slot(&self, bundle_id: BundleId) -> TrackerResult<Arc<BundleSlot>> {
        self.slots
            .read()
            .await
            .iter()
            .find(|s| s.id == bundle_id)
            .cloned()
            .ok_or(TrackerError::NoSuchBundle(bundle_id))
    }

    pub async fn get(&self, bundle_id: BundleId) -> TrackerResult<Bundle> {
        self.slot(bundle_id).await?.snapshot().await
    }

    /// Snapshot of every bundle, in creation order
    pub async fn list(&self) -> Vec<Bundle> {
        let slots: Vec<Arc<BundleSlot>> = self.slots.read().await.clone();
        let mut bundles = Vec::with_capacity(slots.len());
        for slot in slots {
            // A slot deleted since the read lock was released is skipped
            if let Ok(bundle) = slot.snapshot().await {
                bundles.push(bundle);
            }
        }
        bundles
    }

    /// Append a new `parsing` file
    ///
    /// Returns the new file and the updated bundle.
    pub async fn add_file(
        &self,
        bundle_id: BundleId,
        spec: FileSpec,
    ) -> TrackerResult<(BundleFile, Bundle)> {
        let slot = self.slot(bundle_id).await?;
        self.add_file_to_slot(&slot, spec).await
    }

    /// `add_file` against a slot the caller already holds
    pub async fn add_file_to_slot(
        &self,
        slot: &BundleSlot,
        spec: FileSpec,
    ) -> TrackerResult<(BundleFile, Bundle)> {
        let bundle_id = slot.id();
        let (file, bundle) = slot
            .apply(&self.event_bus, |bundle, events| {
                bundle.ensure_not_import_locked()?;
                if bundle.is_full() {
                    return Err(TrackerError::BundleFull {
                        bundle_id,
                        total_files: bundle.total_files,
                    });
                }
                if spec.category == FileCategory::Main && bundle.main_file().is_some() {
                    return Err(TrackerError::DuplicateMainFile { bundle_id });
                }

                let file = BundleFile::new(spec);
                events.push(DitEvent::FileAdded {
                    bundle_id,
                    file_id: file.id,
                    name: file.name.clone(),
                    category: file.category,
                    timestamp: Utc::now(),
                });
                bundle.files.push(file.clone());
                Ok(file)
            })
            .await?;

        debug!(
            bundle_id = %bundle_id,
            file_id = %file.id,
            files = bundle.files.len(),
            total_files = bundle.total_files,
            "File added"
        );
        Ok((file, bundle))
    }

    /// Replace the bundle's file collection wholesale
    ///
    /// A supplied file that reuses the id of a current file starts a new
    /// generation, so work scheduled for the old entry never touches it.
    pub async fn replace_files(
        &self,
        bundle_id: BundleId,
        files: Vec<BundleFile>,
    ) -> TrackerResult<Bundle> {
        let slot = self.slot(bundle_id).await?;
        self.replace_files_in_slot(&slot, files).await
    }

    /// `replace_files` against a slot the caller already holds
    pub async fn replace_files_in_slot(
        &self,
        slot: &BundleSlot,
        mut files: Vec<BundleFile>,
    ) -> TrackerResult<Bundle> {
        let bundle_id = slot.id();
        let (_, bundle) = slot
            .apply(&self.event_bus, |bundle, events| {
                bundle.ensure_not_import_locked()?;
                if files.len() > bundle.total_files {
                    return Err(TrackerError::BundleFull {
                        bundle_id,
                        total_files: bundle.total_files,
                    });
                }
                if files.iter().filter(|f| f.is_main()).count() > 1 {
                    return Err(TrackerError::DuplicateMainFile { bundle_id });
                }
                for (i, file) in files.iter().enumerate() {
                    if files[..i].iter().any(|other| other.id == file.id) {
                        return Err(TrackerError::InvalidInput(format!(
                            "Duplicate file id {} in replacement set",
                            file.id
                        )));
                    }
                    if matches!(file.status, FileStatus::Importing | FileStatus::Imported) {
                        return Err(TrackerError::InvalidInput(format!(
                            "File {} cannot be supplied as {}; only imports promote files",
                            file.id, file.status
                        )));
                    }
                }

                for file in files.iter_mut() {
                    if let Some(current) = bundle.file(file.id) {
                        file.generation = file.generation.max(current.generation).wrapping_add(1);
                    }
                }

                events.push(DitEvent::FilesReplaced {
                    bundle_id,
                    file_count: files.len(),
                    timestamp: Utc::now(),
                });
                bundle.files = files;
                Ok(())
            })
            .await?;

        debug!(bundle_id = %bundle_id, files = bundle.files.len(), "Files replaced");
        Ok(bundle)
    }

    pub async fn delete_file(&self, bundle_id: BundleId, file_id: Uuid) -> TrackerResult<Bundle> {
        let slot = self.slot(bundle_id).await?;
        let (_, bundle) = slot
            .apply(&self.event_bus, |bundle, events| {
                bundle.ensure_not_import_locked()?;
                let index = bundle
                    .files
                    .iter()
                    .position(|f| f.id == file_id)
                    .ok_or(TrackerError::NoSuchFile { bundle_id, file_id })?;

                bundle.files.remove(index);
                events.push(DitEvent::FileRemoved {
                    bundle_id,
                    file_id,
                    timestamp: Utc::now(),
                });
                Ok(())
            })
            .await?;

        debug!(bundle_id = %bundle_id, file_id = %file_id, "File removed");
        Ok(bundle)
    }

    /// Settle a `parsing` file to `completed` or `failed`
    pub async fn resolve_file(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        outcome: FileStatus,
    ) -> TrackerResult<Bundle> {
        if !matches!(outcome, FileStatus::Completed | FileStatus::Failed) {
            return Err(TrackerError::InvalidInput(format!(
                "Parse outcome must be completed or failed, got {}",
                outcome
            )));
        }

        let slot = self.slot(bundle_id).await?;
        let (_, bundle) = slot
            .apply(&self.event_bus, |bundle, events| {
                let file = bundle.require_file_mut(file_id)?;
                if file.status != FileStatus::Parsing {
                    return Err(TrackerError::InvalidState(format!(
                        "File {} is {}, only parsing files can be resolved",
                        file_id, file.status
                    )));
                }
                events.push(file.transition_to(outcome)?.into_event(bundle_id));
                Ok(())
            })
            .await?;

        debug!(bundle_id = %bundle_id, file_id = %file_id, outcome = %outcome, "File resolved");
        Ok(bundle)
    }

    /// Change a file's display name
    pub async fn rename_file(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        name: String,
    ) -> TrackerResult<Bundle> {
        if name.trim().is_empty() {
            return Err(TrackerError::InvalidInput("file name must not be empty".to_string()));
        }

        let slot = self.slot(bundle_id).await?;
        let (_, bundle) = slot
            .apply(&self.event_bus, |bundle, _| {
                bundle.require_file_mut(file_id)?.name = name;
                Ok(())
            })
            .await?;
        Ok(bundle)
    }

    pub async fn set_file_category(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        category: FileCategory,
    ) -> TrackerResult<Bundle> {
        let slot = self.slot(bundle_id).await?;
        let (_, bundle) = slot
            .apply(&self.event_bus, |bundle, _| {
                bundle.ensure_not_import_locked()?;
                let other_main = bundle
                    .files
                    .iter()
                    .any(|f| f.is_main() && f.id != file_id);
                if category == FileCategory::Main && other_main {
                    return Err(TrackerError::DuplicateMainFile { bundle_id });
                }
                bundle.require_file_mut(file_id)?.category = category;
                Ok(())
            })
            .await?;
        Ok(bundle)
    }

    /// Remove a bundle and cancel its scheduled work
    pub async fn delete(&self, bundle_id: BundleId) -> TrackerResult<()> {
        let slot = {
            let mut slots = self.slots.write().await;
            let index = slots
                .iter()
                .position(|s| s.id == bundle_id)
                .ok_or(TrackerError::NoSuchBundle(bundle_id))?;
            slots.remove(index)
        };

        // Mark under the bundle lock: any task that locks after this sees it
        {
            let _bundle = slot.state.lock().await;
            slot.deleted.store(true, Ordering::Release);
            slot.cancel.cancel();
        }

        info!(bundle_id = %bundle_id, "Bundle deleted");
        self.event_bus.emit_lossy(DitEvent::BundleDeleted {
            bundle_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Cancel the scheduled work of every bundle; bundles stay readable
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlobRef;
    use dit_common::events::BundleStatus;

    fn repo() -> BundleRepository {
        BundleRepository::new(EventBus::new(100))
    }

    fn spec(total_files: usize) -> BundleSpec {
        BundleSpec {
            name: "Contracts".to_string(),
            total_files,
            source: "wizard".to_string(),
        }
    }

    fn file(name: &str, category: FileCategory) -> FileSpec {
        FileSpec::new(name, category, BlobRef::new(format!("blob://{}", name)))
    }

    #[tokio::test]
    async fn test_add_file_until_full() {
        let repo = repo();
        let bundle = repo.create(spec(1)).await.unwrap();

        let (_, updated) = repo
            .add_file(bundle.id, file("a.pdf", FileCategory::Main))
            .await
            .unwrap();
        assert_eq!(updated.status, BundleStatus::Parsing);

        let err = repo
            .add_file(bundle.id, file("b.pdf", FileCategory::Supporting))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::BundleFull { total_files: 1, .. }));
        assert_eq!(repo.get(bundle.id).await.unwrap().files.len(), 1);
    }

    #[tokio::test]
    async fn test_second_main_file_rejected() {
        let repo = repo();
        let bundle = repo.create(spec(3)).await.unwrap();
        repo.add_file(bundle.id, file("a.pdf", FileCategory::Main)).await.unwrap();

        let err = repo
            .add_file(bundle.id, file("b.pdf", FileCategory::Main))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateMainFile { .. }));
    }

    #[tokio::test]
    async fn test_unknown_bundle() {
        let repo = repo();
        let missing = Uuid::new_v4();
        let err = repo
            .add_file(missing, file("a.pdf", FileCategory::Main))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::NoSuchBundle(id) if id == missing));
        assert!(matches!(repo.delete(missing).await, Err(TrackerError::NoSuchBundle(_))));
    }

    #[tokio::test]
    async fn test_replace_files_rederives_status() {
        let repo = repo();
        let bundle = repo.create(spec(2)).await.unwrap();
        let files = vec![
            BundleFile::with_status(file("a.pdf", FileCategory::Main), FileStatus::Completed),
            BundleFile::with_status(file("b.pdf", FileCategory::Supporting), FileStatus::Completed),
        ];

        let updated = repo.replace_files(bundle.id, files).await.unwrap();
        assert_eq!(updated.status, BundleStatus::Completed);
    }

    #[tokio::test]
    async fn test_replace_files_rejects_oversized_set() {
        let repo = repo();
        let bundle = repo.create(spec(1)).await.unwrap();
        let files = vec![
            BundleFile::new(file("a.pdf", FileCategory::Supporting)),
            BundleFile::new(file("b.pdf", FileCategory::Supporting)),
        ];

        let err = repo.replace_files(bundle.id, files).await.unwrap_err();
        assert!(matches!(err, TrackerError::BundleFull { .. }));
    }

    #[tokio::test]
    async fn test_replace_files_reusing_id_starts_new_generation() {
        let repo = repo();
        let bundle = repo.create(spec(1)).await.unwrap();
        let (added, _) = repo
            .add_file(bundle.id, file("a.pdf", FileCategory::Main))
            .await
            .unwrap();

        let updated = repo
            .replace_files(bundle.id, vec![added.clone()])
            .await
            .unwrap();
        let replaced = updated.file(added.id).unwrap();
        assert_eq!(replaced.status, FileStatus::Parsing);
        assert!(!replaced.is_parsing_at(added.generation));
    }

    #[tokio::test]
    async fn test_add_file_to_held_slot() {
        let repo = repo();
        let bundle = repo.create(spec(2)).await.unwrap();
        let slot = repo.slot(bundle.id).await.unwrap();

        let (added, updated) = repo
            .add_file_to_slot(&slot, file("a.pdf", FileCategory::Main))
            .await
            .unwrap();
        assert_eq!(updated.file(added.id).unwrap().status, FileStatus::Parsing);
        assert_eq!(slot.snapshot().await.unwrap(), updated);

        // A slot whose bundle is gone refuses further adds
        repo.delete(bundle.id).await.unwrap();
        let err = repo
            .add_file_to_slot(&slot, file("b.pdf", FileCategory::Supporting))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::NoSuchBundle(id) if id == bundle.id));
    }

    #[tokio::test]
    async fn test_resolve_only_parsing_files() {
        let repo = repo();
        let bundle = repo.create(spec(1)).await.unwrap();
        let (added, _) = repo
            .add_file(bundle.id, file("a.pdf", FileCategory::Main))
            .await
            .unwrap();

        let updated = repo
            .resolve_file(bundle.id, added.id, FileStatus::Failed)
            .await
            .unwrap();
        assert_eq!(updated.status, BundleStatus::Failed);

        let err = repo
            .resolve_file(bundle.id, added.id, FileStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_delete_file_drops_back_to_incomplete() {
        let repo = repo();
        let bundle = repo.create(spec(1)).await.unwrap();
        let (added, _) = repo
            .add_file(bundle.id, file("a.pdf", FileCategory::Main))
            .await
            .unwrap();

        let updated = repo.delete_file(bundle.id, added.id).await.unwrap();
        assert_eq!(updated.status, BundleStatus::Incomplete);
        assert!(matches!(
            repo.delete_file(bundle.id, added.id).await,
            Err(TrackerError::NoSuchFile { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_category_respects_single_main() {
        let repo = repo();
        let bundle = repo.create(spec(2)).await.unwrap();
        repo.add_file(bundle.id, file("a.pdf", FileCategory::Main)).await.unwrap();
        let (b, _) = repo
            .add_file(bundle.id, file("b.pdf", FileCategory::Supporting))
            .await
            .unwrap();

        let err = repo
            .set_file_category(bundle.id, b.id, FileCategory::Main)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateMainFile { .. }));

        let renamed = repo
            .rename_file(bundle.id, b.id, "appendix.pdf".to_string())
            .await
            .unwrap();
        assert_eq!(renamed.file(b.id).unwrap().name, "appendix.pdf");
    }

    #[tokio::test]
    async fn test_list_preserves_creation_order_and_delete_cancels() {
        let repo = repo();
        let first = repo.create(spec(1)).await.unwrap();
        let second = repo.create(spec(1)).await.unwrap();

        let ids: Vec<_> = repo.list().await.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let slot = repo.slot(first.id).await.unwrap();
        repo.delete(first.id).await.unwrap();

        assert!(slot.cancellation().is_cancelled());
        assert!(matches!(slot.snapshot().await, Err(TrackerError::NoSuchBundle(_))));
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_events_follow_mutation_order() {
        let repo = repo();
        let mut rx = repo.event_bus().subscribe();
        let bundle = repo.create(spec(1)).await.unwrap();
        repo.add_file(bundle.id, file("a.pdf", FileCategory::Main)).await.unwrap();

        let types: Vec<String> = (0..3)
            .map(|_| rx.try_recv().unwrap().event_type().to_string())
            .collect();
        assert_eq!(types, vec!["BundleCreated", "FileAdded", "BundleStatusChanged"]);
    }
}
