//! Retry coordinator
//!
//! Re-drives failed files back into processing: every `failed` file moves to
//! `parsing` immediately, then to `completed` after the configured
//! processing delay.

use std::sync::Arc;
use std::time::Duration;

use dit_common::events::{EventBus, FileStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TrackerResult;
use crate::models::BundleId;
use crate::services::repository::{BundleRepository, BundleSlot};

pub struct RetryCoordinator {
    repository: Arc<BundleRepository>,
    processing_delay: Duration,
}

impl RetryCoordinator {
    pub fn new(repository: Arc<BundleRepository>, processing_delay: Duration) -> Self {
        Self {
            repository,
            processing_delay,
        }
    }

    /// Move every failed file back to `parsing` and schedule its completion
    ///
    /// A bundle without failed files is left as is (the re-derivation is a
    /// no-change) and nothing is scheduled.
    pub async fn retry(&self, bundle_id: BundleId) -> TrackerResult<()> {
        let slot = self.repository.slot(bundle_id).await?;
        let event_bus = self.repository.event_bus().clone();

        let (moved, _) = slot
            .apply(&event_bus, |bundle, events| {
                let mut moved = Vec::new();
                for file in bundle.files.iter_mut().filter(|f| f.status == FileStatus::Failed) {
                    events.push(file.transition_to(FileStatus::Parsing)?.into_event(bundle_id));
                    moved.push((file.id, file.generation));
                }
                Ok(moved)
            })
            .await?;

        if moved.is_empty() {
            debug!(bundle_id = %bundle_id, "Retry requested with no failed files");
            return Ok(());
        }

        info!(bundle_id = %bundle_id, files = moved.len(), "Retrying failed files");

        tokio::spawn(complete_after_delay(
            slot,
            event_bus,
            moved,
            self.processing_delay,
        ));
        Ok(())
    }
}

async fn complete_after_delay(
    slot: Arc<BundleSlot>,
    event_bus: EventBus,
    moved: Vec<(Uuid, u64)>,
    delay: Duration,
) {
    let bundle_id = slot.id();

    tokio::select! {
        biased;
        _ = slot.cancellation().cancelled() => {
            warn!(bundle_id = %bundle_id, "Retry dropped: bundle deleted");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    let result = slot
        .apply(&event_bus, |bundle, events| {
            // Files removed, re-resolved or retried again in the meantime are left alone
            for (file_id, generation) in &moved {
                if let Some(file) = bundle.file_mut(*file_id) {
                    if file.is_parsing_at(*generation) {
                        events.push(file.transition_to(FileStatus::Completed)?.into_event(bundle_id));
                    }
                }
            }
            Ok(())
        })
        .await;

    match result {
        Ok((_, bundle)) => info!(
            bundle_id = %bundle_id,
            status = %bundle.status,
            "Retry processing finished"
        ),
        Err(e) => warn!(bundle_id = %bundle_id, error = %e, "Retry completion dropped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlobRef, BundleSpec, FileSpec};
    use dit_common::events::{BundleStatus, FileCategory};

    async fn failed_bundle(repo: &BundleRepository) -> (BundleId, Uuid) {
        let bundle = repo
            .create(BundleSpec {
                name: "Retry me".to_string(),
                total_files: 1,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        let (file, _) = repo
            .add_file(
                bundle.id,
                FileSpec::new("a.pdf", FileCategory::Main, BlobRef::new("blob://a")),
            )
            .await
            .unwrap();
        repo.resolve_file(bundle.id, file.id, FileStatus::Failed).await.unwrap();
        (bundle.id, file.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_moves_failed_to_parsing_then_completed() {
        let repo = Arc::new(BundleRepository::new(EventBus::new(100)));
        let (bundle_id, file_id) = failed_bundle(&repo).await;
        let retry = RetryCoordinator::new(repo.clone(), Duration::from_millis(1500));

        retry.retry(bundle_id).await.unwrap();
        let bundle = repo.get(bundle_id).await.unwrap();
        assert_eq!(bundle.status, BundleStatus::Parsing);
        assert_eq!(bundle.file(file_id).unwrap().status, FileStatus::Parsing);

        tokio::time::sleep(Duration::from_millis(1499)).await;
        assert_eq!(repo.get(bundle_id).await.unwrap().status, BundleStatus::Parsing);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let bundle = repo.get(bundle_id).await.unwrap();
        assert_eq!(bundle.status, BundleStatus::Completed);
        assert_eq!(bundle.file(file_id).unwrap().status, FileStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_without_failures_is_noop() {
        let repo = Arc::new(BundleRepository::new(EventBus::new(100)));
        let bundle = repo
            .create(BundleSpec {
                name: "Fine".to_string(),
                total_files: 2,
                source: "test".to_string(),
            })
            .await
            .unwrap();
        let retry = RetryCoordinator::new(repo.clone(), Duration::from_millis(10));

        let before = repo.get(bundle.id).await.unwrap();
        retry.retry(bundle.id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(repo.get(bundle.id).await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cancelled_by_delete() {
        let repo = Arc::new(BundleRepository::new(EventBus::new(100)));
        let (bundle_id, _) = failed_bundle(&repo).await;
        let slot = repo.slot(bundle_id).await.unwrap();
        let retry = RetryCoordinator::new(repo.clone(), Duration::from_millis(100));

        retry.retry(bundle_id).await.unwrap();
        repo.delete(bundle_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(repo.get(bundle_id).await.is_err());
        assert!(slot.snapshot().await.is_err(), "detached slot stays dead");
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_retry_timer_does_not_settle_later_retry() {
        let repo = Arc::new(BundleRepository::new(EventBus::new(100)));
        let (bundle_id, file_id) = failed_bundle(&repo).await;
        let retry = RetryCoordinator::new(repo.clone(), Duration::from_millis(1500));

        // First retry at t=0, fails again at t=1000, second retry at t=1000
        retry.retry(bundle_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        repo.resolve_file(bundle_id, file_id, FileStatus::Failed)
            .await
            .unwrap();
        retry.retry(bundle_id).await.unwrap();

        // The first timer fires at t=1500 and must not touch the second attempt
        tokio::time::sleep(Duration::from_millis(600)).await;
        let bundle = repo.get(bundle_id).await.unwrap();
        assert_eq!(bundle.file(file_id).unwrap().status, FileStatus::Parsing);
        assert_eq!(bundle.status, BundleStatus::Parsing);

        // The second attempt completes at t=2500
        tokio::time::sleep(Duration::from_millis(500)).await;
        let bundle = repo.get(bundle_id).await.unwrap();
        assert_eq!(bundle.file(file_id).unwrap().status, FileStatus::Completed);
    }
}
