//! Import orchestrator
//!
//! Drives a `completed` bundle through a staggered import:
//! 1. every file is marked `importing` at once (bundle → `importing`)
//! 2. file *i* (bundle file order) is promoted to `imported` at
//!    `(i + 1) * stagger` after the start, so file *i* never completes
//!    before file *i − 1*
//! 3. the bundle status is re-derived after every promotion
//! 4. once the last file is promoted (bundle → `imported`) a single
//!    `BundleImported` event is emitted
//!
//! An import that has started always completes unless the bundle is deleted,
//! which cancels the remaining promotions.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dit_common::events::{BundleStatus, DitEvent, EventBus, FileStatus};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};
use crate::models::BundleId;
use crate::services::repository::{BundleRepository, BundleSlot};

pub struct ImportOrchestrator {
    repository: Arc<BundleRepository>,
    stagger: Duration,
}

impl ImportOrchestrator {
    pub fn new(repository: Arc<BundleRepository>, stagger: Duration) -> Self {
        Self { repository, stagger }
    }

    /// Start importing a `completed` bundle
    ///
    /// Fails with `InvalidState` for any other status, including a bundle
    /// already `importing` or `imported`.
    pub async fn import(&self, bundle_id: BundleId) -> TrackerResult<()> {
        let slot = self.repository.slot(bundle_id).await?;
        let event_bus = self.repository.event_bus().clone();

        let (order, _) = slot
            .apply(&event_bus, |bundle, events| {
                if bundle.status != BundleStatus::Completed {
                    return Err(TrackerError::InvalidState(format!(
                        "Bundle {} is {}, only completed bundles can be imported",
                        bundle_id, bundle.status
                    )));
                }

                for file in bundle.files.iter_mut() {
                    events.push(file.transition_to(FileStatus::Importing)?.into_event(bundle_id));
                }
                Ok(bundle.files.iter().map(|f| f.id).collect::<Vec<Uuid>>())
            })
            .await?;

        info!(
            bundle_id = %bundle_id,
            files = order.len(),
            stagger_ms = self.stagger.as_millis() as u64,
            "Import started"
        );

        tokio::spawn(run_staggered_import(slot, event_bus, order, self.stagger));
        Ok(())
    }
}

async fn run_staggered_import(
    slot: Arc<BundleSlot>,
    event_bus: EventBus,
    order: Vec<Uuid>,
    stagger: Duration,
) {
    let bundle_id = slot.id();
    let started = Instant::now();
    let file_count = order.len();

    for (index, file_id) in order.into_iter().enumerate() {
        let Some(deadline) = promotion_deadline(started, stagger, index) else {
            warn!(
                bundle_id = %bundle_id,
                index,
                stagger_ms = stagger.as_millis() as u64,
                "Import aborted: promotion deadline out of range"
            );
            return;
        };

        tokio::select! {
            biased;
            _ = slot.cancellation().cancelled() => {
                warn!(
                    bundle_id = %bundle_id,
                    remaining = file_count - index,
                    "Import dropped: bundle deleted"
                );
                return;
            }
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let result = slot
            .apply(&event_bus, |bundle, events| {
                let file = bundle.require_file_mut(file_id)?;
                events.push(file.transition_to(FileStatus::Imported)?.into_event(bundle_id));
                Ok(())
            })
            .await;

        match result {
            Ok((_, bundle)) => debug!(
                bundle_id = %bundle_id,
                file_id = %file_id,
                index,
                status = %bundle.status,
                "File imported"
            ),
            Err(e) => {
                warn!(bundle_id = %bundle_id, file_id = %file_id, error = %e, "Import aborted");
                return;
            }
        }
    }

    signal_completion(&slot, &event_bus, file_count).await;
}

/// Deadline of the file at `index`: `started + (index + 1) * stagger`
fn promotion_deadline(started: Instant, stagger: Duration, index: usize) -> Option<Instant> {
    let steps = u32::try_from(index.checked_add(1)?).ok()?;
    started.checked_add(stagger.checked_mul(steps)?)
}

/// Emit `BundleImported` once every file has been promoted
async fn signal_completion(slot: &BundleSlot, event_bus: &EventBus, file_count: usize) {
    let bundle_id = slot.id();
    let result = slot
        .apply(event_bus, |bundle, events| {
            if bundle.status != BundleStatus::Imported {
                return Err(TrackerError::InvalidState(format!(
                    "Bundle {} finished import as {}",
                    bundle_id, bundle.status
                )));
            }
            events.push(DitEvent::BundleImported {
                bundle_id,
                file_count,
                timestamp: Utc::now(),
            });
            Ok(())
        })
        .await;

    match result {
        Ok(_) => info!(bundle_id = %bundle_id, files = file_count, "Import finished"),
        Err(e) => warn!(bundle_id = %bundle_id, error = %e, "Import completion not signalled"),
    }
}
