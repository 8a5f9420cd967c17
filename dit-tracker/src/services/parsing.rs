//! Simulated document parsing
//!
//! Stands in for the external parsing service: a file entering `parsing` is
//! resolved to `completed` after a fixed delay unless it was settled, removed
//! or its bundle deleted in the meantime. Each schedule is tied to the file's
//! generation, so a file failed and retried since is left to the retry.

use std::sync::Arc;
use std::time::Duration;

use dit_common::events::{EventBus, FileStatus};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::repository::BundleSlot;

#[derive(Clone)]
pub struct ParseSimulator {
    event_bus: EventBus,
    delay: Duration,
}

impl ParseSimulator {
    pub fn new(event_bus: EventBus, delay: Duration) -> Self {
        Self { event_bus, delay }
    }

    /// Schedule the simulated parse of `file_id` at `generation`
    pub fn schedule(&self, slot: Arc<BundleSlot>, file_id: Uuid, generation: u64) {
        let event_bus = self.event_bus.clone();
        let delay = self.delay;

        tokio::spawn(async move {
            let bundle_id = slot.id();

            tokio::select! {
                biased;
                _ = slot.cancellation().cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = slot
                .apply(&event_bus, |bundle, events| {
                    if let Some(file) = bundle.file_mut(file_id) {
                        if file.is_parsing_at(generation) {
                            events.push(
                                file.transition_to(FileStatus::Completed)?
                                    .into_event(bundle_id),
                            );
                        }
                    }
                    Ok(())
                })
                .await;

            match result {
                Ok(_) => debug!(bundle_id = %bundle_id, file_id = %file_id, "Simulated parse finished"),
                Err(e) => warn!(bundle_id = %bundle_id, file_id = %file_id, error = %e, "Simulated parse dropped"),
            }
        });
    }
}
