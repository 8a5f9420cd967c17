//! Selection coordinator
//!
//! Tracks the single active bundle. Only fully imported bundles may be
//! selected; anything else is refused with a warning and leaves the current
//! selection unchanged. The coordinator reads bundle status and never
//! mutates it.

use std::sync::Arc;

use chrono::Utc;
use dit_common::events::{BundleStatus, DitEvent, EventBus};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::models::BundleId;
use crate::services::repository::BundleRepository;

/// Result of a selection request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SelectionOutcome {
    Selected { bundle_id: BundleId },
    Cleared,
    /// Selection left unchanged
    Rejected {
        bundle_id: BundleId,
        /// `None` when the bundle does not exist
        status: Option<BundleStatus>,
    },
}

pub struct SelectionCoordinator {
    repository: Arc<BundleRepository>,
    selected: RwLock<Option<BundleId>>,
    event_bus: EventBus,
}

impl SelectionCoordinator {
    pub fn new(repository: Arc<BundleRepository>) -> Self {
        let event_bus = repository.event_bus().clone();
        Self {
            repository,
            selected: RwLock::new(None),
            event_bus,
        }
    }

    pub async fn selected(&self) -> Option<BundleId> {
        *self.selected.read().await
    }

    /// Select `target`, or clear the selection with `None`
    pub async fn select(&self, target: Option<BundleId>) -> SelectionOutcome {
        // Held across the status check so a concurrent deletion clears after us
        let mut selected = self.selected.write().await;

        let bundle_id = match target {
            Some(id) => id,
            None => {
                if selected.take().is_some() {
                    info!("Selection cleared");
                    self.emit_changed(None);
                }
                return SelectionOutcome::Cleared;
            }
        };

        let status = match self.repository.get(bundle_id).await {
            Ok(bundle) => Some(bundle.status),
            Err(TrackerError::NoSuchBundle(_)) => None,
            Err(e) => {
                warn!(bundle_id = %bundle_id, error = %e, "Selection lookup failed");
                None
            }
        };

        if status != Some(BundleStatus::Imported) {
            let reason = match status {
                Some(s) => format!("Bundle is {}; only imported bundles can be selected", s),
                None => "Bundle does not exist".to_string(),
            };
            warn!(bundle_id = %bundle_id, reason = %reason, "Selection rejected");
            self.event_bus.emit_lossy(DitEvent::SelectionRejected {
                bundle_id,
                status,
                reason,
                timestamp: Utc::now(),
            });
            return SelectionOutcome::Rejected { bundle_id, status };
        }

        if *selected != Some(bundle_id) {
            *selected = Some(bundle_id);
            info!(bundle_id = %bundle_id, "Bundle selected");
            self.emit_changed(Some(bundle_id));
        }
        SelectionOutcome::Selected { bundle_id }
    }

    /// Clear the selection if it pointed at the deleted bundle
    pub async fn on_bundle_deleted(&self, bundle_id: BundleId) {
        let mut selected = self.selected.write().await;
        if *selected == Some(bundle_id) {
            *selected = None;
            info!(bundle_id = %bundle_id, "Selection cleared by bundle deletion");
            self.emit_changed(None);
        }
    }

    fn emit_changed(&self, bundle_id: Option<BundleId>) {
        self.event_bus.emit_lossy(DitEvent::SelectionChanged {
            bundle_id,
            timestamp: Utc::now(),
        });
    }
}
