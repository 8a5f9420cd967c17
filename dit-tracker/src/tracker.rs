//! Bundle tracker command/query API
//!
//! The in-process surface consumed by presentation collaborators. Wires the
//! repository, the scheduled-work services and the selection coordinator
//! together over one event bus.

use std::sync::Arc;

use dit_common::config::TrackerConfig;
use dit_common::events::{BundleStatus, DitEvent, EventBus, FileCategory, FileStatus};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{TrackerError, TrackerResult};
use crate::models::{Bundle, BundleFile, BundleId, BundleProgress, BundleSpec, FileSpec};
use crate::services::{
    BundleRepository, ImportOrchestrator, ParseSimulator, RetryCoordinator,
    SelectionCoordinator, SelectionOutcome,
};

/// Tracker handle, cheap to clone and shared across callers
#[derive(Clone)]
pub struct BundleTracker {
    config: Arc<TrackerConfig>,
    event_bus: EventBus,
    repository: Arc<BundleRepository>,
    retry: Arc<RetryCoordinator>,
    import: Arc<ImportOrchestrator>,
    selection: Arc<SelectionCoordinator>,
    /// `None` when parse simulation is disabled
    parser: Option<ParseSimulator>,
}

impl BundleTracker {
    pub fn new(config: TrackerConfig) -> TrackerResult<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.event_capacity);
        let repository = Arc::new(BundleRepository::new(event_bus.clone()));
        let parser = config
            .simulate_parsing
            .then(|| ParseSimulator::new(event_bus.clone(), config.parse_delay()));

        info!(
            processing_delay_ms = config.processing_delay_ms,
            import_stagger_ms = config.import_stagger_ms,
            simulate_parsing = config.simulate_parsing,
            "Bundle tracker initialized"
        );

        Ok(Self {
            retry: Arc::new(RetryCoordinator::new(
                repository.clone(),
                config.processing_delay(),
            )),
            import: Arc::new(ImportOrchestrator::new(
                repository.clone(),
                config.import_stagger(),
            )),
            selection: Arc::new(SelectionCoordinator::new(repository.clone())),
            config: Arc::new(config),
            event_bus,
            repository,
            parser,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DitEvent> {
        self.event_bus.subscribe()
    }

    pub async fn create_bundle(
        &self,
        name: impl Into<String>,
        total_files: usize,
        source: impl Into<String>,
    ) -> TrackerResult<BundleId> {
        let bundle = self
            .repository
            .create(BundleSpec {
                name: name.into(),
                total_files,
                source: source.into(),
            })
            .await?;
        Ok(bundle.id)
    }

    /// Append a file; it starts `parsing`
    pub async fn add_file(&self, bundle_id: BundleId, spec: FileSpec) -> TrackerResult<Bundle> {
        let slot = self.repository.slot(bundle_id).await?;
        let (file, bundle) = self.repository.add_file_to_slot(&slot, spec).await?;

        if let Some(parser) = &self.parser {
            parser.schedule(slot, file.id, file.generation);
        }
        Ok(bundle)
    }

    /// Replace the bundle's files wholesale
    ///
    /// With parse simulation on, every supplied `parsing` file is scheduled
    /// just like an added one.
    pub async fn replace_files(
        &self,
        bundle_id: BundleId,
        files: Vec<BundleFile>,
    ) -> TrackerResult<Bundle> {
        let slot = self.repository.slot(bundle_id).await?;
        let bundle = self.repository.replace_files_in_slot(&slot, files).await?;

        if let Some(parser) = &self.parser {
            for file in bundle.files.iter().filter(|f| f.status == FileStatus::Parsing) {
                parser.schedule(slot.clone(), file.id, file.generation);
            }
        }
        Ok(bundle)
    }

    pub async fn delete_file(&self, bundle_id: BundleId, file_id: Uuid) -> TrackerResult<Bundle> {
        self.repository.delete_file(bundle_id, file_id).await
    }

    /// Delete a bundle, cancel its scheduled work and clear it from the selection
    pub async fn delete_bundle(&self, bundle_id: BundleId) -> TrackerResult<()> {
        self.repository.delete(bundle_id).await?;
        self.selection.on_bundle_deleted(bundle_id).await;
        Ok(())
    }

    pub async fn retry_bundle(&self, bundle_id: BundleId) -> TrackerResult<()> {
        self.retry.retry(bundle_id).await
    }

    pub async fn import_bundle(&self, bundle_id: BundleId) -> TrackerResult<()> {
        self.import.import(bundle_id).await
    }

    pub async fn select_bundle(&self, bundle_id: Option<BundleId>) -> SelectionOutcome {
        self.selection.select(bundle_id).await
    }

    pub async fn selected(&self) -> Option<BundleId> {
        self.selection.selected().await
    }

    /// Read model for rendering, in creation order
    pub async fn get_bundles(&self) -> Vec<Bundle> {
        self.repository.list().await
    }

    pub async fn get_bundle(&self, bundle_id: BundleId) -> TrackerResult<Bundle> {
        self.repository.get(bundle_id).await
    }

    /// Parsing collaborator callback: settle a `parsing` file
    pub async fn resolve_file(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        outcome: FileStatus,
    ) -> TrackerResult<Bundle> {
        self.repository.resolve_file(bundle_id, file_id, outcome).await
    }

    pub async fn rename_file(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        name: impl Into<String>,
    ) -> TrackerResult<Bundle> {
        self.repository.rename_file(bundle_id, file_id, name.into()).await
    }

    pub async fn set_file_category(
        &self,
        bundle_id: BundleId,
        file_id: Uuid,
        category: FileCategory,
    ) -> TrackerResult<Bundle> {
        self.repository
            .set_file_category(bundle_id, file_id, category)
            .await
    }

    pub async fn bundle_progress(&self, bundle_id: BundleId) -> TrackerResult<BundleProgress> {
        Ok(self.repository.get(bundle_id).await?.progress())
    }

    /// Wait until the bundle reaches `target`
    ///
    /// Fails with `NoSuchBundle` if the bundle is deleted while waiting.
    pub async fn wait_for_status(
        &self,
        bundle_id: BundleId,
        target: BundleStatus,
    ) -> TrackerResult<Bundle> {
        // Subscribe before the first check so no transition is missed
        let mut rx = self.event_bus.subscribe();

        loop {
            let bundle = self.repository.get(bundle_id).await?;
            if bundle.status == target {
                return Ok(bundle);
            }

            match rx.recv().await {
                Ok(event) if event.bundle_id() == Some(bundle_id) => {}
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(bundle_id = %bundle_id, skipped, "Status wait lagged, re-checking");
                }
                Err(RecvError::Closed) => {
                    return Err(TrackerError::InvalidState(
                        "Event bus closed while waiting".to_string(),
                    ));
                }
            }
        }
    }

    /// Cancel all scheduled work; bundles stay readable
    pub fn shutdown(&self) {
        info!("Bundle tracker shutting down");
        self.repository.shutdown();
    }
}
