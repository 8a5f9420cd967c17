//! Event system for the document ingestion tracker
//!
//! Provides shared event definitions and the EventBus used by the tracker
//! and its presentation collaborators.

mod status_types;

pub use status_types::{BundleStatus, FileCategory, FileStatus};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tracker event types
///
/// Events are broadcast via EventBus and serialize to tagged JSON so a
/// rendering collaborator can forward them unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DitEvent {
    /// New bundle registered (status `incomplete`, no files)
    BundleCreated {
        bundle_id: Uuid,
        name: String,
        total_files: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// File appended to a bundle
    FileAdded {
        bundle_id: Uuid,
        file_id: Uuid,
        name: String,
        category: FileCategory,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// File removed from a bundle
    FileRemoved {
        bundle_id: Uuid,
        file_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Bundle file collection replaced wholesale
    FilesReplaced {
        bundle_id: Uuid,
        file_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A single file moved through its lifecycle
    FileStatusChanged {
        bundle_id: Uuid,
        file_id: Uuid,
        old_status: FileStatus,
        new_status: FileStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Derived bundle status changed (only emitted when old != new)
    BundleStatusChanged {
        bundle_id: Uuid,
        old_status: BundleStatus,
        new_status: BundleStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Every file of the bundle reached `imported` (emitted once per import)
    BundleImported {
        bundle_id: Uuid,
        file_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Bundle destroyed; scheduled work for it has been cancelled
    BundleDeleted {
        bundle_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active bundle changed (`None` = cleared)
    SelectionChanged {
        bundle_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Selection request refused; the previous selection is unchanged
    SelectionRejected {
        bundle_id: Uuid,
        status: Option<BundleStatus>,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl DitEvent {
    /// Event name, usable as an SSE/log event type
    pub fn event_type(&self) -> &str {
        match self {
            DitEvent::BundleCreated { .. } => "BundleCreated",
            DitEvent::FileAdded { .. } => "FileAdded",
            DitEvent::FileRemoved { .. } => "FileRemoved",
            DitEvent::FilesReplaced { .. } => "FilesReplaced",
            DitEvent::FileStatusChanged { .. } => "FileStatusChanged",
            DitEvent::BundleStatusChanged { .. } => "BundleStatusChanged",
            DitEvent::BundleImported { .. } => "BundleImported",
            DitEvent::BundleDeleted { .. } => "BundleDeleted",
            DitEvent::SelectionChanged { .. } => "SelectionChanged",
            DitEvent::SelectionRejected { .. } => "SelectionRejected",
        }
    }

    /// Bundle the event refers to, if any
    pub fn bundle_id(&self) -> Option<Uuid> {
        match self {
            DitEvent::BundleCreated { bundle_id, .. }
            | DitEvent::FileAdded { bundle_id, .. }
            | DitEvent::FileRemoved { bundle_id, .. }
            | DitEvent::FilesReplaced { bundle_id, .. }
            | DitEvent::FileStatusChanged { bundle_id, .. }
            | DitEvent::BundleStatusChanged { bundle_id, .. }
            | DitEvent::BundleImported { bundle_id, .. }
            | DitEvent::BundleDeleted { bundle_id, .. }
            | DitEvent::SelectionRejected { bundle_id, .. } => Some(*bundle_id),
            DitEvent::SelectionChanged { bundle_id, .. } => *bundle_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use dit_common::events::{EventBus, DitEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DitEvent::BundleDeleted {
///     bundle_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DitEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (see `TrackerConfig::validate`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DitEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DitEvent,
    ) -> Result<usize, broadcast::error::SendError<DitEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DitEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
