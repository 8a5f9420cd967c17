//! Tracker services
//!
//! - Status aggregation (pure derivation)
//! - Bundle repository (authoritative store)
//! - Retry coordinator, import orchestrator, parse simulator (scheduled work)
//! - Selection coordinator (active bundle pointer)

pub mod import;
pub mod parsing;
pub mod repository;
pub mod retry;
pub mod selection;
pub mod status;

pub use import::ImportOrchestrator;
pub use parsing::ParseSimulator;
pub use repository::{BundleRepository, BundleSlot};
pub use retry::RetryCoordinator;
pub use selection::{SelectionCoordinator, SelectionOutcome};
pub use status::derive_status;
