//! Application layer - sync use cases built on the domain ports

pub mod batch_coordinator;
pub mod incremental_fetcher;
pub mod integrity_audit;
pub mod population_sync;

pub use batch_coordinator::{BatchCoordinator, CoordinatorError, CoordinatorSettings};
pub use incremental_fetcher::{FetchSettings, IncrementalFetcher};
pub use integrity_audit::{AuditReport, AuditStatus, IntegrityAudit};
pub use population_sync::{PopulationSettings, PopulationStatistics, PopulationSync};
