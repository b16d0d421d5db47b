//! Domain module - sync vocabulary and ports
//!
//! Pure types and trait seams. Nothing in here touches the network or the
//! database directly.

pub mod errors;
pub mod population;
pub mod query;
pub mod repositories;
pub mod sale;
pub mod sync;

pub use errors::{NormalizeError, StoreError, TransportError};
pub use population::{GradeType, PopulationEntry, PopulationReport};
pub use query::SearchQuery;
pub use repositories::{
    ExistenceOracle, PopulationSource, PopulationStore, PopulationTarget, SalesSink, SearchPage, SearchSource,
    UpsertSummary,
};
pub use sale::{SaleHit, SaleRecord};
pub use sync::{BatchStatistics, FetchPhase, InsertSummary, StopReason, SyncCursor, SyncMode, SyncOutcome, SyncStatus};
