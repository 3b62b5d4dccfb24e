//! searchdock-indexer: the pull-mode enrichment lifecycle. Data-source
//! connectors, document crackers, the enriched-document tree, the skill
//! pipeline, the indexer runtime and its background scheduler.

pub mod connectors;
pub mod crackers;
pub mod enriched;
pub mod error;
pub mod mappings;
pub mod runtime;
pub mod scheduler;
pub mod skills;

pub use connectors::{ConnectorRegistry, DataSourceConnector};
pub use crackers::{CrackedDocument, CrackerFactory, DocumentCracker};
pub use enriched::EnrichedDocument;
pub use error::{Error, Result};
pub use runtime::{IndexerDefaults, IndexerRuntime};
pub use scheduler::{Scheduler, DEFAULT_TICK};
pub use skills::SkillExecutor;
