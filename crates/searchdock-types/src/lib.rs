//! Shared definitions of the searchdock service: the wire error shape, index
//! schemas, document batches, data sources, skillsets, indexers and synonym
//! maps.

pub mod data_source;
pub mod documents;
pub mod error;
pub mod index;
pub mod indexer;
pub mod skillset;
pub mod synonym_map;

/// The resource kinds the metadata store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Index,
    DataSource,
    Skillset,
    Indexer,
    IndexerState,
    SynonymMap,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Index => "indexes",
            ResourceKind::DataSource => "datasources",
            ResourceKind::Skillset => "skillsets",
            ResourceKind::Indexer => "indexers",
            ResourceKind::IndexerState => "indexer-state",
            ResourceKind::SynonymMap => "synonymmaps",
        }
    }

    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Index,
        ResourceKind::DataSource,
        ResourceKind::Skillset,
        ResourceKind::Indexer,
        ResourceKind::IndexerState,
        ResourceKind::SynonymMap,
    ];
}
