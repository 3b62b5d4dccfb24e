//! searchdock-core: the inverted-index manager, vector store, query engine
//! and document operations behind the search API.

pub mod analyzers;
pub mod columns;
pub mod documents;
pub mod error;
pub mod index;
pub mod schema;
pub mod search;
pub mod synonyms;
pub mod vector;

pub use error::{Error, Result};
pub use index::{IndexManager, SearchIndex};
pub use search::{SearchOptions, SearchOutcome, SearchRequest};
pub use synonyms::SynonymRules;
pub use vector::VectorConfig;
