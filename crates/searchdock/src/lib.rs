//! searchdock: a local, single-node emulation of a cloud search service
//! REST API. This crate binds the HTTP surface to the engine crates and
//! hosts the configuration, authentication extractors and wire types.

pub mod extractors;
pub mod option;
pub mod routes;

use std::sync::Arc;

use actix_web::web::{self, Data};
use actix_web::HttpRequest;
use anyhow::Context;
use searchdock_auth::AuthController;
use searchdock_core::{IndexManager, SearchOptions, SynonymRules};
use searchdock_indexer::IndexerRuntime;
use searchdock_store::MetadataStore;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::index::IndexDefinition;
use searchdock_types::synonym_map::SynonymMapDefinition;
use searchdock_types::ResourceKind;
use tracing::warn;

pub use crate::option::Opt;

#[derive(Debug, Clone, Copy)]
pub struct ServiceLimits {
    pub max_indexes: usize,
    pub max_documents_per_index: u64,
    pub max_fields_per_index: usize,
}

pub struct AppState {
    pub store: MetadataStore,
    pub indexes: Arc<IndexManager>,
    pub runtime: Arc<IndexerRuntime>,
    pub search_options: SearchOptions,
    pub limits: ServiceLimits,
}

impl AppState {
    /// Open the metadata store, reopen every persisted index, and build the
    /// indexer runtime.
    pub fn new(opt: &Opt) -> anyhow::Result<Self> {
        let kinds: Vec<&'static str> =
            ResourceKind::ALL.iter().map(|kind| kind.as_str()).collect();
        let store = MetadataStore::open(&opt.data_directory.join("metadata"), &kinds)
            .context("opening the metadata store")?;

        let indexes = Arc::new(IndexManager::new(
            opt.data_directory.join("indexes"),
            opt.vector_config(),
        ));
        for entry in store.list(ResourceKind::Index.as_str())? {
            match serde_json::from_slice::<IndexDefinition>(&entry.data) {
                Ok(definition) => {
                    if let Err(e) = indexes.open(definition) {
                        warn!(index = %entry.name, "could not reopen index: {e}");
                    }
                }
                Err(e) => warn!(index = %entry.name, "undecodable index definition: {e}"),
            }
        }

        let runtime = Arc::new(IndexerRuntime::new(
            store.clone(),
            Arc::clone(&indexes),
            opt.indexer_defaults(),
        ));

        Ok(Self {
            store,
            indexes,
            runtime,
            search_options: opt.search_options(),
            limits: ServiceLimits {
                max_indexes: opt.max_indexes,
                max_documents_per_index: opt.max_documents_per_index,
                max_fields_per_index: opt.max_fields_per_index,
            },
        })
    }

    /// Resolve a synonym map by name at query time.
    pub fn synonym_lookup(&self) -> impl Fn(&str) -> Option<SynonymRules> + '_ {
        move |name: &str| {
            let entry = self.store.get(ResourceKind::SynonymMap.as_str(), name).ok()??;
            let definition: SynonymMapDefinition = serde_json::from_slice(&entry.data).ok()?;
            Some(SynonymRules::parse(&definition.synonyms))
        }
    }
}

/// The JSON extractor config: malformed bodies render the wire error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|error, _req: &HttpRequest| {
        ResponseError::from_msg(
            format!("The request body is not valid JSON: {error}."),
            Code::InvalidArgument,
        )
        .into()
    })
}

/// The query-string extractor config, same error shape.
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|error, _req: &HttpRequest| {
        ResponseError::from_msg(
            format!("The query string is invalid: {error}."),
            Code::InvalidArgument,
        )
        .into()
    })
}

/// Everything `main` (and the test harness) mounts onto the actix `App`.
pub fn configure_app(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).app_data(query_config());
    routes::configure(cfg);
}

pub fn build_auth(opt: &Opt) -> Data<AuthController> {
    Data::new(AuthController::new(opt.auth_config()))
}
