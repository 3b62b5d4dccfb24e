//! Data-source connectors: list and read source objects under a container
//! with incremental tracking state. Implementations register by data-source
//! `type`; the cloud storage connectors are plug-in slots.

mod filesystem;

use std::collections::HashMap;
use std::sync::Arc;

pub use filesystem::FilesystemConnector;
use searchdock_types::data_source::{DataSourceDefinition, DataSourceDocument};

use crate::error::{Error, Result};

pub trait DataSourceConnector: Send + Sync {
    fn connector_type(&self) -> &'static str;

    /// List source objects, honoring the optional tracking state as a lower
    /// bound: only items strictly newer than its high-water timestamp are
    /// emitted.
    fn list_documents(
        &self,
        source: &DataSourceDefinition,
        tracking_state: Option<&str>,
    ) -> Result<Vec<DataSourceDocument>>;

    fn read_content(
        &self,
        source: &DataSourceDefinition,
        document: &DataSourceDocument,
    ) -> Result<Vec<u8>>;

    fn get_document(
        &self,
        source: &DataSourceDefinition,
        key: &str,
    ) -> Result<Option<DataSourceDocument>>;
}

#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn DataSourceConnector>>,
}

impl ConnectorRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(Arc::new(FilesystemConnector));
        registry
    }

    pub fn register(&mut self, connector: Arc<dyn DataSourceConnector>) {
        self.connectors.insert(connector.connector_type(), connector);
    }

    pub fn get(&self, connector_type: &str) -> Result<Arc<dyn DataSourceConnector>> {
        self.connectors
            .get(connector_type)
            .cloned()
            .ok_or_else(|| Error::UnknownConnectorType(connector_type.to_string()))
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.connectors.keys().copied().collect();
        types.sort_unstable();
        types
    }
}
