//! The indexer runtime: orchestrates connector → cracker → skillset →
//! field mapping → document operations for each source object, guards
//! overlapping runs, and records run history and tracking state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use searchdock_core::{documents, IndexManager, SearchIndex};
use searchdock_store::MetadataStore;
use searchdock_types::data_source::{DataSourceDefinition, DataSourceDocument};
use searchdock_types::documents::{IndexAction, IndexActionKind};
use searchdock_types::indexer::{
    IndexerDefinition, IndexerExecutionError, IndexerExecutionResult, IndexerState, IndexerStatus,
    IndexerStatusView,
};
use searchdock_types::skillset::SkillsetDefinition;
use searchdock_types::ResourceKind;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::connectors::{ConnectorRegistry, DataSourceConnector};
use crate::crackers::CrackerFactory;
use crate::enriched::EnrichedDocument;
use crate::error::{Error, Result};
use crate::mappings;
use crate::skills::SkillExecutor;

#[derive(Debug, Clone)]
pub struct IndexerDefaults {
    pub batch_size: usize,
    pub max_failed_items: usize,
    pub run_timeout: Duration,
}

impl Default for IndexerDefaults {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_failed_items: 0,
            run_timeout: Duration::from_secs(5 * 60),
        }
    }
}

pub struct IndexerRuntime {
    store: MetadataStore,
    indexes: Arc<IndexManager>,
    connectors: ConnectorRegistry,
    crackers: CrackerFactory,
    skills: SkillExecutor,
    defaults: IndexerDefaults,
    in_progress: Mutex<HashSet<String>>,
}

struct PipelineStats {
    items_processed: u64,
    items_failed: u64,
    errors: Vec<IndexerExecutionError>,
    max_modified: Option<OffsetDateTime>,
    aborted: bool,
}

impl IndexerRuntime {
    pub fn new(
        store: MetadataStore,
        indexes: Arc<IndexManager>,
        defaults: IndexerDefaults,
    ) -> Self {
        Self {
            store,
            indexes,
            connectors: ConnectorRegistry::with_defaults(),
            crackers: CrackerFactory::default(),
            skills: SkillExecutor::new(reqwest::Client::new()),
            defaults,
            in_progress: Mutex::new(HashSet::new()),
        }
    }

    pub fn connectors_mut(&mut self) -> &mut ConnectorRegistry {
        &mut self.connectors
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn last_end_time(&self, name: &str) -> Result<Option<OffsetDateTime>> {
        Ok(self.load_state(name)?.last_result().and_then(|result| result.end_time))
    }

    fn load_json<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        name: &str,
        label: &'static str,
    ) -> Result<T> {
        let entry = self
            .store
            .get(kind.as_str(), name)?
            .ok_or_else(|| Error::ResourceNotFound(label, name.to_string()))?;
        Ok(serde_json::from_slice(&entry.data)?)
    }

    fn load_state(&self, name: &str) -> Result<IndexerState> {
        match self.store.get(ResourceKind::IndexerState.as_str(), name)? {
            Some(entry) => Ok(serde_json::from_slice(&entry.data)?),
            None => Ok(IndexerState::default()),
        }
    }

    fn save_state(&self, name: &str, state: &IndexerState) -> Result<()> {
        self.store.put(
            ResourceKind::IndexerState.as_str(),
            name,
            &serde_json::to_vec(state)?,
        )?;
        Ok(())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.in_progress.lock().unwrap().contains(name)
    }

    pub fn status(&self, name: &str) -> Result<IndexerStatusView> {
        // the definition must exist even if no run happened yet
        let _: IndexerDefinition = self.load_json(ResourceKind::Indexer, name, "Indexer")?;
        let state = self.load_state(name)?;
        let status =
            if self.is_running(name) { IndexerStatus::InProgress } else { state.status };
        Ok(IndexerStatusView {
            status,
            last_result: state.last_result().cloned(),
            execution_history: state.execution_history,
        })
    }

    /// Clear the persisted tracking state so the next run re-processes
    /// every source item.
    pub fn reset(&self, name: &str) -> Result<()> {
        let _: IndexerDefinition = self.load_json(ResourceKind::Indexer, name, "Indexer")?;
        if self.is_running(name) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }
        let mut state = self.load_state(name)?;
        state.tracking_state = None;
        state.status = IndexerStatus::Idle;
        self.save_state(name, &state)?;
        Ok(())
    }

    /// Start a run in the background. The `idle → inProgress` transition is
    /// a single atomic check-and-set; a concurrent trigger is rejected.
    pub fn trigger(self: &Arc<Self>, name: &str) -> Result<()> {
        let indexer: IndexerDefinition =
            self.load_json(ResourceKind::Indexer, name, "Indexer")?;
        if indexer.disabled {
            return Err(Error::Disabled(name.to_string()));
        }

        {
            let mut running = self.in_progress.lock().unwrap();
            if !running.insert(name.to_string()) {
                return Err(Error::AlreadyRunning(name.to_string()));
            }
        }

        let runtime = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            runtime.execute_run(&name, indexer).await;
            runtime.in_progress.lock().unwrap().remove(&name);
        });
        Ok(())
    }

    #[tracing::instrument(skip(self, indexer), fields(indexer = %name))]
    async fn execute_run(&self, name: &str, indexer: IndexerDefinition) {
        let start_time = OffsetDateTime::now_utc();
        let outcome =
            tokio::time::timeout(self.defaults.run_timeout, self.run_pipeline(&indexer)).await;

        let mut state = self.load_state(name).unwrap_or_default();
        let result = match outcome {
            Ok(Ok(stats)) => {
                if let Some(max_modified) = stats.max_modified {
                    // tracking state only moves forward
                    let advanced = match state
                        .tracking_state
                        .as_deref()
                        .and_then(|s| OffsetDateTime::parse(s, &Rfc3339).ok())
                    {
                        Some(previous) => max_modified > previous,
                        None => true,
                    };
                    if advanced {
                        state.tracking_state =
                            max_modified.format(&Rfc3339).ok();
                    }
                }
                IndexerExecutionResult {
                    status: if stats.aborted {
                        IndexerStatus::TransientFailure
                    } else {
                        IndexerStatus::Success
                    },
                    start_time,
                    end_time: Some(OffsetDateTime::now_utc()),
                    items_processed: stats.items_processed,
                    items_failed: stats.items_failed,
                    errors: stats.errors,
                    error_message: stats.aborted.then(|| {
                        "The run exceeded maxFailedItems and was stopped.".to_string()
                    }),
                }
            }
            Ok(Err(e)) => IndexerExecutionResult {
                status: IndexerStatus::TransientFailure,
                start_time,
                end_time: Some(OffsetDateTime::now_utc()),
                items_processed: 0,
                items_failed: 0,
                errors: vec![IndexerExecutionError { key: None, error_message: e.to_string() }],
                error_message: Some(e.to_string()),
            },
            Err(_) => IndexerExecutionResult {
                status: IndexerStatus::TransientFailure,
                start_time,
                end_time: Some(OffsetDateTime::now_utc()),
                items_processed: 0,
                items_failed: 0,
                errors: vec![],
                error_message: Some(format!(
                    "The run did not finish within {:?} and was abandoned.",
                    self.defaults.run_timeout
                )),
            },
        };

        info!(
            status = ?result.status,
            items_processed = result.items_processed,
            items_failed = result.items_failed,
            "indexer run finished"
        );
        state.push_result(result);
        state.status = IndexerStatus::Idle;
        if let Err(e) = self.save_state(name, &state) {
            warn!("could not persist state for indexer `{name}`: {e}");
        }
    }

    async fn run_pipeline(&self, indexer: &IndexerDefinition) -> Result<PipelineStats> {
        let data_source: DataSourceDefinition = self.load_json(
            ResourceKind::DataSource,
            &indexer.data_source_name,
            "Data source",
        )?;
        let skillset: Option<SkillsetDefinition> = match &indexer.skillset_name {
            Some(name) => Some(self.load_json(ResourceKind::Skillset, name, "Skillset")?),
            None => None,
        };
        let index = self.indexes.get(&indexer.target_index_name)?;
        let connector = self.connectors.get(&data_source.connector_type)?;

        let state = self.load_state(&indexer.name)?;
        let batch_size = indexer
            .parameters
            .as_ref()
            .and_then(|p| p.batch_size)
            .unwrap_or(self.defaults.batch_size)
            .max(1);
        let max_failed = indexer
            .parameters
            .as_ref()
            .and_then(|p| p.max_failed_items)
            .unwrap_or(self.defaults.max_failed_items);

        let listed =
            connector.list_documents(&data_source, state.tracking_state.as_deref())?;
        info!(count = listed.len(), "listed source documents");

        let mut stats = PipelineStats {
            items_processed: 0,
            items_failed: 0,
            errors: Vec::new(),
            max_modified: None,
            aborted: false,
        };
        let mut batch: Vec<IndexAction> = Vec::with_capacity(batch_size);

        for source_doc in listed {
            match self
                .process_document(
                    indexer,
                    &data_source,
                    skillset.as_ref(),
                    connector.as_ref(),
                    &index,
                    &source_doc,
                )
                .await
            {
                Ok(document) => {
                    stats.max_modified = Some(match stats.max_modified {
                        Some(current) => current.max(source_doc.last_modified),
                        None => source_doc.last_modified,
                    });
                    batch.push(IndexAction {
                        action: IndexActionKind::MergeOrUpload,
                        document,
                    });
                }
                Err(e) => {
                    stats.items_failed += 1;
                    stats.errors.push(IndexerExecutionError {
                        key: Some(source_doc.key.clone()),
                        error_message: e.to_string(),
                    });
                }
            }

            if stats.items_failed > max_failed as u64 {
                stats.aborted = true;
                break;
            }
            if batch.len() >= batch_size {
                self.flush_batch(&index, &mut batch, &mut stats)?;
                if stats.items_failed > max_failed as u64 {
                    stats.aborted = true;
                    break;
                }
            }
        }

        if !stats.aborted && !batch.is_empty() {
            self.flush_batch(&index, &mut batch, &mut stats)?;
            if stats.items_failed > max_failed as u64 {
                stats.aborted = true;
            }
        }
        Ok(stats)
    }

    fn flush_batch(
        &self,
        index: &SearchIndex,
        batch: &mut Vec<IndexAction>,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        let results = documents::apply_batch(index, std::mem::take(batch))?;
        for result in results {
            if result.status {
                stats.items_processed += 1;
            } else {
                stats.items_failed += 1;
                stats.errors.push(IndexerExecutionError {
                    key: Some(result.key),
                    error_message: result
                        .error_message
                        .unwrap_or_else(|| "indexing failed".to_string()),
                });
            }
        }
        Ok(())
    }

    async fn process_document(
        &self,
        indexer: &IndexerDefinition,
        data_source: &DataSourceDefinition,
        skillset: Option<&SkillsetDefinition>,
        connector: &dyn DataSourceConnector,
        index: &SearchIndex,
        source_doc: &DataSourceDocument,
    ) -> Result<Map<String, Value>> {
        let bytes = connector.read_content(data_source, source_doc)?;
        let content_type = source_doc.content_type.as_deref().unwrap_or("application/octet-stream");
        let cracked = self.crackers.crack(&bytes, &source_doc.name, content_type);
        for warning in &cracked.warnings {
            warn!(document = %source_doc.name, "{warning}");
        }

        let mut enriched = EnrichedDocument::new(&cracked, source_doc);
        let source_fields = enriched
            .get("/document")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        if let Some(skillset) = skillset {
            let warnings = self.skills.execute(skillset, &mut enriched).await;
            for warning in warnings {
                warn!(document = %source_doc.name, "{warning}");
            }
        }

        let (target, warnings) =
            mappings::project_document(indexer, index.definition(), &source_fields, &enriched);
        for warning in warnings {
            warn!(document = %source_doc.name, "{warning}");
        }
        Ok(target)
    }
}
