use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use searchdock_types::index::IndexDefinition;
use serde_json::{Map, Value};
use tantivy::directory::MmapDirectory;
use tantivy::schema::OwnedValue;
use tantivy::{Document, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::analyzers;
use crate::columns::ColumnStore;
use crate::error::{Error, Result};
use crate::schema::{self, SchemaMap};
use crate::vector::{VectorConfig, VectorStore};

fn first_text(named: &tantivy::schema::NamedFieldDocument, field: &str) -> Option<String> {
    named.0.get(field).and_then(|values| {
        values.iter().find_map(|value| match value {
            OwnedValue::Str(s) => Some(s.clone()),
            _ => None,
        })
    })
}

const WRITER_BUDGET_BYTES: usize = 50_000_000;

/// One searchable index: the tantivy index with its exclusive writer and
/// snapshot reader, the doc-value columns, and the vector store, all kept in
/// lockstep by the document-operations layer.
pub struct SearchIndex {
    definition: IndexDefinition,
    path: PathBuf,
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    schema_map: SchemaMap,
    columns: RwLock<ColumnStore>,
    vectors: VectorStore,
}

impl SearchIndex {
    /// Open (or create) the index under `path`. The doc-value columns are
    /// rebuilt from the stored documents; the vector store loads its own
    /// snapshot file.
    pub fn open(
        definition: IndexDefinition,
        path: PathBuf,
        vector_config: VectorConfig,
    ) -> Result<Self> {
        let tantivy_dir = path.join("tantivy");
        fs::create_dir_all(&tantivy_dir)?;
        let schema_map = schema::build_schema(&definition);
        let directory = MmapDirectory::open(&tantivy_dir)?;
        let index = Index::open_or_create(directory, schema_map.schema.clone())?;
        analyzers::register_analyzers(&index);

        let writer = index.writer(WRITER_BUDGET_BYTES)?;
        let reader =
            index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;

        let vectors =
            VectorStore::open(&definition, vector_config, path.join("vectors.bin"))?;

        let this = Self {
            definition,
            path,
            index,
            writer: Mutex::new(writer),
            reader,
            schema_map,
            columns: RwLock::new(ColumnStore::new()),
            vectors,
        };
        this.rebuild_columns()?;
        Ok(this)
    }

    fn rebuild_columns(&self) -> Result<()> {
        self.reader.reload()?;
        let searcher = self.reader.searcher();
        let mut columns = self.columns.write();
        for segment_reader in searcher.segment_readers() {
            let store_reader = segment_reader.get_store_reader(1)?;
            for doc_id in segment_reader.doc_ids_alive() {
                let doc: TantivyDocument = store_reader.get(doc_id)?;
                let named = doc.to_named_doc(&self.schema_map.schema);
                let Some(key) = first_text(&named, schema::KEY_FIELD) else { continue };
                let Some(source) = first_text(&named, schema::SOURCE_FIELD) else { continue };
                let document: Map<String, Value> = serde_json::from_str(&source)?;
                columns.upsert(&self.definition, &key, document);
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn tantivy(&self) -> &Index {
        &self.index
    }

    pub fn schema_map(&self) -> &SchemaMap {
        &self.schema_map
    }

    pub fn columns(&self) -> &RwLock<ColumnStore> {
        &self.columns
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn searcher(&self) -> tantivy::Searcher {
        self.reader.searcher()
    }

    /// The document key stored for a search hit.
    pub fn stored_key(
        &self,
        searcher: &tantivy::Searcher,
        address: tantivy::DocAddress,
    ) -> Result<Option<String>> {
        let doc: TantivyDocument = searcher.doc(address)?;
        let named = doc.to_named_doc(&self.schema_map.schema);
        Ok(first_text(&named, schema::KEY_FIELD))
    }

    pub fn doc_count(&self) -> u64 {
        self.columns.read().len()
    }

    pub fn storage_size(&self) -> u64 {
        fn dir_size(path: &Path) -> u64 {
            fs::read_dir(path)
                .into_iter()
                .flatten()
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        dir_size(&path)
                    } else {
                        entry.metadata().map(|m| m.len()).unwrap_or(0)
                    }
                })
                .sum()
        }
        dir_size(&self.path)
    }

    pub fn get_document(&self, key: &str) -> Option<Map<String, Value>> {
        let columns = self.columns.read();
        let seq = columns.seq_of(key)?;
        columns.document(seq).cloned()
    }

    /// Replace the document identified by `key`. Idempotent on the key.
    pub fn upsert_document(&self, key: &str, document: Map<String, Value>) -> Result<()> {
        let mut columns = self.columns.write();
        self.upsert_document_locked(&mut columns, key, document)
    }

    /// Batch-scoped variant: the caller holds the column-store write lock
    /// for the whole batch, so readers never observe it half-applied.
    pub fn upsert_document_locked(
        &self,
        columns: &mut ColumnStore,
        key: &str,
        document: Map<String, Value>,
    ) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema_map.key, key));
            let mut doc = TantivyDocument::new();
            doc.add_text(self.schema_map.key, key);
            doc.add_text(self.schema_map.source, serde_json::to_string(&document)?);
            for (path, text) in schema::searchable_texts(&self.definition, &document) {
                if let Some((field, _)) = self.schema_map.text_fields.get(&path) {
                    doc.add_text(*field, &text);
                }
            }
            writer.add_document(doc)?;
        }

        self.vectors.delete(key);
        for field in self.definition.vector_fields() {
            if let Some(values) = document.get(&field.name).and_then(Value::as_array) {
                let vector: Vec<f32> =
                    values.iter().filter_map(Value::as_f64).map(|f| f as f32).collect();
                self.vectors.put(&field.name, key, vector)?;
            }
        }

        columns.upsert(&self.definition, key, document);
        Ok(())
    }

    pub fn delete_document_locked(&self, columns: &mut ColumnStore, key: &str) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.delete_term(Term::from_field_text(self.schema_map.key, key));
        }
        self.vectors.delete(key);
        columns.delete(key);
        Ok(())
    }

    /// Make the batch visible to readers and persist the vector snapshot.
    pub fn commit(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.commit()?;
        }
        self.reader.reload()?;
        self.vectors.persist()?;
        Ok(())
    }

    pub fn delete_all(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock();
            writer.delete_all_documents()?;
            writer.commit()?;
        }
        self.reader.reload()?;
        self.columns.write().clear();
        self.vectors.clear()?;
        Ok(())
    }

    /// All live documents, in insertion order. Used when an index is
    /// rebuilt after a definition update.
    pub fn export_documents(&self) -> Vec<(String, Map<String, Value>)> {
        let columns = self.columns.read();
        columns
            .iter_live()
            .filter_map(|seq| {
                let key = columns.key_of(seq)?.to_string();
                let document = columns.document(seq)?.clone();
                Some((key, document))
            })
            .collect()
    }
}

/// Open/create/close per-index handles; one writer per index, readers are
/// cheap snapshots.
pub struct IndexManager {
    base_dir: PathBuf,
    vector_config: VectorConfig,
    indexes: RwLock<HashMap<String, Arc<SearchIndex>>>,
}

impl IndexManager {
    pub fn new(base_dir: PathBuf, vector_config: VectorConfig) -> Self {
        Self { base_dir, vector_config, indexes: RwLock::new(HashMap::new()) }
    }

    fn index_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Open an index from its persisted definition (startup path), or
    /// create its on-disk layout the first time.
    pub fn open(&self, definition: IndexDefinition) -> Result<Arc<SearchIndex>> {
        let name = definition.name.clone();
        let index = Arc::new(SearchIndex::open(
            definition,
            self.index_dir(&name),
            self.vector_config.clone(),
        )?);
        self.indexes.write().insert(name, Arc::clone(&index));
        Ok(index)
    }

    pub fn get(&self, name: &str) -> Result<Arc<SearchIndex>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    pub fn list(&self) -> Vec<Arc<SearchIndex>> {
        let mut indexes: Vec<_> = self.indexes.read().values().cloned().collect();
        indexes.sort_by(|a, b| a.name().cmp(b.name()));
        indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    pub fn total_documents(&self) -> u64 {
        self.list().iter().map(|index| index.doc_count()).sum()
    }

    /// Replace a definition: the index is rebuilt with the new schema and
    /// every live document is reindexed through the normal write path.
    pub fn update(&self, definition: IndexDefinition) -> Result<Arc<SearchIndex>> {
        let name = definition.name.clone();
        let existing = self.get(&name)?;
        let documents = existing.export_documents();

        self.indexes.write().remove(&name);
        drop(existing);
        let dir = self.index_dir(&name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }

        let index = self.open(definition)?;
        for (key, document) in documents {
            let (document, _warnings) =
                searchdock_types::documents::coerce_document(index.definition(), &document);
            index.upsert_document(&key, document)?;
        }
        index.commit()?;
        Ok(index)
    }

    /// Drop an index: metadata, writer state and vector state go together.
    pub fn delete(&self, name: &str) -> Result<()> {
        let removed = self.indexes.write().remove(name);
        if removed.is_none() {
            return Err(Error::IndexNotFound(name.to_string()));
        }
        drop(removed);
        let dir = self.index_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}
