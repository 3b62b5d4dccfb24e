//! Per-document upload / merge / mergeOrUpload / delete batching.
//!
//! Success is independent per document. The column-store write lock is held
//! for the whole batch and the commit happens before it is released, so a
//! reader sees either none of the batch or all of it.

use searchdock_types::documents::{
    coerce_document, extract_key, IndexAction, IndexActionKind, IndexingResult,
};
use serde_json::{Map, Value};

use crate::columns::ColumnStore;
use crate::error::Result;
use crate::index::SearchIndex;

pub fn apply_batch(index: &SearchIndex, batch: Vec<IndexAction>) -> Result<Vec<IndexingResult>> {
    let mut results = Vec::with_capacity(batch.len());
    let mut columns = index.columns().write();

    for action in batch {
        let Some(key) = extract_key(index.definition(), &action.document) else {
            results.push(IndexingResult::failed(
                String::new(),
                400,
                format!(
                    "The document is missing a value for the key field `{}`.",
                    index.definition().key_field().name
                ),
            ));
            continue;
        };

        let outcome = match action.action {
            IndexActionKind::Upload => upload(index, &mut columns, &key, &action.document),
            IndexActionKind::Merge => merge(index, &mut columns, &key, &action.document, false),
            IndexActionKind::MergeOrUpload => {
                merge(index, &mut columns, &key, &action.document, true)
            }
            IndexActionKind::Delete => {
                index.delete_document_locked(&mut columns, &key).map(|()| 200)
            }
        };

        match outcome {
            Ok(status_code) => results.push(IndexingResult {
                key,
                status: true,
                error_message: None,
                status_code,
            }),
            Err(e) => {
                let status_code = match &e {
                    crate::Error::DocumentNotFound(_) => 404,
                    crate::Error::VectorDimensionMismatch { .. }
                    | crate::Error::InvalidArgument(_) => 400,
                    _ => 500,
                };
                results.push(IndexingResult::failed(key, status_code, e.to_string()));
            }
        }
    }

    index.commit()?;
    Ok(results)
}

fn current_document(columns: &ColumnStore, key: &str) -> Option<Map<String, Value>> {
    let seq = columns.seq_of(key)?;
    columns.document(seq).cloned()
}

fn upload(
    index: &SearchIndex,
    columns: &mut ColumnStore,
    key: &str,
    document: &Map<String, Value>,
) -> Result<u16> {
    let (coerced, warnings) = coerce_document(index.definition(), document);
    log_warnings(index.name(), key, &warnings);
    let created = current_document(columns, key).is_none();
    index.upsert_document_locked(columns, key, coerced)?;
    Ok(if created { 201 } else { 200 })
}

/// Shallow merge: scalar fields are overwritten, collection fields are
/// replaced, an explicit null clears the field.
fn merge(
    index: &SearchIndex,
    columns: &mut ColumnStore,
    key: &str,
    document: &Map<String, Value>,
    upload_when_absent: bool,
) -> Result<u16> {
    let existing = current_document(columns, key);
    let Some(mut merged) = existing else {
        if upload_when_absent {
            return upload(index, columns, key, document);
        }
        return Err(crate::Error::DocumentNotFound(key.to_string()));
    };

    let (coerced, warnings) = coerce_document(index.definition(), document);
    log_warnings(index.name(), key, &warnings);
    for (field, value) in coerced {
        if value.is_null() {
            merged.remove(&field);
        } else {
            merged.insert(field, value);
        }
    }

    index.upsert_document_locked(columns, key, merged)?;
    Ok(200)
}

fn log_warnings(index_name: &str, key: &str, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(index = index_name, key, "{warning}");
    }
}
