//! Conversion of an index definition to the storage-layer schema.
//!
//! Searchable fields become analyzed tantivy text fields (leaf strings of
//! complex fields included, addressed as `parent/child`); everything else
//! lives in the doc-value columns and the stored `_source` document.

use std::collections::HashMap;

use searchdock_types::index::{DataType, Field as SchemaField, IndexDefinition};
use serde_json::{Map, Value};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};

use crate::analyzers;

pub const KEY_FIELD: &str = "_key";
pub const SOURCE_FIELD: &str = "_source";

/// The tantivy-side registry for one index.
#[derive(Debug, Clone)]
pub struct SchemaMap {
    pub schema: Schema,
    pub key: Field,
    pub source: Field,
    /// schema field path → (tantivy field, analyzer name)
    pub text_fields: HashMap<String, (Field, &'static str)>,
}

pub fn build_schema(definition: &IndexDefinition) -> SchemaMap {
    let mut builder = Schema::builder();
    let key = builder.add_text_field(KEY_FIELD, STRING | STORED);
    let source = builder.add_text_field(SOURCE_FIELD, STORED);

    let mut text_fields = HashMap::new();
    let mut stack: Vec<(String, &SchemaField)> =
        definition.fields.iter().map(|f| (f.name.clone(), f)).collect();
    while let Some((path, field)) = stack.pop() {
        if field.data_type.is_complex() {
            for sub in &field.fields {
                stack.push((format!("{path}/{}", sub.name), sub));
            }
            continue;
        }
        if !field.searchable || field.is_vector() {
            continue;
        }
        let analyzer = analyzers::resolve_analyzer(field.analyzer.as_deref());
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(analyzer)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let options = TextOptions::default().set_indexing_options(indexing);
        let tantivy_field = builder.add_text_field(&path, options);
        text_fields.insert(path, (tantivy_field, analyzer));
    }

    SchemaMap { schema: builder.build(), key, source, text_fields }
}

/// Collect `(field path, text)` pairs for every searchable value of a
/// document, flattening collections and complex sub-objects.
pub fn searchable_texts(definition: &IndexDefinition, document: &Map<String, Value>) -> Vec<(String, String)> {
    let mut texts = Vec::new();
    for field in &definition.fields {
        collect_searchable(field, &field.name, document.get(&field.name), &mut texts);
    }
    texts
}

fn collect_searchable(
    field: &SchemaField,
    path: &str,
    value: Option<&Value>,
    texts: &mut Vec<(String, String)>,
) {
    let Some(value) = value else { return };
    match &field.data_type {
        DataType::Complex => {
            if let Some(object) = value.as_object() {
                for sub in &field.fields {
                    collect_searchable(
                        sub,
                        &format!("{path}/{}", sub.name),
                        object.get(&sub.name),
                        texts,
                    );
                }
            }
        }
        DataType::Collection(inner) if **inner == DataType::Complex => {
            if let Some(items) = value.as_array() {
                for item in items {
                    if let Some(object) = item.as_object() {
                        for sub in &field.fields {
                            collect_searchable(
                                sub,
                                &format!("{path}/{}", sub.name),
                                object.get(&sub.name),
                                texts,
                            );
                        }
                    }
                }
            }
        }
        DataType::Collection(inner) if **inner == DataType::String => {
            if !field.searchable {
                return;
            }
            if let Some(items) = value.as_array() {
                for item in items {
                    if let Some(text) = item.as_str() {
                        texts.push((path.to_string(), text.to_string()));
                    }
                }
            }
        }
        DataType::String => {
            if !field.searchable {
                return;
            }
            if let Some(text) = value.as_str() {
                texts.push((path.to_string(), text.to_string()));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn complex_leaves_get_their_own_fields() {
        let definition: IndexDefinition = serde_json::from_value(json!({
            "name": "hotels",
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "name", "type": "Edm.String", "searchable": true },
                { "name": "rating", "type": "Edm.Double", "sortable": true },
                { "name": "address", "type": "Edm.ComplexType", "fields": [
                    { "name": "city", "type": "Edm.String", "searchable": true },
                    { "name": "zip", "type": "Edm.String" }
                ]}
            ]
        }))
        .unwrap();

        let map = build_schema(&definition);
        assert!(map.text_fields.contains_key("name"));
        assert!(map.text_fields.contains_key("address/city"));
        // non-searchable fields do not get text fields
        assert!(!map.text_fields.contains_key("rating"));
        assert!(!map.text_fields.contains_key("address/zip"));

        let document = json!({
            "id": "1",
            "name": "Fancy Stay",
            "address": { "city": "Lille", "zip": "59000" }
        });
        let texts = searchable_texts(&definition, document.as_object().unwrap());
        assert!(texts.contains(&("name".to_string(), "Fancy Stay".to_string())));
        assert!(texts.contains(&("address/city".to_string(), "Lille".to_string())));
        assert_eq!(texts.len(), 2);
    }
}
