//! Field mappings: project source and enriched values into a document
//! shaped for the target index, with the optional mapping functions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use searchdock_types::index::IndexDefinition;
use searchdock_types::indexer::{IndexerDefinition, MappingFunction};
use serde_json::{Map, Value};

use crate::enriched::EnrichedDocument;
use crate::error::{Error, Result};

/// Build the target document: same-name source fields are auto-mapped,
/// explicit field mappings override them, output field mappings project
/// enriched paths last.
pub fn project_document(
    indexer: &IndexerDefinition,
    index: &IndexDefinition,
    source_fields: &Map<String, Value>,
    enriched: &EnrichedDocument,
) -> (Map<String, Value>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut target = Map::new();

    for field in &index.fields {
        if let Some(value) = source_fields.get(&field.name) {
            target.insert(field.name.clone(), value.clone());
        }
    }

    for mapping in &indexer.field_mappings {
        let Some(value) = source_fields.get(&mapping.source_field_name) else {
            warnings.push(format!(
                "Field mapping source `{}` is absent from the source document.",
                mapping.source_field_name
            ));
            continue;
        };
        match apply_function(mapping.mapping_function.as_ref(), value.clone()) {
            Ok(value) => {
                target.insert(mapping.target().to_string(), value);
            }
            Err(e) => warnings.push(e.to_string()),
        }
    }

    for mapping in &indexer.output_field_mappings {
        let Some(value) = enriched.get(&mapping.source_field_name) else {
            warnings.push(format!(
                "Output field mapping source `{}` is absent from the enriched document.",
                mapping.source_field_name
            ));
            continue;
        };
        match apply_function(mapping.mapping_function.as_ref(), value.clone()) {
            Ok(value) => {
                target.insert(mapping.target().to_string(), value);
            }
            Err(e) => warnings.push(e.to_string()),
        }
    }

    (target, warnings)
}

pub fn apply_function(function: Option<&MappingFunction>, value: Value) -> Result<Value> {
    let Some(function) = function else { return Ok(value) };
    let parameter = |name: &str| {
        function.parameters.as_ref().and_then(|p| p.get(name)).cloned()
    };

    match function.name.as_str() {
        "base64Encode" => {
            let text = string_input(&function.name, &value)?;
            Ok(Value::String(URL_SAFE_NO_PAD.encode(text.as_bytes())))
        }
        "base64Decode" => {
            let text = string_input(&function.name, &value)?;
            let bytes = URL_SAFE_NO_PAD.decode(text.as_bytes()).map_err(|_| {
                Error::InvalidDefinition(format!("`{text}` is not valid URL-safe base64."))
            })?;
            String::from_utf8(bytes).map(Value::String).map_err(|_| {
                Error::InvalidDefinition(
                    "base64Decode produced bytes that are not valid UTF-8.".to_string(),
                )
            })
        }
        "extractTokenAtPosition" => {
            let text = string_input(&function.name, &value)?;
            let delimiter = parameter("delimiter")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| " ".to_string());
            let position = parameter("position").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
            let token = text.split(&delimiter).nth(position).ok_or_else(|| {
                Error::InvalidDefinition(format!(
                    "extractTokenAtPosition: `{text}` has no token at position {position}."
                ))
            })?;
            Ok(Value::String(token.to_string()))
        }
        "urlEncode" => {
            let text = string_input(&function.name, &value)?;
            Ok(Value::String(urlencoding::encode(&text).into_owned()))
        }
        "urlDecode" => {
            let text = string_input(&function.name, &value)?;
            urlencoding::decode(&text)
                .map(|decoded| Value::String(decoded.into_owned()))
                .map_err(|_| {
                    Error::InvalidDefinition(format!("`{text}` is not URL-decodable.")) })
        }
        "jsonArrayToStringCollection" => {
            let text = string_input(&function.name, &value)?;
            let parsed: Value = serde_json::from_str(&text).map_err(|_| {
                Error::InvalidDefinition(format!("`{text}` is not a JSON array."))
            })?;
            let items = parsed.as_array().ok_or_else(|| {
                Error::InvalidDefinition(format!("`{text}` is not a JSON array."))
            })?;
            Ok(Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Value::String(s.clone()),
                        other => Value::String(other.to_string()),
                    })
                    .collect(),
            ))
        }
        other => Err(Error::InvalidDefinition(format!(
            "`{other}` is not a supported mapping function."
        ))),
    }
}

fn string_input(function: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::InvalidDefinition(format!(
            "Mapping function `{function}` expects a string input, got `{other}`."
        ))),
    }
}
