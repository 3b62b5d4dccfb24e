use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::index::{DataType, Field, IndexDefinition};

/// One entry of a document batch: the action tag plus the document body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexActionKind {
    Upload,
    Merge,
    MergeOrUpload,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexAction {
    #[serde(rename = "@search.action")]
    pub action: IndexActionKind,
    #[serde(flatten)]
    pub document: Map<String, Value>,
}

/// Wire batch input: `{"value": [{"@search.action": "...", ...fields}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentBatch {
    pub value: Vec<IndexAction>,
}

/// Per-item outcome. Success is independent per document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingResult {
    pub key: String,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub status_code: u16,
}

impl IndexingResult {
    pub fn succeeded(key: String) -> Self {
        Self { key, status: true, error_message: None, status_code: 200 }
    }

    pub fn failed(key: String, status_code: u16, message: impl Into<String>) -> Self {
        Self { key, status: false, error_message: Some(message.into()), status_code }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentBatchResponse {
    pub value: Vec<IndexingResult>,
}

/// Project a document onto an index schema.
///
/// Unknown fields are dropped with a warning; a value that cannot be coerced
/// to the schema type is skipped with a warning. Neither is an error.
pub fn coerce_document(
    index: &IndexDefinition,
    document: &Map<String, Value>,
) -> (Map<String, Value>, Vec<String>) {
    let mut warnings = Vec::new();
    let coerced = coerce_fields(&index.fields, document, "", &mut warnings);
    (coerced, warnings)
}

fn coerce_fields(
    fields: &[Field],
    document: &Map<String, Value>,
    path: &str,
    warnings: &mut Vec<String>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, value) in document {
        let full_name = if path.is_empty() { name.clone() } else { format!("{path}/{name}") };
        let Some(field) = fields.iter().find(|f| &f.name == name) else {
            warnings.push(format!("Unknown field `{full_name}` was dropped."));
            continue;
        };
        if value.is_null() {
            out.insert(name.clone(), Value::Null);
            continue;
        }
        match coerce_value(field, value, &full_name, warnings) {
            Some(coerced) => {
                out.insert(name.clone(), coerced);
            }
            None => warnings.push(format!(
                "Field `{full_name}`: value does not coerce to {} and was skipped.",
                field.data_type
            )),
        }
    }
    out
}

fn coerce_value(
    field: &Field,
    value: &Value,
    path: &str,
    warnings: &mut Vec<String>,
) -> Option<Value> {
    if field.is_vector() {
        let array = value.as_array()?;
        let floats: Option<Vec<f64>> = array.iter().map(Value::as_f64).collect();
        let floats = floats?;
        if let Some(dims) = field.dimensions {
            if floats.len() != dims {
                warnings.push(format!(
                    "Field `{path}`: expected {dims} dimensions but got {}.",
                    floats.len()
                ));
                return None;
            }
        }
        return Some(Value::Array(floats.into_iter().map(|f| f.into()).collect()));
    }

    match &field.data_type {
        DataType::Collection(inner) => {
            let array = value.as_array()?;
            let mut items = Vec::with_capacity(array.len());
            for item in array {
                match coerce_scalar(inner, field, item, path, warnings) {
                    Some(coerced) => items.push(coerced),
                    None => warnings.push(format!(
                        "Field `{path}`: collection element does not coerce to {inner} and was skipped."
                    )),
                }
            }
            Some(Value::Array(items))
        }
        scalar => coerce_scalar(scalar, field, value, path, warnings),
    }
}

fn coerce_scalar(
    data_type: &DataType,
    field: &Field,
    value: &Value,
    path: &str,
    warnings: &mut Vec<String>,
) -> Option<Value> {
    match data_type {
        DataType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        DataType::Int32 | DataType::Int64 => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(|i| Value::Number(i.into())),
            Value::String(s) => s.parse::<i64>().ok().map(|i| Value::Number(i.into())),
            _ => None,
        },
        DataType::Double | DataType::Single => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => {
                s.parse::<f64>().ok().and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            }
            _ => None,
        },
        DataType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        DataType::DateTimeOffset => {
            let s = value.as_str()?;
            let parsed = OffsetDateTime::parse(s, &Rfc3339).ok()?;
            // normalize to a canonical RFC 3339 rendering
            Some(Value::String(parsed.format(&Rfc3339).ok()?))
        }
        DataType::GeographyPoint => {
            let obj = value.as_object()?;
            let coordinates = obj.get("coordinates")?.as_array()?;
            if coordinates.len() != 2 || !coordinates.iter().all(|c| c.is_number()) {
                return None;
            }
            Some(value.clone())
        }
        DataType::Complex => {
            let obj = value.as_object()?;
            Some(Value::Object(coerce_fields(&field.fields, obj, path, warnings)))
        }
        DataType::Collection(_) => None,
    }
}

/// Extract the document key, given the schema's key field.
pub fn extract_key(index: &IndexDefinition, document: &Map<String, Value>) -> Option<String> {
    let key_field = index.key_field();
    match document.get(&key_field.name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
