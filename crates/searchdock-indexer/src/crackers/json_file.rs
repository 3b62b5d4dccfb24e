use serde_json::Value;

use super::{CrackedDocument, DocumentCracker};

/// JSON payloads flatten into text content; top-level scalars double as
/// metadata.
pub struct JsonCracker;

impl DocumentCracker for JsonCracker {
    fn can_handle(&self, content_type: &str, extension: &str) -> bool {
        content_type.starts_with("application/json") || extension == "json"
    }

    fn crack(&self, bytes: &[u8], file_name: &str, _content_type: &str) -> CrackedDocument {
        let parsed: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                return CrackedDocument {
                    warnings: vec![format!("`{file_name}` is not valid JSON: {e}.")],
                    failed: true,
                    ..Default::default()
                }
            }
        };

        let mut fragments = Vec::new();
        collect_text(&parsed, &mut fragments);
        let mut cracked =
            CrackedDocument { content: fragments.join("\n"), ..Default::default() };
        if let Value::Object(object) = &parsed {
            for (name, value) in object {
                if value.is_string() || value.is_number() || value.is_boolean() {
                    cracked.metadata.insert(name.clone(), value.clone());
                }
            }
            cracked.title =
                object.get("title").and_then(Value::as_str).map(str::to_string);
        }
        cracked.with_counts()
    }
}

fn collect_text(value: &Value, fragments: &mut Vec<String>) {
    match value {
        Value::String(s) => fragments.push(s.clone()),
        Value::Number(n) => fragments.push(n.to_string()),
        Value::Bool(b) => fragments.push(b.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_text(item, fragments)),
        Value::Object(object) => object.values().for_each(|item| collect_text(item, fragments)),
        Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_values_and_keeps_scalar_metadata() {
        let payload = br#"{ "title": "Doc", "nested": { "body": "hello" }, "pages": 3 }"#;
        let cracked = JsonCracker.crack(payload, "doc.json", "application/json");
        assert_eq!(cracked.title.as_deref(), Some("Doc"));
        assert!(cracked.content.contains("hello"));
        assert_eq!(cracked.metadata["pages"], serde_json::json!(3));
        assert!(!cracked.metadata.contains_key("nested"));
    }

    #[test]
    fn invalid_json_is_flagged_not_fatal() {
        let cracked = JsonCracker.crack(b"{nope", "bad.json", "application/json");
        assert!(cracked.failed);
        assert_eq!(cracked.warnings.len(), 1);
    }
}
