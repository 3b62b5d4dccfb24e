//! The enriched document: a JSON tree rooted at `/document`, addressed by
//! slash paths (`/document/pages/0/text`). Wildcard segments (`*`) expand to
//! every child at that level, one binding per match.

use searchdock_types::data_source::DataSourceDocument;
use serde_json::{json, Map, Value};

use crate::crackers::CrackedDocument;

#[derive(Debug, Clone)]
pub struct EnrichedDocument {
    root: Value,
}

impl EnrichedDocument {
    /// Seed the tree with the cracked fields and `metadata_storage_*`
    /// properties of the source object.
    pub fn new(cracked: &CrackedDocument, source: &DataSourceDocument) -> Self {
        let mut document = Map::new();
        document.insert("content".to_string(), json!(cracked.content));
        if let Some(title) = &cracked.title {
            document.insert("title".to_string(), json!(title));
        }
        if let Some(author) = &cracked.author {
            document.insert("author".to_string(), json!(author));
        }
        if let Some(language) = &cracked.language {
            document.insert("language".to_string(), json!(language));
        }
        if let Some(count) = cracked.word_count {
            document.insert("wordCount".to_string(), json!(count));
        }
        if let Some(count) = cracked.character_count {
            document.insert("characterCount".to_string(), json!(count));
        }
        for (name, value) in &cracked.metadata {
            document.insert(name.clone(), value.clone());
        }
        for (name, value) in &source.metadata {
            document.insert(name.clone(), value.clone());
        }

        let mut root = Map::new();
        root.insert("document".to_string(), Value::Object(document));
        Self { root: Value::Object(root) }
    }

    #[cfg(test)]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    fn segments(path: &str) -> Vec<&str> {
        path.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Read the node at a concrete path (no wildcards).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in Self::segments(path) {
            current = match current {
                Value::Object(object) => object.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at a concrete path, creating missing interior objects.
    /// A numeric segment indexes an array, extending it with nulls as
    /// needed.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = Self::segments(path);
        if segments.is_empty() {
            return;
        }
        let mut current = &mut self.root;
        for (position, segment) in segments.iter().enumerate() {
            let last = position == segments.len() - 1;
            match segment.parse::<usize>() {
                Ok(index) => {
                    if !current.is_array() {
                        *current = Value::Array(Vec::new());
                    }
                    let items = current.as_array_mut().unwrap();
                    while items.len() <= index {
                        items.push(Value::Null);
                    }
                    if last {
                        items[index] = value;
                        return;
                    }
                    current = &mut items[index];
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                }
                Err(_) => {
                    if !current.is_object() {
                        *current = Value::Object(Map::new());
                    }
                    let object = current.as_object_mut().unwrap();
                    if last {
                        object.insert(segment.to_string(), value);
                        return;
                    }
                    current = object
                        .entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                }
            }
        }
    }

    /// Expand a path with `*` wildcards into every concrete path it
    /// matches, in document order.
    pub fn expand(&self, path: &str) -> Vec<String> {
        let segments = Self::segments(path);
        let mut bindings = vec![String::new()];

        for segment in segments {
            let mut next = Vec::new();
            for binding in &bindings {
                if segment == "*" {
                    match self.get(binding) {
                        Some(Value::Array(items)) => {
                            for index in 0..items.len() {
                                next.push(format!("{binding}/{index}"));
                            }
                        }
                        Some(Value::Object(object)) => {
                            for key in object.keys() {
                                next.push(format!("{binding}/{key}"));
                            }
                        }
                        _ => {}
                    }
                } else {
                    let candidate = format!("{binding}/{segment}");
                    if self.get(&candidate).is_some() {
                        next.push(candidate);
                    }
                }
            }
            bindings = next;
        }
        bindings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> EnrichedDocument {
        EnrichedDocument::from_value(json!({
            "document": {
                "content": "hello",
                "pages": [
                    { "text": "page one" },
                    { "text": "page two" }
                ]
            }
        }))
    }

    #[test]
    fn get_addresses_nested_nodes() {
        let doc = tree();
        assert_eq!(doc.get("/document/content"), Some(&json!("hello")));
        assert_eq!(doc.get("/document/pages/1/text"), Some(&json!("page two")));
        assert_eq!(doc.get("/document/missing"), None);
        assert_eq!(doc.get("/document/pages/9/text"), None);
    }

    #[test]
    fn set_creates_intermediate_nodes() {
        let mut doc = tree();
        doc.set("/document/chunks/0", json!("first"));
        doc.set("/document/chunks/2", json!("third"));
        assert_eq!(
            doc.get("/document/chunks"),
            Some(&json!(["first", null, "third"]))
        );
        doc.set("/document/shaped/name", json!("x"));
        assert_eq!(doc.get("/document/shaped"), Some(&json!({ "name": "x" })));
    }

    #[test]
    fn wildcard_expansion_materializes_bindings() {
        let doc = tree();
        assert_eq!(
            doc.expand("/document/pages/*"),
            vec!["/document/pages/0", "/document/pages/1"]
        );
        assert_eq!(
            doc.expand("/document/pages/*/text"),
            vec!["/document/pages/0/text", "/document/pages/1/text"]
        );
        assert_eq!(doc.expand("/document"), vec!["/document"]);
        assert!(doc.expand("/document/missing/*").is_empty());
    }

    #[test]
    fn writes_under_one_binding_do_not_leak_into_others() {
        let mut doc = tree();
        doc.set("/document/pages/0/summary", json!("s0"));
        assert_eq!(doc.get("/document/pages/0/summary"), Some(&json!("s0")));
        assert_eq!(doc.get("/document/pages/1/summary"), None);
    }

    #[test]
    fn seeded_from_cracked_document() {
        let cracked = CrackedDocument {
            content: "body".to_string(),
            title: Some("T".to_string()),
            ..Default::default()
        }
        .with_counts();
        let source: DataSourceDocument = serde_json::from_value(json!({
            "key": "azE",
            "name": "a.txt",
            "size": 4,
            "lastModified": "2024-05-01T00:00:00Z",
            "metadata": { "metadata_storage_path": "a.txt" }
        }))
        .unwrap();

        let doc = EnrichedDocument::new(&cracked, &source);
        assert_eq!(doc.get("/document/content"), Some(&json!("body")));
        assert_eq!(doc.get("/document/title"), Some(&json!("T")));
        assert_eq!(doc.get("/document/metadata_storage_path"), Some(&json!("a.txt")));
        assert_eq!(doc.get("/document/wordCount"), Some(&json!(1)));
    }
}
