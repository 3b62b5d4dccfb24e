//! Hit highlighting: re-run the field's analyzer over the stored value and
//! wrap the token spans matching any query term (post-synonym-expansion)
//! with the configured tags.

use searchdock_types::index::IndexDefinition;
use serde_json::{Map, Value};

use crate::analyzers;
use crate::error::{Error, Result};
use crate::index::SearchIndex;

pub struct HighlightOptions<'a> {
    pub fields: Vec<String>,
    pub pre_tag: &'a str,
    pub post_tag: &'a str,
}

pub fn parse_highlight(
    definition: &IndexDefinition,
    index: &SearchIndex,
    spec: &str,
) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    for name in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !index.schema_map().text_fields.contains_key(name) {
            return Err(match definition.field(name.split('/').next().unwrap_or(name)) {
                Some(_) => Error::InvalidArgument(format!(
                    "Field `{name}` is not searchable and cannot be highlighted."
                )),
                None => Error::UnknownField(name.to_string(), definition.name.clone()),
            });
        }
        fields.push(name.to_string());
    }
    Ok(fields)
}

/// Returns the `@search.highlights` object for one document, or `None` when
/// no highlighted field produced a fragment.
pub fn highlight_document(
    index: &SearchIndex,
    document: &Map<String, Value>,
    options: &HighlightOptions,
    terms: &[String],
) -> Option<Map<String, Value>> {
    if terms.is_empty() {
        return None;
    }
    let mut highlights = Map::new();

    for path in &options.fields {
        let Some((_, analyzer)) = index.schema_map().text_fields.get(path) else { continue };
        let mut fragments = Vec::new();
        for text in stored_texts(document, path) {
            if let Some(fragment) =
                highlight_text(index, analyzer, &text, terms, options.pre_tag, options.post_tag)
            {
                fragments.push(Value::String(fragment));
            }
        }
        if !fragments.is_empty() {
            highlights.insert(path.clone(), Value::Array(fragments));
        }
    }

    (!highlights.is_empty()).then_some(highlights)
}

fn stored_texts(document: &Map<String, Value>, path: &str) -> Vec<String> {
    let mut current: &Value = match document.get(path.split('/').next().unwrap_or(path)) {
        Some(value) => value,
        None => return Vec::new(),
    };
    for part in path.split('/').skip(1) {
        match current.get(part) {
            Some(value) => current = value,
            None => return Vec::new(),
        }
    }
    match current {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        }
        _ => Vec::new(),
    }
}

fn highlight_text(
    index: &SearchIndex,
    analyzer: &str,
    text: &str,
    terms: &[String],
    pre_tag: &str,
    post_tag: &str,
) -> Option<String> {
    let tokens = analyzers::analyze(index.tantivy(), analyzer, text);
    let matches: Vec<std::ops::Range<usize>> = tokens
        .into_iter()
        .filter(|(token, _)| terms.iter().any(|term| term == token))
        .map(|(_, range)| range)
        .collect();
    if matches.is_empty() {
        return None;
    }

    let mut fragment = String::with_capacity(text.len() + matches.len() * 9);
    let mut cursor = 0;
    for range in matches {
        fragment.push_str(&text[cursor..range.start]);
        fragment.push_str(pre_tag);
        fragment.push_str(&text[range.clone()]);
        fragment.push_str(post_tag);
        cursor = range.end;
    }
    fragment.push_str(&text[cursor..]);
    Some(fragment)
}
