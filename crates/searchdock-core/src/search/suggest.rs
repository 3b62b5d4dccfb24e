//! Suggesters: prefix suggestions over documents and term autocomplete,
//! both scoped to a named suggester's source fields.

use std::collections::BTreeMap;

use searchdock_types::index::{IndexDefinition, Suggester};
use serde_json::{Map, Value};

use crate::analyzers;
use crate::error::{Error, Result};
use crate::index::SearchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutocompleteMode {
    #[default]
    OneTerm,
    TwoTerms,
}

pub const DEFAULT_SUGGEST_TOP: usize = 5;

fn resolve_suggester<'a>(
    definition: &'a IndexDefinition,
    name: &str,
) -> Result<&'a Suggester> {
    definition.suggesters.iter().find(|s| s.name == name).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "Suggester `{name}` does not exist on index `{}`.",
            definition.name
        ))
    })
}

/// Documents whose suggester source fields prefix-match the search text.
/// Each hit carries the matched value as `@search.text`.
pub fn suggest(
    index: &SearchIndex,
    suggester_name: &str,
    search_text: &str,
    top: usize,
) -> Result<Vec<(String, String)>> {
    let definition = index.definition();
    let suggester = resolve_suggester(definition, suggester_name)?;
    let needle = search_text.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let columns = index.columns().read();
    let mut hits = Vec::new();
    'documents: for seq in columns.iter_live() {
        let Some(document) = columns.document(seq) else { continue };
        let Some(key) = columns.key_of(seq) else { continue };
        for field in &suggester.source_fields {
            for text in field_texts(document, field) {
                let lowered = text.to_lowercase();
                let matched = lowered.starts_with(&needle)
                    || lowered
                        .split_whitespace()
                        .any(|word| word.starts_with(&needle));
                if matched {
                    hits.push((key.to_string(), text));
                    if hits.len() >= top {
                        break 'documents;
                    }
                    continue 'documents;
                }
            }
        }
    }
    Ok(hits)
}

/// Distinct completed terms starting with the final term of the search
/// text. `TwoTerms` appends the following token of the source value.
pub fn autocomplete(
    index: &SearchIndex,
    suggester_name: &str,
    search_text: &str,
    mode: AutocompleteMode,
    top: usize,
) -> Result<Vec<(String, String)>> {
    let definition = index.definition();
    let suggester = resolve_suggester(definition, suggester_name)?;

    let trimmed = search_text.trim();
    let (head, last) = match trimmed.rsplit_once(char::is_whitespace) {
        Some((head, last)) => (format!("{head} "), last.to_lowercase()),
        None => (String::new(), trimmed.to_lowercase()),
    };
    if last.is_empty() {
        return Ok(Vec::new());
    }

    // completion -> frequency, in insertion-stable alphabetical order
    let mut completions: BTreeMap<String, u64> = BTreeMap::new();
    let columns = index.columns().read();
    for seq in columns.iter_live() {
        let Some(document) = columns.document(seq) else { continue };
        for field in &suggester.source_fields {
            let Some((_, analyzer)) = index.schema_map().text_fields.get(field) else {
                continue;
            };
            for text in field_texts(document, field) {
                let tokens = analyzers::analyze(index.tantivy(), analyzer, &text);
                for (position, (token, _)) in tokens.iter().enumerate() {
                    if !token.starts_with(&last) {
                        continue;
                    }
                    let completion = match mode {
                        AutocompleteMode::OneTerm => token.clone(),
                        AutocompleteMode::TwoTerms => match tokens.get(position + 1) {
                            Some((next, _)) => format!("{token} {next}"),
                            None => token.clone(),
                        },
                    };
                    *completions.entry(completion).or_default() += 1;
                }
            }
        }
    }

    let mut ranked: Vec<(String, u64)> = completions.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top);

    Ok(ranked
        .into_iter()
        .map(|(text, _)| {
            let query_plus_text = format!("{head}{text}");
            (text, query_plus_text)
        })
        .collect())
}

fn field_texts(document: &Map<String, Value>, field: &str) -> Vec<String> {
    match document.get(field.split('/').next().unwrap_or(field)) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        }
        _ => Vec::new(),
    }
}
