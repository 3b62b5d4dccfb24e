//! The `simple` query grammar: bare terms, quoted phrases, trailing-`*`
//! prefixes, `field:term` scoping, `+`/`-` clause markers. Terms run through
//! the target field's analyzer and synonym expansion before becoming
//! tantivy term queries; `searchMode` picks the implicit connective.

use searchdock_types::index::IndexDefinition;
use tantivy::query::{BooleanQuery, Occur, PhraseQuery, Query, RegexQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;

use crate::analyzers;
use crate::error::{Error, Result};
use crate::index::SearchIndex;
use crate::synonyms::SynonymRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Any,
    All,
}

/// A built text query plus the analyzed terms (synonyms included) that
/// highlighting matches against.
pub struct BuiltQuery {
    pub query: Box<dyn Query>,
    pub highlight_terms: Vec<String>,
}

#[derive(Debug, PartialEq)]
enum Clause {
    Term { field: Option<String>, text: String, prefix: bool, occur: ClauseOccur },
    Phrase { field: Option<String>, text: String, occur: ClauseOccur },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClauseOccur {
    Default,
    Must,
    MustNot,
}

fn tokenize_clauses(input: &str) -> Vec<Clause> {
    let mut clauses = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let occur = match c {
            '+' => {
                chars.next();
                ClauseOccur::Must
            }
            '-' => {
                chars.next();
                ClauseOccur::MustNot
            }
            _ => ClauseOccur::Default,
        };

        if chars.peek() == Some(&'"') {
            chars.next();
            let mut text = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                text.push(c);
            }
            if !text.trim().is_empty() {
                clauses.push(Clause::Phrase { field: None, text, occur });
            }
            continue;
        }

        let mut word = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            word.push(c);
            chars.next();
        }
        if word.is_empty() {
            continue;
        }

        let (field, rest) = match word.split_once(':') {
            Some((field, rest)) if !field.is_empty() && !rest.is_empty() => {
                (Some(field.to_string()), rest.to_string())
            }
            _ => (None, word),
        };

        if let Some(rest) = rest.strip_prefix('"') {
            // a fielded phrase: `name:"fancy stay` opened a quote mid-word;
            // consume up to the closing quote
            let mut text = rest.trim_end_matches('"').to_string();
            if !rest.ends_with('"') {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    text.push(c);
                }
            }
            clauses.push(Clause::Phrase { field, text, occur });
            continue;
        }

        let prefix = rest.ends_with('*') && rest.len() > 1;
        let text = if prefix { rest[..rest.len() - 1].to_string() } else { rest };
        clauses.push(Clause::Term { field, text, prefix, occur });
    }

    clauses
}

/// The searchable fields a query runs against: `(path, tantivy field,
/// analyzer)` tuples, restricted by `searchFields` when present.
pub fn target_fields(
    index: &SearchIndex,
    search_fields: Option<&[String]>,
) -> Result<Vec<(String, Field, &'static str)>> {
    let schema_map = index.schema_map();
    match search_fields {
        Some(names) => {
            let mut fields = Vec::with_capacity(names.len());
            for name in names {
                let (field, analyzer) = schema_map.text_fields.get(name).ok_or_else(|| {
                    Error::UnknownField(name.clone(), index.definition().name.clone())
                })?;
                fields.push((name.clone(), *field, *analyzer));
            }
            Ok(fields)
        }
        None => {
            let mut fields: Vec<_> = schema_map
                .text_fields
                .iter()
                .map(|(name, (field, analyzer))| (name.clone(), *field, *analyzer))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(fields)
        }
    }
}

pub fn build_simple_query(
    index: &SearchIndex,
    definition: &IndexDefinition,
    search: &str,
    search_mode: SearchMode,
    fields: &[(String, Field, &'static str)],
    synonyms: &dyn Fn(&str) -> Option<SynonymRules>,
) -> Result<BuiltQuery> {
    let clauses = tokenize_clauses(search);
    let mut highlight_terms = Vec::new();
    let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    for clause in &clauses {
        let (occur, built) = match clause {
            Clause::Term { field, text, prefix, occur } => {
                let scoped = scope_fields(index, definition, fields, field.as_deref())?;
                let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for (name, tantivy_field, analyzer) in &scoped {
                    let variants = expand_term(definition, name, text, synonyms);
                    for variant in variants {
                        if let Some(query) = term_query(
                            index,
                            *tantivy_field,
                            analyzer,
                            &variant,
                            *prefix,
                            &mut highlight_terms,
                        )? {
                            per_field.push((Occur::Should, query));
                        }
                    }
                }
                (*occur, per_field)
            }
            Clause::Phrase { field, text, occur } => {
                let scoped = scope_fields(index, definition, fields, field.as_deref())?;
                let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for (_name, tantivy_field, analyzer) in &scoped {
                    if let Some(query) = phrase_query(
                        index,
                        *tantivy_field,
                        analyzer,
                        text,
                        &mut highlight_terms,
                    ) {
                        per_field.push((Occur::Should, query));
                    }
                }
                (*occur, per_field)
            }
        };

        if built.is_empty() {
            continue;
        }
        let clause_query: Box<dyn Query> =
            if built.len() == 1 { built.into_iter().next().unwrap().1 } else { Box::new(BooleanQuery::new(built)) };

        let occur = match occur {
            ClauseOccur::Must => Occur::Must,
            ClauseOccur::MustNot => Occur::MustNot,
            ClauseOccur::Default => match search_mode {
                SearchMode::Any => Occur::Should,
                SearchMode::All => Occur::Must,
            },
        };
        subqueries.push((occur, clause_query));
    }

    let query: Box<dyn Query> = match subqueries.len() {
        0 => Box::new(BooleanQuery::new(Vec::new())),
        1 if subqueries[0].0 != Occur::MustNot => subqueries.into_iter().next().unwrap().1,
        _ => Box::new(BooleanQuery::new(subqueries)),
    };

    highlight_terms.sort();
    highlight_terms.dedup();
    Ok(BuiltQuery { query, highlight_terms })
}

fn scope_fields(
    index: &SearchIndex,
    _definition: &IndexDefinition,
    fields: &[(String, Field, &'static str)],
    scoped: Option<&str>,
) -> Result<Vec<(String, Field, &'static str)>> {
    match scoped {
        None => Ok(fields.to_vec()),
        Some(name) => {
            let (field, analyzer) =
                index.schema_map().text_fields.get(name).ok_or_else(|| {
                    Error::UnknownField(name.to_string(), index.definition().name.clone())
                })?;
            Ok(vec![(name.to_string(), *field, *analyzer)])
        }
    }
}

/// The original term plus its synonym expansions for the field, per the
/// Solr rules attached to the field's synonym maps.
fn expand_term(
    definition: &IndexDefinition,
    field_path: &str,
    text: &str,
    synonyms: &dyn Fn(&str) -> Option<SynonymRules>,
) -> Vec<String> {
    let mut variants = vec![text.to_string()];
    let top_level = field_path.split('/').next().unwrap_or(field_path);
    if let Some(field) = definition.field(top_level) {
        for map_name in &field.synonym_maps {
            if let Some(rules) = synonyms(map_name) {
                for synonym in rules.expand(text) {
                    if !variants.iter().any(|v| v.eq_ignore_ascii_case(synonym)) {
                        variants.push(synonym.clone());
                    }
                }
            }
        }
    }
    variants
}

fn term_query(
    index: &SearchIndex,
    field: Field,
    analyzer: &str,
    text: &str,
    prefix: bool,
    highlight_terms: &mut Vec<String>,
) -> Result<Option<Box<dyn Query>>> {
    let tokens = analyzers::analyze(index.tantivy(), analyzer, text);
    if tokens.is_empty() {
        return Ok(None);
    }

    if prefix {
        // only the analyzed form of a single-token prefix is expandable
        let token = &tokens[0].0;
        highlight_terms.push(token.clone());
        let pattern = format!("{}.*", escape_regex(token));
        let query = RegexQuery::from_pattern(&pattern, field)
            .map_err(|e| Error::InvalidArgument(format!("Invalid prefix term `{text}`: {e}.")))?;
        return Ok(Some(Box::new(query)));
    }

    highlight_terms.extend(tokens.iter().map(|(t, _)| t.clone()));
    if tokens.len() == 1 {
        let term = Term::from_field_text(field, &tokens[0].0);
        Ok(Some(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))))
    } else {
        let terms: Vec<Term> =
            tokens.iter().map(|(t, _)| Term::from_field_text(field, t)).collect();
        Ok(Some(Box::new(PhraseQuery::new(terms))))
    }
}

fn phrase_query(
    index: &SearchIndex,
    field: Field,
    analyzer: &str,
    text: &str,
    highlight_terms: &mut Vec<String>,
) -> Option<Box<dyn Query>> {
    let tokens = analyzers::analyze(index.tantivy(), analyzer, text);
    match tokens.len() {
        0 => None,
        1 => {
            highlight_terms.push(tokens[0].0.clone());
            let term = Term::from_field_text(field, &tokens[0].0);
            Some(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)))
        }
        _ => {
            highlight_terms.extend(tokens.iter().map(|(t, _)| t.clone()));
            let terms: Vec<Term> =
                tokens.iter().map(|(t, _)| Term::from_field_text(field, t)).collect();
            Some(Box::new(PhraseQuery::new(terms)))
        }
    }
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clause_tokenization() {
        assert_eq!(
            tokenize_clauses("cheap \"fancy stay\" lux* name:budget +must -not"),
            vec![
                Clause::Term {
                    field: None,
                    text: "cheap".into(),
                    prefix: false,
                    occur: ClauseOccur::Default
                },
                Clause::Phrase { field: None, text: "fancy stay".into(), occur: ClauseOccur::Default },
                Clause::Term {
                    field: None,
                    text: "lux".into(),
                    prefix: true,
                    occur: ClauseOccur::Default
                },
                Clause::Term {
                    field: Some("name".into()),
                    text: "budget".into(),
                    prefix: false,
                    occur: ClauseOccur::Default
                },
                Clause::Term {
                    field: None,
                    text: "must".into(),
                    prefix: false,
                    occur: ClauseOccur::Must
                },
                Clause::Term {
                    field: None,
                    text: "not".into(),
                    prefix: false,
                    occur: ClauseOccur::MustNot
                },
            ]
        );
    }

    #[test]
    fn lone_star_is_not_a_prefix() {
        assert_eq!(
            tokenize_clauses("*"),
            vec![Clause::Term {
                field: None,
                text: "*".into(),
                prefix: false,
                occur: ClauseOccur::Default
            }]
        );
    }

    #[test]
    fn regex_escaping() {
        assert_eq!(escape_regex("a.b+c"), "a\\.b\\+c");
        assert_eq!(escape_regex("plain"), "plain");
    }
}
