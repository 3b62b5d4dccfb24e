//! The query engine: text search, filter evaluation, sort, paging, facets,
//! highlighting, vector k-NN and hybrid fusion over one index.

pub mod facets;
pub mod filter;
pub mod highlight;
pub mod hybrid;
pub mod simple;
pub mod sort;
pub mod suggest;

use std::collections::HashSet;

use roaring::RoaringBitmap;
use searchdock_types::index::IndexDefinition;
use serde_json::{json, Map, Value};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;

pub use self::hybrid::{FusionKind, FusionOptions};
use self::hybrid::{FusedHit, ListSource, RankedList};
pub use self::simple::SearchMode;
pub use self::suggest::AutocompleteMode;
use crate::analyzers;
use crate::error::{Error, Result};
use crate::index::SearchIndex;
use crate::synonyms::SynonymRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    #[default]
    Simple,
    Full,
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    /// Comma-separated vector field names; each runs as its own k-NN list.
    pub fields: String,
    pub k: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub search: Option<String>,
    pub query_type: QueryType,
    pub search_mode: SearchMode,
    pub search_fields: Option<Vec<String>>,
    pub select: Option<Vec<String>>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub top: Option<usize>,
    pub skip: usize,
    pub count: bool,
    pub facets: Vec<String>,
    pub highlight: Option<String>,
    pub highlight_pre_tag: Option<String>,
    pub highlight_post_tag: Option<String>,
    pub vector_queries: Vec<VectorQuery>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub fusion: FusionOptions,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { default_page_size: 50, max_page_size: 1000, fusion: FusionOptions::default() }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub key: String,
    pub score: f64,
    pub document: Map<String, Value>,
    pub highlights: Option<Map<String, Value>>,
    pub debug: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub count: Option<u64>,
    pub facets: Option<Map<String, Value>>,
}

pub fn execute(
    index: &SearchIndex,
    request: &SearchRequest,
    synonym_lookup: &dyn Fn(&str) -> Option<SynonymRules>,
    options: &SearchOptions,
) -> Result<SearchOutcome> {
    let definition = index.definition();
    let columns = index.columns().read();

    let filter_set = match request.filter.as_deref() {
        Some(text) => filter::evaluate_filter(definition, &columns, text)?,
        None => None,
    };

    let is_match_all =
        request.search.as_deref().map_or(true, |s| s.trim().is_empty() || s.trim() == "*");

    let mut lists: Vec<RankedList> = Vec::new();
    let mut highlight_terms: Vec<String> = Vec::new();

    if !is_match_all {
        let search_text = request.search.as_deref().unwrap_or_default();
        let fields = simple::target_fields(index, request.search_fields.as_deref())?;
        let mut entries: Vec<(u32, f64)> = Vec::new();

        if !fields.is_empty() && !columns.is_empty() {
            let (query, terms) = match request.query_type {
                QueryType::Simple => {
                    let built = simple::build_simple_query(
                        index,
                        definition,
                        search_text,
                        request.search_mode,
                        &fields,
                        synonym_lookup,
                    )?;
                    (built.query, built.highlight_terms)
                }
                QueryType::Full => {
                    let parser = QueryParser::for_index(
                        index.tantivy(),
                        fields.iter().map(|(_, field, _)| *field).collect(),
                    );
                    let query = parser.parse_query(search_text)?;
                    let mut terms = Vec::new();
                    for (_, _, analyzer) in &fields {
                        for (token, _) in analyzers::analyze(index.tantivy(), analyzer, search_text)
                        {
                            terms.push(token);
                        }
                    }
                    terms.sort();
                    terms.dedup();
                    (query, terms)
                }
            };
            highlight_terms = terms;

            let searcher = index.searcher();
            let limit = (searcher.num_docs() as usize).max(1);
            for (score, address) in searcher.search(&query, &TopDocs::with_limit(limit))? {
                let Some(key) = index.stored_key(&searcher, address)? else { continue };
                let Some(seq) = columns.seq_of(&key) else { continue };
                if filter_set.as_ref().is_some_and(|set| !set.contains(seq)) {
                    continue;
                }
                entries.push((seq, score as f64));
            }
        }
        lists.push(RankedList { source: ListSource::Text, entries });
    }

    let filter_keys: Option<HashSet<String>> = filter_set.as_ref().map(|set| {
        set.iter().filter_map(|seq| columns.key_of(seq).map(str::to_string)).collect()
    });
    for vector_query in &request.vector_queries {
        for field in vector_query.fields.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            let found = index.vectors().search(
                field,
                &vector_query.vector,
                vector_query.k,
                filter_keys.as_ref(),
            )?;
            let entries: Vec<(u32, f64)> = found
                .into_iter()
                .filter_map(|(key, score)| columns.seq_of(&key).map(|seq| (seq, score as f64)))
                .collect();
            lists.push(RankedList { source: ListSource::Vector(field.to_string()), entries });
        }
    }

    // one list keeps its native scores; several fuse
    let ranked: Vec<FusedHit> = match lists.len() {
        0 => {
            let set = match &filter_set {
                Some(set) => set.clone(),
                None => columns.live().clone(),
            };
            set.iter()
                .map(|seq| FusedHit {
                    seq,
                    score: 1.0,
                    text_score: None,
                    vector_scores: Vec::new(),
                })
                .collect()
        }
        1 => lists[0]
            .entries
            .iter()
            .map(|&(seq, score)| FusedHit {
                seq,
                score,
                text_score: matches!(lists[0].source, ListSource::Text).then_some(score),
                vector_scores: match &lists[0].source {
                    ListSource::Vector(field) => vec![(field.clone(), score)],
                    ListSource::Text => Vec::new(),
                },
            })
            .collect(),
        _ => hybrid::fuse(&lists, &options.fusion),
    };

    let match_set: RoaringBitmap = if lists.is_empty() {
        match &filter_set {
            Some(set) => set.clone(),
            None => columns.live().clone(),
        }
    } else {
        lists.iter().flat_map(|list| list.entries.iter().map(|&(seq, _)| seq)).collect()
    };

    let facets = if request.facets.is_empty() {
        None
    } else {
        Some(facets::compute_facets(definition, &columns, &match_set, &request.facets)?)
    };
    let count = request.count.then(|| match_set.len());

    let mut scored: Vec<(u32, f64)> = ranked.iter().map(|hit| (hit.seq, hit.score)).collect();
    if let Some(order_by) = request.order_by.as_deref() {
        let keys = sort::parse_order_by(definition, order_by)?;
        sort::sort_results(&keys, &columns, &mut scored);
    }

    let top = request.top.unwrap_or(options.default_page_size).min(options.max_page_size);
    let page: Vec<(u32, f64)> =
        scored.into_iter().skip(request.skip).take(top).collect();

    let select = parse_select(definition, request.select.as_deref())?;
    let highlight_fields = match request.highlight.as_deref() {
        Some(spec) => highlight::parse_highlight(definition, index, spec)?,
        None => Vec::new(),
    };
    let highlight_options = highlight::HighlightOptions {
        fields: highlight_fields,
        pre_tag: request.highlight_pre_tag.as_deref().unwrap_or("<em>"),
        post_tag: request.highlight_post_tag.as_deref().unwrap_or("</em>"),
    };

    let mut hits = Vec::with_capacity(page.len());
    for (seq, score) in page {
        let Some(document) = columns.document(seq) else { continue };
        let Some(key) = columns.key_of(seq) else { continue };

        let highlights = if highlight_options.fields.is_empty() {
            None
        } else {
            highlight::highlight_document(index, document, &highlight_options, &highlight_terms)
        };

        let debug = request.debug.then(|| {
            let hit = ranked.iter().find(|h| h.seq == seq);
            let vectors: Map<String, Value> = hit
                .map(|h| {
                    h.vector_scores
                        .iter()
                        .map(|(field, score)| (field.clone(), json!(score)))
                        .collect()
                })
                .unwrap_or_default();
            json!({
                "text": hit.and_then(|h| h.text_score),
                "vectors": vectors,
                "fused": score,
            })
        });

        hits.push(SearchHit {
            key: key.to_string(),
            score,
            document: project(definition, document, select.as_deref()),
            highlights,
            debug,
        });
    }

    Ok(SearchOutcome { hits, count, facets })
}

/// Validate and normalize the `select` list; `None` keeps the default of
/// every retrievable field and `*` selects everything retrievable too.
fn parse_select(
    definition: &IndexDefinition,
    select: Option<&[String]>,
) -> Result<Option<Vec<String>>> {
    let Some(select) = select else { return Ok(None) };
    let mut paths = Vec::new();
    for raw in select.iter().flat_map(|s| s.split(',')) {
        let path = raw.trim();
        if path.is_empty() {
            continue;
        }
        if path == "*" {
            return Ok(None);
        }
        let field = filter::resolve_field(definition, path)
            .ok_or_else(|| Error::UnknownField(path.to_string(), definition.name.clone()))?;
        if !field.retrievable {
            return Err(Error::InvalidArgument(format!(
                "Field `{path}` is not retrievable and cannot be selected."
            )));
        }
        paths.push(path.to_string());
    }
    Ok(Some(paths))
}

/// Project a stored document: the selected paths, or every retrievable
/// field when no selection is given.
pub fn project(
    definition: &IndexDefinition,
    document: &Map<String, Value>,
    select: Option<&[String]>,
) -> Map<String, Value> {
    match select {
        None => {
            let mut out = Map::new();
            for field in &definition.fields {
                if !field.retrievable {
                    continue;
                }
                if let Some(value) = document.get(&field.name) {
                    out.insert(field.name.clone(), value.clone());
                }
            }
            out
        }
        Some(paths) => {
            let mut out = Map::new();
            for path in paths {
                match path.split_once('/') {
                    None => {
                        if let Some(value) = document.get(path) {
                            out.insert(path.clone(), value.clone());
                        }
                    }
                    Some((top, rest)) => {
                        let Some(sub_value) =
                            document.get(top).and_then(|v| value_at(v, rest))
                        else {
                            continue;
                        };
                        let entry = out
                            .entry(top.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if let Some(object) = entry.as_object_mut() {
                            insert_at(object, rest, sub_value);
                        }
                    }
                }
            }
            out
        }
    }
}

fn value_at(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for part in path.split('/') {
        current = current.as_object()?.get(part)?;
    }
    Some(current.clone())
}

fn insert_at(object: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('/') {
        None => {
            object.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry =
                object.entry(head.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if let Some(inner) = entry.as_object_mut() {
                insert_at(inner, rest, value);
            }
        }
    }
}
