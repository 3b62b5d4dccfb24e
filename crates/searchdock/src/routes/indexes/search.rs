//! The query surface: search (POST and GET), suggest and autocomplete wire
//! types and their translation onto the query engine.

use actix_web::web::{Data, Json, Path, Query};
use actix_web::HttpResponse;
use searchdock_core::search::{
    self, AutocompleteMode, QueryType, SearchMode, SearchRequest, VectorQuery,
};
use searchdock_core::SearchOutcome;
use searchdock_types::error::{Code, ResponseError};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::resolve_index;
use crate::extractors::authentication::policies::IndexDataReaderPolicy;
use crate::extractors::authentication::GuardedData;
use crate::routes::from_core;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequestBody {
    pub search: Option<String>,
    pub query_type: Option<String>,
    pub search_mode: Option<String>,
    pub search_fields: Option<String>,
    pub select: Option<String>,
    pub filter: Option<String>,
    #[serde(alias = "orderBy")]
    pub orderby: Option<String>,
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub count: Option<bool>,
    pub facets: Option<Vec<String>>,
    pub highlight: Option<String>,
    pub highlight_pre_tag: Option<String>,
    pub highlight_post_tag: Option<String>,
    pub vector_queries: Option<Vec<VectorQueryBody>>,
    pub debug: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorQueryBody {
    #[serde(default)]
    pub kind: Option<String>,
    pub vector: Vec<f32>,
    pub fields: String,
    #[serde(default)]
    pub k: Option<usize>,
}

const DEFAULT_VECTOR_K: usize = 50;

fn comma_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

impl SearchRequestBody {
    fn into_engine_request(self) -> Result<SearchRequest, ResponseError> {
        let query_type = match self.query_type.as_deref() {
            None | Some("simple") => QueryType::Simple,
            Some("full") => QueryType::Full,
            Some(other) => {
                return Err(ResponseError::from_msg(
                    format!("`{other}` is not a valid queryType. Expected `simple` or `full`."),
                    Code::InvalidArgument,
                ))
            }
        };
        let search_mode = match self.search_mode.as_deref() {
            None | Some("any") => SearchMode::Any,
            Some("all") => SearchMode::All,
            Some(other) => {
                return Err(ResponseError::from_msg(
                    format!("`{other}` is not a valid searchMode. Expected `any` or `all`."),
                    Code::InvalidArgument,
                ))
            }
        };
        let debug = match &self.debug {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => s != "disabled",
            Some(_) => true,
        };

        Ok(SearchRequest {
            search: self.search,
            query_type,
            search_mode,
            search_fields: self.search_fields.as_deref().map(comma_list),
            select: self.select.as_deref().map(comma_list),
            filter: self.filter,
            order_by: self.orderby,
            top: self.top,
            skip: self.skip.unwrap_or(0),
            count: self.count.unwrap_or(false),
            facets: self.facets.unwrap_or_default(),
            highlight: self.highlight,
            highlight_pre_tag: self.highlight_pre_tag,
            highlight_post_tag: self.highlight_post_tag,
            vector_queries: self
                .vector_queries
                .unwrap_or_default()
                .into_iter()
                .map(|vq| VectorQuery {
                    vector: vq.vector,
                    fields: vq.fields,
                    k: vq.k.unwrap_or(DEFAULT_VECTOR_K),
                })
                .collect(),
            debug,
        })
    }
}

fn outcome_to_wire(outcome: SearchOutcome) -> Value {
    let mut body = Map::new();
    if let Some(count) = outcome.count {
        body.insert("@odata.count".to_string(), json!(count));
    }
    if let Some(facets) = outcome.facets {
        body.insert("@search.facets".to_string(), Value::Object(facets));
    }
    let hits: Vec<Value> = outcome
        .hits
        .into_iter()
        .map(|hit| {
            let mut object = Map::new();
            object.insert("@search.score".to_string(), json!(hit.score));
            if let Some(highlights) = hit.highlights {
                object.insert("@search.highlights".to_string(), Value::Object(highlights));
            }
            if let Some(debug) = hit.debug {
                object.insert("@search.documentDebugInfo".to_string(), debug);
            }
            object.extend(hit.document);
            Value::Object(object)
        })
        .collect();
    body.insert("value".to_string(), json!(hits));
    Value::Object(body)
}

fn run_search(
    state: &AppState,
    index_name: &str,
    request: SearchRequest,
) -> Result<HttpResponse, ResponseError> {
    let index = resolve_index(state, index_name)?;
    let lookup = state.synonym_lookup();
    let outcome = search::execute(&index, &request, &lookup, &state.search_options)
        .map_err(from_core)?;
    Ok(HttpResponse::Ok().json(outcome_to_wire(outcome)))
}

pub async fn search_post(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<String>,
    body: Json<SearchRequestBody>,
) -> Result<HttpResponse, ResponseError> {
    let request = body.into_inner().into_engine_request()?;
    run_search(&state, &path, request)
}

/// `GET /docs/search`: the `$`-prefixed query parameters map onto the same
/// request as the POST body; `facet` repeats.
pub async fn search_get(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<String>,
    query: Query<Vec<(String, String)>>,
) -> Result<HttpResponse, ResponseError> {
    let mut body = SearchRequestBody::default();
    let mut facets = Vec::new();
    for (name, value) in query.into_inner() {
        match name.as_str() {
            "search" => body.search = Some(value),
            "queryType" => body.query_type = Some(value),
            "searchMode" => body.search_mode = Some(value),
            "searchFields" => body.search_fields = Some(value),
            "$select" => body.select = Some(value),
            "$filter" => body.filter = Some(value),
            "$orderby" => body.orderby = Some(value),
            "$top" => body.top = Some(parse_number(&name, &value)?),
            "$skip" => body.skip = Some(parse_number(&name, &value)?),
            "$count" => body.count = Some(value == "true"),
            "facet" => facets.push(value),
            "highlight" => body.highlight = Some(value),
            "highlightPreTag" => body.highlight_pre_tag = Some(value),
            "highlightPostTag" => body.highlight_post_tag = Some(value),
            "api-version" | "debug" => {}
            _ => {}
        }
    }
    if !facets.is_empty() {
        body.facets = Some(facets);
    }
    let request = body.into_engine_request()?;
    run_search(&state, &path, request)
}

fn parse_number(name: &str, value: &str) -> Result<usize, ResponseError> {
    value.parse().map_err(|_| {
        ResponseError::from_msg(
            format!("`{value}` is not a valid value for `{name}`."),
            Code::InvalidArgument,
        )
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequestBody {
    pub search: String,
    pub suggester_name: String,
    pub select: Option<String>,
    pub top: Option<usize>,
}

pub async fn suggest_post(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<String>,
    body: Json<SuggestRequestBody>,
) -> Result<HttpResponse, ResponseError> {
    let index = resolve_index(&state, &path)?;
    let body = body.into_inner();
    let top = body.top.unwrap_or(search::suggest::DEFAULT_SUGGEST_TOP);

    let hits = search::suggest::suggest(&index, &body.suggester_name, &body.search, top)
        .map_err(from_core)?;
    // suggestions default to the key field only
    let select: Vec<String> = body
        .select
        .as_deref()
        .map(comma_list)
        .unwrap_or_else(|| vec![index.definition().key_field().name.clone()]);

    let mut value = Vec::with_capacity(hits.len());
    for (key, text) in hits {
        let mut object = Map::new();
        object.insert("@search.text".to_string(), json!(text));
        if let Some(document) = index.get_document(&key) {
            let mut projected =
                search::project(index.definition(), &document, Some(select.as_slice()));
            object.append(&mut projected);
        }
        value.push(Value::Object(object));
    }
    Ok(HttpResponse::Ok().json(json!({ "value": value })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteRequestBody {
    pub search: String,
    pub suggester_name: String,
    pub autocomplete_mode: Option<String>,
    pub top: Option<usize>,
}

pub async fn autocomplete_post(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<String>,
    body: Json<AutocompleteRequestBody>,
) -> Result<HttpResponse, ResponseError> {
    let index = resolve_index(&state, &path)?;
    let body = body.into_inner();
    let mode = match body.autocomplete_mode.as_deref() {
        None | Some("oneTerm") => AutocompleteMode::OneTerm,
        Some("twoTerms") => AutocompleteMode::TwoTerms,
        Some(other) => {
            return Err(ResponseError::from_msg(
                format!(
                    "`{other}` is not a valid autocompleteMode. Expected `oneTerm` or `twoTerms`."
                ),
                Code::InvalidArgument,
            ))
        }
    };
    let top = body.top.unwrap_or(search::suggest::DEFAULT_SUGGEST_TOP);

    let completions =
        search::suggest::autocomplete(&index, &body.suggester_name, &body.search, mode, top)
            .map_err(from_core)?;
    let value: Vec<Value> = completions
        .into_iter()
        .map(|(text, query_plus_text)| json!({ "text": text, "queryPlusText": query_plus_text }))
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "value": value })))
}
