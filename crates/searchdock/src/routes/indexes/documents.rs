use std::collections::HashMap;

use actix_web::web::{self, Data, Json, Path, Query};
use actix_web::HttpResponse;
use searchdock_core::documents::apply_batch;
use searchdock_core::search::project;
use searchdock_types::documents::{DocumentBatch, DocumentBatchResponse};
use searchdock_types::error::{Code, ResponseError};
use serde_json::{Map, Value};

use super::resolve_index;
use super::search::{autocomplete_post, search_get, search_post, suggest_post};
use crate::extractors::authentication::policies::{
    IndexDataContributorPolicy, IndexDataReaderPolicy,
};
use crate::extractors::authentication::GuardedData;
use crate::routes::from_core;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/index").route(web::post().to(index_documents)))
        .service(
            web::resource("/search")
                .route(web::post().to(search_post))
                .route(web::get().to(search_get)),
        )
        .service(web::resource("/suggest").route(web::post().to(suggest_post)))
        .service(web::resource("/autocomplete").route(web::post().to(autocomplete_post)))
        .service(web::resource("/$count").route(web::get().to(count_documents)))
        .service(web::resource("/{key}").route(web::get().to(get_document)));
}

/// `POST /indexes/{name}/docs/index`: the document batch endpoint.
async fn index_documents(
    state: GuardedData<IndexDataContributorPolicy, Data<AppState>>,
    path: Path<String>,
    body: Json<DocumentBatch>,
) -> Result<HttpResponse, ResponseError> {
    let index = resolve_index(&state, &path)?;
    let batch = body.into_inner().value;

    let uploads = batch
        .iter()
        .filter(|action| {
            !matches!(action.action, searchdock_types::documents::IndexActionKind::Delete)
        })
        .count() as u64;
    if index.doc_count() + uploads > state.limits.max_documents_per_index {
        return Err(ResponseError::from_msg(
            format!(
                "Index `{}` is limited to {} documents.",
                index.name(),
                state.limits.max_documents_per_index
            ),
            Code::OperationNotAllowed,
        ));
    }

    let results = apply_batch(&index, batch).map_err(from_core)?;
    let any_succeeded = results.iter().any(|result| result.status);
    let response = DocumentBatchResponse { value: results };
    if any_succeeded {
        Ok(HttpResponse::Ok().json(response))
    } else {
        Ok(HttpResponse::MultiStatus().json(response))
    }
}

/// `GET /indexes/{name}/docs/$count`, returned as a bare integer.
async fn count_documents(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    let index = resolve_index(&state, &path)?;
    Ok(HttpResponse::Ok().content_type("text/plain").body(index.doc_count().to_string()))
}

/// `GET /indexes/{name}/docs/{key}?$select=…`
async fn get_document(
    state: GuardedData<IndexDataReaderPolicy, Data<AppState>>,
    path: Path<(String, String)>,
    query: Query<HashMap<String, String>>,
) -> Result<HttpResponse, ResponseError> {
    let (index_name, key) = path.into_inner();
    let index = resolve_index(&state, &index_name)?;

    let Some(document) = index.get_document(&key) else {
        return Err(ResponseError::from_msg(
            format!("Document with key `{key}` was not found."),
            Code::ResourceNotFound,
        )
        .with_target(key));
    };

    let select: Option<Vec<String>> = query
        .get("$select")
        .map(|s| s.split(',').map(|part| part.trim().to_string()).collect());
    let projected: Map<String, Value> =
        project(index.definition(), &document, select.as_deref());
    Ok(HttpResponse::Ok().json(Value::Object(projected)))
}
