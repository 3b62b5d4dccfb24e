use actix_web::web::{self, Data, Json, Path};
use actix_web::HttpResponse;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::index::IndexDefinition;
use searchdock_types::ResourceKind;
use serde_json::json;
use tracing::debug;

use super::{already_exists, definition_view, from_core, not_found, DefinitionStore};
use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub mod documents;
pub mod search;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_indexes))
            .route(web::post().to(create_index)),
    )
    .service(
        web::scope("/{index_name}")
            .service(
                web::resource("")
                    .route(web::get().to(get_index))
                    .route(web::put().to(upsert_index))
                    .route(web::delete().to(delete_index)),
            )
            .service(web::resource("/stats").route(web::get().to(index_stats)))
            .service(web::scope("/docs").configure(documents::configure)),
    );
}

fn definitions(state: &AppState) -> DefinitionStore<'_> {
    DefinitionStore { state, kind: ResourceKind::Index, label: "Index" }
}

fn validate(state: &AppState, definition: &mut IndexDefinition) -> Result<(), ResponseError> {
    definition
        .validate(state.limits.max_fields_per_index)
        .map_err(ResponseError::from)?;
    definition.normalize();
    Ok(())
}

async fn list_indexes(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).list::<IndexDefinition>()
}

async fn create_index(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    body: Json<IndexDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let mut definition = body.into_inner();
    validate(&state, &mut definition)?;

    let store = definitions(&state);
    if store.exists(&definition.name)? {
        return Err(already_exists("Index", &definition.name));
    }
    if state.indexes.len() >= state.limits.max_indexes {
        return Err(ResponseError::from_msg(
            format!("This service is limited to {} indexes.", state.limits.max_indexes),
            Code::OperationNotAllowed,
        ));
    }

    state.indexes.open(definition.clone()).map_err(from_core)?;
    let etag = store.put(&definition.name, &definition)?;
    debug!(index = %definition.name, "index created");
    Ok(HttpResponse::Created().json(definition_view(&definition, etag)?))
}

async fn get_index(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).get::<IndexDefinition>(&name)
}

async fn upsert_index(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
    body: Json<IndexDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let mut definition = body.into_inner();
    if definition.name != *name {
        return Err(ResponseError::from_msg(
            format!(
                "The index name in the body (`{}`) does not match the URL (`{}`).",
                definition.name, *name
            ),
            Code::InvalidArgument,
        ));
    }
    validate(&state, &mut definition)?;

    let store = definitions(&state);
    let created = !store.exists(&definition.name)?;
    if created {
        if state.indexes.len() >= state.limits.max_indexes {
            return Err(ResponseError::from_msg(
                format!("This service is limited to {} indexes.", state.limits.max_indexes),
                Code::OperationNotAllowed,
            ));
        }
        state.indexes.open(definition.clone()).map_err(from_core)?;
    } else {
        // schema changes rebuild the index and reindex every document
        state.indexes.update(definition.clone()).map_err(from_core)?;
    }

    let etag = store.put(&definition.name, &definition)?;
    let view = definition_view(&definition, etag)?;
    if created {
        Ok(HttpResponse::Created().json(view))
    } else {
        Ok(HttpResponse::Ok().json(view))
    }
}

async fn delete_index(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).delete(&name)?;
    state.indexes.delete(&name).map_err(from_core)?;
    Ok(HttpResponse::NoContent().finish())
}

async fn index_stats(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    let index = state
        .indexes
        .get(&name)
        .map_err(|_| not_found("Index", &name))?;
    Ok(HttpResponse::Ok().json(json!({
        "documentCount": index.doc_count(),
        "storageSize": index.storage_size(),
    })))
}

pub(crate) fn resolve_index(
    state: &AppState,
    name: &str,
) -> Result<std::sync::Arc<searchdock_core::SearchIndex>, ResponseError> {
    state.indexes.get(name).map_err(|_| not_found("Index", name))
}
