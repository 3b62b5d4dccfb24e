use actix_web::web::{self, Data};
use actix_web::HttpResponse;
use searchdock_types::error::{Code, ErrorCode, ResponseError};
use searchdock_types::index::is_valid_resource_name;
use searchdock_types::ResourceKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub mod datasources;
pub mod indexers;
pub mod indexes;
pub mod skillsets;
pub mod synonym_maps;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(get_health)))
        .service(web::resource("/servicestats").route(web::get().to(get_service_stats)))
        .service(web::scope("/indexes").configure(indexes::configure))
        .service(web::scope("/datasources").configure(datasources::configure))
        .service(web::scope("/skillsets").configure(skillsets::configure))
        .service(web::scope("/indexers").configure(indexers::configure))
        .service(web::scope("/synonymmaps").configure(synonym_maps::configure));
}

/// Liveness; deliberately public.
async fn get_health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "healthy" }))
}

async fn get_service_stats(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    let counter = |kind: ResourceKind, quota: Value| -> Result<Value, ResponseError> {
        let usage = state.store.count(kind.as_str()).map_err(internal)?;
        Ok(json!({ "usage": usage, "quota": quota }))
    };

    let body = json!({
        "counters": {
            "indexesCount": counter(ResourceKind::Index, json!(state.limits.max_indexes))?,
            "documentCount": {
                "usage": state.indexes.total_documents(),
                "quota": state.limits.max_documents_per_index,
            },
            "dataSourcesCount": counter(ResourceKind::DataSource, Value::Null)?,
            "indexersCount": counter(ResourceKind::Indexer, Value::Null)?,
            "skillsetCount": counter(ResourceKind::Skillset, Value::Null)?,
            "synonymMaps": counter(ResourceKind::SynonymMap, Value::Null)?,
        },
        "limits": {
            "maxIndexes": state.limits.max_indexes,
            "maxFieldsPerIndex": state.limits.max_fields_per_index,
            "maxDocumentsPerIndex": state.limits.max_documents_per_index,
        }
    });
    Ok(HttpResponse::Ok().json(body))
}

pub(crate) fn internal(error: impl std::error::Error) -> ResponseError {
    ResponseError::from_msg(error.to_string(), Code::InternalServerError)
}

pub(crate) fn from_core(error: searchdock_core::Error) -> ResponseError {
    let code = error.error_code();
    ResponseError::from_msg(error.to_string(), code)
}

pub(crate) fn from_indexer(error: searchdock_indexer::Error) -> ResponseError {
    let code = error.error_code();
    ResponseError::from_msg(error.to_string(), code)
}

pub(crate) fn not_found(kind: &str, name: &str) -> ResponseError {
    ResponseError::from_msg(format!("{kind} `{name}` was not found."), Code::ResourceNotFound)
        .with_target(name)
}

pub(crate) fn validate_name(name: &str) -> Result<(), ResponseError> {
    if is_valid_resource_name(name) {
        Ok(())
    } else {
        Err(ResponseError::from_msg(
            format!(
                "`{name}` is not a valid resource name. Names must match `[a-z][a-z0-9-]{{0,127}}`."
            ),
            Code::InvalidArgument,
        ))
    }
}

fn etag_value(etag: u64) -> Value {
    json!(format!("\"0x{etag:016X}\""))
}

/// Serialize a definition with its `@odata.etag`.
pub(crate) fn definition_view<T: Serialize>(definition: &T, etag: u64) -> Result<Value, ResponseError> {
    let mut view = serde_json::to_value(definition).map_err(internal)?;
    if let Some(object) = view.as_object_mut() {
        object.insert("@odata.etag".to_string(), etag_value(etag));
    }
    Ok(view)
}

/// Shared CRUD plumbing for definition collections backed by the metadata
/// store.
pub(crate) struct DefinitionStore<'a> {
    pub state: &'a AppState,
    pub kind: ResourceKind,
    pub label: &'static str,
}

impl DefinitionStore<'_> {
    pub fn list<T: DeserializeOwned + Serialize>(&self) -> Result<HttpResponse, ResponseError> {
        let mut value = Vec::new();
        for entry in self.state.store.list(self.kind.as_str()).map_err(internal)? {
            let definition: T = serde_json::from_slice(&entry.data).map_err(internal)?;
            value.push(definition_view(&definition, entry.etag)?);
        }
        Ok(HttpResponse::Ok().json(json!({ "value": value })))
    }

    pub fn get<T: DeserializeOwned + Serialize>(
        &self,
        name: &str,
    ) -> Result<HttpResponse, ResponseError> {
        let entry = self
            .state
            .store
            .get(self.kind.as_str(), name)
            .map_err(internal)?
            .ok_or_else(|| not_found(self.label, name))?;
        let definition: T = serde_json::from_slice(&entry.data).map_err(internal)?;
        Ok(HttpResponse::Ok().json(definition_view(&definition, entry.etag)?))
    }

    pub fn exists(&self, name: &str) -> Result<bool, ResponseError> {
        self.state.store.exists(self.kind.as_str(), name).map_err(internal)
    }

    pub fn put<T: Serialize>(&self, name: &str, definition: &T) -> Result<u64, ResponseError> {
        let bytes = serde_json::to_vec(definition).map_err(internal)?;
        self.state.store.put(self.kind.as_str(), name, &bytes).map_err(internal)
    }

    pub fn delete(&self, name: &str) -> Result<(), ResponseError> {
        let deleted = self.state.store.delete(self.kind.as_str(), name).map_err(internal)?;
        if deleted {
            Ok(())
        } else {
            Err(not_found(self.label, name))
        }
    }
}

/// `POST /{collection}` conflict shape.
pub(crate) fn already_exists(kind: &str, name: &str) -> ResponseError {
    ResponseError::from_msg(
        format!("{kind} `{name}` already exists."),
        Code::ResourceAlreadyExists,
    )
    .with_target(name)
}
