use actix_web::web::{self, Data, Json, Path};
use actix_web::HttpResponse;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::indexer::{parse_iso8601_duration, IndexerDefinition};
use searchdock_types::ResourceKind;

use super::{already_exists, definition_view, from_indexer, internal, validate_name, DefinitionStore};
use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_indexers))
            .route(web::post().to(create_indexer)),
    )
    .service(
        web::scope("/{name}")
            .service(
                web::resource("")
                    .route(web::get().to(get_indexer))
                    .route(web::put().to(upsert_indexer))
                    .route(web::delete().to(delete_indexer)),
            )
            .service(web::resource("/run").route(web::post().to(run_indexer)))
            .service(web::resource("/status").route(web::get().to(indexer_status)))
            .service(web::resource("/reset").route(web::post().to(reset_indexer))),
    );
}

fn definitions(state: &AppState) -> DefinitionStore<'_> {
    DefinitionStore { state, kind: ResourceKind::Indexer, label: "Indexer" }
}

fn validate(state: &AppState, definition: &IndexerDefinition) -> Result<(), ResponseError> {
    validate_name(&definition.name)?;

    let store = state.store.clone();
    let missing = |kind: ResourceKind, name: &str, label: &str| -> Result<(), ResponseError> {
        match store.exists(kind.as_str(), name).map_err(internal)? {
            true => Ok(()),
            false => Err(ResponseError::from_msg(
                format!("{label} `{name}` referenced by the indexer does not exist."),
                Code::InvalidArgument,
            )),
        }
    };
    missing(ResourceKind::DataSource, &definition.data_source_name, "Data source")?;
    missing(ResourceKind::Index, &definition.target_index_name, "Index")?;
    if let Some(skillset) = &definition.skillset_name {
        missing(ResourceKind::Skillset, skillset, "Skillset")?;
    }

    if let Some(schedule) = &definition.schedule {
        parse_iso8601_duration(&schedule.interval).map_err(ResponseError::from)?;
    }
    Ok(())
}

async fn list_indexers(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).list::<IndexerDefinition>()
}

async fn create_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    body: Json<IndexerDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    validate(&state, &definition)?;
    let store = definitions(&state);
    if store.exists(&definition.name)? {
        return Err(already_exists("Indexer", &definition.name));
    }
    let etag = store.put(&definition.name, &definition)?;
    Ok(HttpResponse::Created().json(definition_view(&definition, etag)?))
}

async fn get_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).get::<IndexerDefinition>(&name)
}

async fn upsert_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
    body: Json<IndexerDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    if definition.name != *name {
        return Err(ResponseError::from_msg(
            format!(
                "The indexer name in the body (`{}`) does not match the URL (`{}`).",
                definition.name, *name
            ),
            Code::InvalidArgument,
        ));
    }
    validate(&state, &definition)?;
    let store = definitions(&state);
    let created = !store.exists(&definition.name)?;
    let etag = store.put(&definition.name, &definition)?;
    let view = definition_view(&definition, etag)?;
    if created {
        Ok(HttpResponse::Created().json(view))
    } else {
        Ok(HttpResponse::Ok().json(view))
    }
}

async fn delete_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).delete(&name)?;
    // run history and tracking state go with the definition
    let _ = state
        .store
        .delete(ResourceKind::IndexerState.as_str(), &name)
        .map_err(internal)?;
    Ok(HttpResponse::NoContent().finish())
}

/// `POST /indexers/{name}/run`: the run executes in the background; a
/// concurrent trigger answers `OperationNotAllowed`.
async fn run_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    state.runtime.trigger(&name).map_err(from_indexer)?;
    Ok(HttpResponse::Accepted().finish())
}

async fn indexer_status(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    let status = state.runtime.status(&name).map_err(from_indexer)?;
    Ok(HttpResponse::Ok().json(status))
}

async fn reset_indexer(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    state.runtime.reset(&name).map_err(from_indexer)?;
    Ok(HttpResponse::NoContent().finish())
}
