use actix_web::web::{self, Data, Json, Path};
use actix_web::HttpResponse;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::synonym_map::SynonymMapDefinition;
use searchdock_types::ResourceKind;

use super::{already_exists, definition_view, validate_name, DefinitionStore};
use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_synonym_maps))
            .route(web::post().to(create_synonym_map)),
    )
    .service(
        web::resource("/{name}")
            .route(web::get().to(get_synonym_map))
            .route(web::put().to(upsert_synonym_map))
            .route(web::delete().to(delete_synonym_map)),
    );
}

fn definitions(state: &AppState) -> DefinitionStore<'_> {
    DefinitionStore { state, kind: ResourceKind::SynonymMap, label: "Synonym map" }
}

fn validate(definition: &SynonymMapDefinition) -> Result<(), ResponseError> {
    validate_name(&definition.name)?;
    if definition.format != "solr" {
        return Err(ResponseError::from_msg(
            format!("`{}` is not a supported synonym map format; only `solr` is.", definition.format),
            Code::InvalidArgument,
        ));
    }
    Ok(())
}

async fn list_synonym_maps(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).list::<SynonymMapDefinition>()
}

async fn create_synonym_map(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    body: Json<SynonymMapDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    validate(&definition)?;
    let store = definitions(&state);
    if store.exists(&definition.name)? {
        return Err(already_exists("Synonym map", &definition.name));
    }
    let etag = store.put(&definition.name, &definition)?;
    Ok(HttpResponse::Created().json(definition_view(&definition, etag)?))
}

async fn get_synonym_map(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).get::<SynonymMapDefinition>(&name)
}

async fn upsert_synonym_map(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
    body: Json<SynonymMapDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    if definition.name != *name {
        return Err(ResponseError::from_msg(
            format!(
                "The synonym map name in the body (`{}`) does not match the URL (`{}`).",
                definition.name, *name
            ),
            Code::InvalidArgument,
        ));
    }
    validate(&definition)?;
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

async fn delete_synonym_map(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).delete(&name)?;
    Ok(HttpResponse::NoContent().finish())
}
