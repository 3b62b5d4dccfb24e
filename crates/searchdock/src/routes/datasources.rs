use actix_web::web::{self, Data, Json, Path};
use actix_web::HttpResponse;
use searchdock_types::data_source::DataSourceDefinition;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::ResourceKind;

use super::{already_exists, definition_view, validate_name, DefinitionStore};
use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_data_sources))
            .route(web::post().to(create_data_source)),
    )
    .service(
        web::resource("/{name}")
            .route(web::get().to(get_data_source))
            .route(web::put().to(upsert_data_source))
            .route(web::delete().to(delete_data_source)),
    );
}

fn definitions(state: &AppState) -> DefinitionStore<'_> {
    DefinitionStore { state, kind: ResourceKind::DataSource, label: "Data source" }
}

fn validate(definition: &DataSourceDefinition) -> Result<(), ResponseError> {
    validate_name(&definition.name)?;
    if definition.credentials.connection_string.is_none()
        && definition.credentials.identity.is_none()
    {
        return Err(ResponseError::from_msg(
            "A data source needs either a connection string or an identity reference.".to_string(),
            Code::InvalidArgument,
        ));
    }
    Ok(())
}

async fn list_data_sources(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).list::<DataSourceDefinition>()
}

async fn create_data_source(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    body: Json<DataSourceDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    validate(&definition)?;
    let store = definitions(&state);
    if store.exists(&definition.name)? {
        return Err(already_exists("Data source", &definition.name));
    }
    let etag = store.put(&definition.name, &definition)?;
    Ok(HttpResponse::Created().json(definition_view(&definition, etag)?))
}

async fn get_data_source(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).get::<DataSourceDefinition>(&name)
}

async fn upsert_data_source(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
    body: Json<DataSourceDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    if definition.name != *name {
        return Err(ResponseError::from_msg(
            format!(
                "The data source name in the body (`{}`) does not match the URL (`{}`).",
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

async fn delete_data_source(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).delete(&name)?;
    Ok(HttpResponse::NoContent().finish())
}
