use actix_web::web::{self, Data, Json, Path};
use actix_web::HttpResponse;
use searchdock_types::error::{Code, ResponseError};
use searchdock_types::skillset::SkillsetDefinition;
use searchdock_types::ResourceKind;

use super::{already_exists, definition_view, validate_name, DefinitionStore};
use crate::extractors::authentication::policies::ServiceContributorPolicy;
use crate::extractors::authentication::GuardedData;
use crate::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("")
            .route(web::get().to(list_skillsets))
            .route(web::post().to(create_skillset)),
    )
    .service(
        web::resource("/{name}")
            .route(web::get().to(get_skillset))
            .route(web::put().to(upsert_skillset))
            .route(web::delete().to(delete_skillset)),
    );
}

fn definitions(state: &AppState) -> DefinitionStore<'_> {
    DefinitionStore { state, kind: ResourceKind::Skillset, label: "Skillset" }
}

fn validate(definition: &SkillsetDefinition) -> Result<(), ResponseError> {
    validate_name(&definition.name)?;
    if definition.skills.is_empty() {
        return Err(ResponseError::from_msg(
            "A skillset must declare at least one skill.".to_string(),
            Code::InvalidArgument,
        ));
    }
    Ok(())
}

async fn list_skillsets(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).list::<SkillsetDefinition>()
}

async fn create_skillset(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    body: Json<SkillsetDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    validate(&definition)?;
    let store = definitions(&state);
    if store.exists(&definition.name)? {
        return Err(already_exists("Skillset", &definition.name));
    }
    let etag = store.put(&definition.name, &definition)?;
    Ok(HttpResponse::Created().json(definition_view(&definition, etag)?))
}

async fn get_skillset(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).get::<SkillsetDefinition>(&name)
}

async fn upsert_skillset(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
    body: Json<SkillsetDefinition>,
) -> Result<HttpResponse, ResponseError> {
    let definition = body.into_inner();
    if definition.name != *name {
        return Err(ResponseError::from_msg(
            format!(
                "The skillset name in the body (`{}`) does not match the URL (`{}`).",
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

async fn delete_skillset(
    state: GuardedData<ServiceContributorPolicy, Data<AppState>>,
    name: Path<String>,
) -> Result<HttpResponse, ResponseError> {
    definitions(&state).delete(&name)?;
    Ok(HttpResponse::NoContent().finish())
}
