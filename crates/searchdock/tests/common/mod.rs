//! Test harness: a service wrapper that spins the actix app up per request,
//! with credential helpers matching the emulator's auth modes.

use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::test;
use actix_web::web::Data;
use actix_web::App;
use searchdock::{build_auth, configure_app, AppState, Opt};
use searchdock_auth::AuthController;
use serde_json::Value;

pub const ADMIN_KEY: &str = "admin-test-key";
pub const QUERY_KEY: &str = "query-test-key";

pub struct Service {
    pub state: Data<AppState>,
    pub auth: Data<AuthController>,
    pub api_key: Option<String>,
    pub bearer: Option<String>,
}

pub fn test_opt(dir: &tempfile::TempDir) -> Opt {
    Opt {
        data_directory: dir.path().join("data"),
        admin_api_key: Some(ADMIN_KEY.to_string()),
        query_api_key: Some(QUERY_KEY.to_string()),
        ..Opt::default()
    }
}

pub fn new_service(dir: &tempfile::TempDir) -> Service {
    let opt = test_opt(dir);
    let state = Data::new(AppState::new(&opt).expect("app state"));
    let auth = build_auth(&opt);
    Service { state, auth, api_key: Some(ADMIN_KEY.to_string()), bearer: None }
}

impl Service {
    pub fn with_api_key(&self, key: Option<&str>) -> Service {
        Service {
            state: self.state.clone(),
            auth: self.auth.clone(),
            api_key: key.map(str::to_string),
            bearer: None,
        }
    }

    pub fn with_bearer(&self, token: &str) -> Service {
        Service {
            state: self.state.clone(),
            auth: self.auth.clone(),
            api_key: None,
            bearer: Some(token.to_string()),
        }
    }

    async fn request(
        &self,
        method: test::TestRequest,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let app = test::init_service(
            App::new()
                .app_data(self.state.clone())
                .app_data(self.auth.clone())
                .configure(configure_app),
        )
        .await;

        let mut request = method;
        if let Some(key) = &self.api_key {
            request = request.insert_header(("api-key", key.clone()));
        }
        if let Some(bearer) = &self.bearer {
            request = request.insert_header(("Authorization", format!("Bearer {bearer}")));
        }
        if let Some(body) = body {
            request = request.set_json(body);
        }

        let response: ServiceResponse = test::call_service(&app, request.to_request()).await;
        let status = response.status();
        let bytes = test::read_body(response).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request(test::TestRequest::get().uri(path), None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request(test::TestRequest::post().uri(path), Some(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> (StatusCode, Value) {
        self.request(test::TestRequest::post().uri(path), None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.request(test::TestRequest::put().uri(path), Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.request(test::TestRequest::delete().uri(path), None).await
    }
}

/// The hotels index of the end-to-end scenarios.
pub fn hotels_schema() -> Value {
    serde_json::json!({
        "name": "hotels",
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true },
            { "name": "name", "type": "Edm.String", "searchable": true, "filterable": true, "sortable": true },
            { "name": "rating", "type": "Edm.Double", "filterable": true, "sortable": true, "facetable": true }
        ]
    })
}

pub fn hotels_documents() -> Value {
    serde_json::json!({
        "value": [
            { "@search.action": "upload", "id": "1", "name": "Fancy Stay", "rating": 5.0 },
            { "@search.action": "upload", "id": "2", "name": "Budget Inn", "rating": 3.2 },
            { "@search.action": "upload", "id": "3", "name": "Harbor View", "rating": 4.6 },
            { "@search.action": "upload", "id": "4", "name": "Roach Motel", "rating": 1.1 },
            { "@search.action": "upload", "id": "5", "name": "Grand Harbor", "rating": 4.8 }
        ]
    })
}

pub async fn seed_hotels(service: &Service) {
    let (status, _) = service.post("/indexes", hotels_schema()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = service.post("/indexes/hotels/docs/index", hotels_documents()).await;
    assert_eq!(status, StatusCode::OK);
}
