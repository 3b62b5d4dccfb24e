mod common;

use actix_web::http::StatusCode;
use common::{hotels_schema, new_service, seed_hotels, QUERY_KEY};
use serde_json::json;

#[actix_rt::test]
async fn health_is_public() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir).with_api_key(None);
    let (status, body) = service.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
}

#[actix_rt::test]
async fn index_crud_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);

    let (status, body) = service.post("/indexes", hotels_schema()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], json!("hotels"));
    assert!(body["@odata.etag"].is_string());

    // create again conflicts
    let (status, body) = service.post("/indexes", hotels_schema()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("ResourceAlreadyExists"));

    let (status, body) = service.get("/indexes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"].as_array().unwrap().len(), 1);

    let (status, body) = service.get("/indexes/hotels").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fields"].as_array().unwrap().len(), 3);

    let (status, _) = service.delete("/indexes/hotels").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = service.get("/indexes/hotels").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("ResourceNotFound"));
}

#[actix_rt::test]
async fn invalid_schema_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);

    // two key fields
    let (status, body) = service
        .post(
            "/indexes",
            json!({
                "name": "bad",
                "fields": [
                    { "name": "a", "type": "Edm.String", "key": true },
                    { "name": "b", "type": "Edm.String", "key": true }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidArgument"));

    // vector field without profile
    let (status, _) = service
        .post(
            "/indexes",
            json!({
                "name": "bad",
                "fields": [
                    { "name": "id", "type": "Edm.String", "key": true },
                    { "name": "vec", "type": "Collection(Edm.Single)", "dimensions": 4 }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // malformed body renders the wire error shape too
    let (status, body) = service.post("/indexes", json!([1, 2, 3])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidArgument"));
}

#[actix_rt::test]
async fn index_stats_reports_documents() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service.get("/indexes/hotels/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documentCount"], json!(5));
    assert!(body["storageSize"].as_u64().unwrap() > 0);
}

#[actix_rt::test]
async fn missing_credentials_are_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let anonymous = service.with_api_key(None);
    let (status, body) = anonymous.get("/indexes").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("InvalidApiKey"));
}

#[actix_rt::test]
async fn query_key_cannot_manage_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let reader = service.with_api_key(Some(QUERY_KEY));
    // reading documents is allowed
    let (status, _) = reader.post("/indexes/hotels/docs/search", json!({ "search": "*" })).await;
    assert_eq!(status, StatusCode::OK);
    // the control plane is not
    let (status, body) = reader.get("/indexes").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], json!("Forbidden"));
    // neither are document writes
    let (status, _) =
        reader.post("/indexes/hotels/docs/index", common::hotels_documents()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn wrong_api_key_fails_even_with_valid_bearer() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    // simulated bearer alone works
    let simulated = service.with_bearer("simulated");
    let (status, _) = simulated.get("/indexes").await;
    assert_eq!(status, StatusCode::OK);

    // with a wrong api-key also present, the api-key handler wins and fails
    let mut both = service.with_api_key(Some("wrong-key"));
    both.bearer = Some("simulated".to_string());
    let (status, body) = both.get("/indexes").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("InvalidApiKey"));
}

#[actix_rt::test]
async fn simulated_access_levels_are_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let reader = service.with_bearer("simulated:indexDataReader");
    let (status, _) = reader.post("/indexes/hotels/docs/search", json!({ "search": "*" })).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = reader.get("/indexes").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn service_stats_counts_resources() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service.get("/servicestats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counters"]["indexesCount"]["usage"], json!(1));
    assert_eq!(body["counters"]["documentCount"]["usage"], json!(5));
    assert!(body["limits"]["maxFieldsPerIndex"].as_u64().is_some());
}

#[actix_rt::test]
async fn definitions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let service = new_service(&dir);
        seed_hotels(&service).await;
    }
    // a fresh service over the same data directory sees the index and docs
    let service = new_service(&dir);
    let (status, body) = service.get("/indexes/hotels").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("hotels"));
    let (_, count) = service.get("/indexes/hotels/docs/$count").await;
    assert_eq!(count, json!(5));
}
