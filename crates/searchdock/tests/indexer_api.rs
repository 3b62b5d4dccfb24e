//! The pull-mode pipeline over HTTP: data source + skillset + indexer CRUD,
//! a full run into a target index, run exclusion and reset.

mod common;

use std::fs;
use std::time::Duration;

use actix_web::http::StatusCode;
use common::{new_service, Service};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn wait_for_completion(service: &Service, name: &str) -> serde_json::Value {
    for _ in 0..300 {
        let (status, body) = service.get(&format!("/indexers/{name}/status")).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != json!("inProgress") && body["lastResult"].is_object() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("indexer `{name}` never completed");
}

fn seed_files(dir: &tempfile::TempDir) -> String {
    let data = dir.path().join("source-data/docs");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("first.txt"), b"alpha bravo charlie delta echo").unwrap();
    fs::write(data.join("second.txt"), b"foxtrot golf hotel india juliet").unwrap();
    dir.path().join("source-data").to_string_lossy().into_owned()
}

async fn create_pipeline(service: &Service, base_dir: &str, skillset: Option<serde_json::Value>) {
    let (status, _) = service
        .post(
            "/indexes",
            json!({
                "name": "tgt",
                "fields": [
                    { "name": "id", "type": "Edm.String", "key": true },
                    { "name": "content", "type": "Edm.String", "searchable": true },
                    { "name": "chunks", "type": "Collection(Edm.String)" }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = service
        .post(
            "/datasources",
            json!({
                "name": "docs-source",
                "type": "filesystem",
                "credentials": { "connectionString": base_dir },
                "container": { "name": "docs", "query": "*.txt" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let skillset_name = match skillset {
        Some(skills) => {
            let (status, _) = service.post("/skillsets", skills).await;
            assert_eq!(status, StatusCode::CREATED);
            Some("my-skills")
        }
        None => None,
    };

    let mut indexer = json!({
        "name": "my",
        "dataSourceName": "docs-source",
        "targetIndexName": "tgt",
        "fieldMappings": [
            { "sourceFieldName": "metadata_storage_path", "targetFieldName": "id",
              "mappingFunction": { "name": "base64Encode" } }
        ],
        "outputFieldMappings": [
            { "sourceFieldName": "/document/chunks", "targetFieldName": "chunks" }
        ]
    });
    if let Some(name) = skillset_name {
        indexer["skillsetName"] = json!(name);
    }
    let (status, _) = service.post("/indexers", indexer).await;
    assert_eq!(status, StatusCode::CREATED);
}

fn split_skillset() -> serde_json::Value {
    json!({
        "name": "my-skills",
        "skills": [{
            "@odata.type": "#Microsoft.Skills.Text.SplitSkill",
            "textSplitMode": "pages",
            "maximumPageLength": 12,
            "inputs": [ { "name": "text", "source": "/document/content" } ],
            "outputs": [ { "name": "textItems", "targetName": "chunks" } ]
        }]
    })
}

#[actix_rt::test]
async fn indexer_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    let base = seed_files(&dir);
    create_pipeline(&service, &base, Some(split_skillset())).await;

    let (status, _) = service.post_empty("/indexers/my/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let status_body = wait_for_completion(&service, "my").await;
    assert_eq!(status_body["lastResult"]["status"], json!("success"));
    assert_eq!(status_body["lastResult"]["itemsProcessed"], json!(2));
    assert_eq!(status_body["lastResult"]["itemsFailed"], json!(0));

    let (_, count) = service.get("/indexes/tgt/docs/$count").await;
    assert_eq!(count, json!(2));

    // every indexed document carries a non-empty chunks array
    let (status, body) =
        service.post("/indexes/tgt/docs/search", json!({ "search": "*" })).await;
    assert_eq!(status, StatusCode::OK);
    for hit in body["value"].as_array().unwrap() {
        assert!(!hit["chunks"].as_array().unwrap().is_empty());
    }
}

#[actix_rt::test]
async fn concurrent_run_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    let base = seed_files(&dir);

    // a slow enrichment endpoint keeps the first run in flight
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/enrich"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let values: Vec<serde_json::Value> = body["values"]
                .as_array()
                .unwrap()
                .iter()
                .map(|record| {
                    json!({ "recordId": record["recordId"], "data": { "chunks": ["slow"] } })
                })
                .collect();
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(1500))
                .set_body_json(json!({ "values": values }))
        })
        .mount(&mock)
        .await;

    let skillset = json!({
        "name": "my-skills",
        "skills": [{
            "@odata.type": "#Microsoft.Skills.Custom.WebApiSkill",
            "uri": format!("{}/enrich", mock.uri()),
            "inputs": [ { "name": "text", "source": "/document/content" } ],
            "outputs": [ { "name": "chunks", "targetName": "chunks" } ]
        }]
    });
    create_pipeline(&service, &base, Some(skillset)).await;

    let (status, _) = service.post_empty("/indexers/my/run").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = service.post_empty("/indexers/my/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("OperationNotAllowed"));

    // the first run still completes successfully
    let status_body = wait_for_completion(&service, "my").await;
    assert_eq!(status_body["lastResult"]["status"], json!("success"));
}

#[actix_rt::test]
async fn reset_clears_tracking_state() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    let base = seed_files(&dir);
    create_pipeline(&service, &base, None).await;

    service.post_empty("/indexers/my/run").await;
    wait_for_completion(&service, "my").await;

    // incremental second run sees nothing new
    service.post_empty("/indexers/my/run").await;
    let status_body = wait_for_completion(&service, "my").await;
    assert_eq!(status_body["lastResult"]["itemsProcessed"], json!(0));

    let (status, _) = service.post_empty("/indexers/my/reset").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    service.post_empty("/indexers/my/run").await;
    let status_body = wait_for_completion(&service, "my").await;
    assert_eq!(status_body["lastResult"]["itemsProcessed"], json!(2));
    assert_eq!(status_body["executionHistory"].as_array().unwrap().len(), 3);
}

#[actix_rt::test]
async fn disabled_indexer_cannot_run() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    let base = seed_files(&dir);
    create_pipeline(&service, &base, None).await;

    let (status, mut indexer) = service.get("/indexers/my").await;
    assert_eq!(status, StatusCode::OK);
    indexer["disabled"] = json!(true);
    indexer.as_object_mut().unwrap().remove("@odata.etag");
    let (status, _) = service.put("/indexers/my", indexer).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = service.post_empty("/indexers/my/run").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("OperationNotAllowed"));
}

#[actix_rt::test]
async fn indexer_references_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);

    let (status, body) = service
        .post(
            "/indexers",
            json!({
                "name": "dangling",
                "dataSourceName": "missing-source",
                "targetIndexName": "missing-index"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidArgument"));
}

#[actix_rt::test]
async fn run_status_of_unknown_indexer_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    let (status, body) = service.get("/indexers/ghost/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("ResourceNotFound"));
    let (status, _) = service.post_empty("/indexers/ghost/run").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
