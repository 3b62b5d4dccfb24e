//! The end-to-end query scenarios: ordering, filters + facets, vector k-NN,
//! hybrid fusion, paging, suggestions and error shapes.

mod common;

use actix_web::http::StatusCode;
use common::{new_service, seed_hotels};
use serde_json::json;

fn result_ids(body: &serde_json::Value) -> Vec<String> {
    body["value"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["id"].as_str().unwrap().to_string())
        .collect()
}

#[actix_rt::test]
async fn match_all_ordered_by_rating() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/search",
            json!({ "search": "*", "orderby": "rating desc", "top": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&body), vec!["1", "5"]);
    // results carry a score and the retrievable fields
    assert!(body["value"][0]["@search.score"].is_number());
    assert_eq!(body["value"][0]["name"], json!("Fancy Stay"));
}

#[actix_rt::test]
async fn filter_with_facets_and_count() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/search",
            json!({
                "search": "*",
                "filter": "rating ge 4.5",
                "facets": ["rating,interval:1"],
                "count": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["@odata.count"], json!(3));
    assert_eq!(result_ids(&body).len(), 3);

    let buckets = body["@search.facets"]["rating"].as_array().unwrap();
    let total: u64 = buckets.iter().map(|b| b["count"].as_u64().unwrap()).sum();
    assert_eq!(total, 3);
}

#[actix_rt::test]
async fn search_via_get_uses_dollar_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .get("/indexes/hotels/docs/search?search=*&$filter=rating%20ge%204.5&$orderby=rating%20desc&$top=2&$count=true")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["@odata.count"], json!(3));
    assert_eq!(result_ids(&body), vec!["1", "5"]);
}

#[actix_rt::test]
async fn invalid_filter_is_a_filter_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .post("/indexes/hotels/docs/search", json!({ "search": "*", "filter": "rating xx 4" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidFilter"));

    let (status, body) = service
        .post("/indexes/hotels/docs/search", json!({ "search": "*", "filter": "bogus eq 1" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidArgument"));
}

fn vectors_schema() -> serde_json::Value {
    json!({
        "name": "listings",
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true },
            { "name": "desc", "type": "Edm.String", "searchable": true },
            { "name": "vec", "type": "Collection(Edm.Single)", "dimensions": 4,
              "vectorSearchProfile": "default" }
        ],
        "vectorSearch": {
            "algorithms": [
                { "name": "algo", "kind": "hnsw",
                  "hnswParameters": { "m": 8, "efConstruction": 60, "efSearch": 40, "metric": "cosine" } }
            ],
            "profiles": [ { "name": "default", "algorithm": "algo" } ]
        }
    })
}

async fn seed_vectors(service: &common::Service) {
    let (status, _) = service.post("/indexes", vectors_schema()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = service
        .post(
            "/indexes/listings/docs/index",
            json!({
                "value": [
                    { "@search.action": "upload", "id": "A", "desc": "cheap downtown room",
                      "vec": [1.0, 0.0, 0.0, 0.0] },
                    { "@search.action": "upload", "id": "B", "desc": "cheap beach bungalow",
                      "vec": [0.9, 0.1, 0.0, 0.0] },
                    { "@search.action": "upload", "id": "C", "desc": "expensive penthouse",
                      "vec": [0.0, 1.0, 0.0, 0.0] }
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn vector_knn_by_cosine_similarity() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_vectors(&service).await;

    let (status, body) = service
        .post(
            "/indexes/listings/docs/search",
            json!({ "vectorQueries": [ { "vector": [1.0, 0.0, 0.0, 0.0], "fields": "vec", "k": 2 } ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&body), vec!["A", "B"]);
}

#[actix_rt::test]
async fn hybrid_search_fuses_text_and_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_vectors(&service).await;

    let (status, body) = service
        .post(
            "/indexes/listings/docs/search",
            json!({
                "search": "cheap",
                "vectorQueries": [ { "vector": [1.0, 0.0, 0.0, 0.0], "fields": "vec", "k": 3 } ],
                "count": true,
                "debug": true
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    // candidates are the union of both lists
    assert_eq!(body["@odata.count"], json!(3));
    let ids = result_ids(&body);
    // A and B sit in both lists and outrank the vector-only C
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[2], "C");
    let debug = &body["value"][0]["@search.documentDebugInfo"];
    assert!(debug["fused"].is_number());
    assert!(debug["vectors"]["vec"].is_number());
}

#[actix_rt::test]
async fn vector_dimension_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_vectors(&service).await;

    let (status, body) = service
        .post(
            "/indexes/listings/docs/search",
            json!({ "vectorQueries": [ { "vector": [1.0], "fields": "vec", "k": 2 } ] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("InvalidArgument"));
}

#[actix_rt::test]
async fn document_lookup_count_and_select() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (_, count) = service.get("/indexes/hotels/docs/$count").await;
    assert_eq!(count, json!(5));

    let (status, body) = service.get("/indexes/hotels/docs/3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("Harbor View"));

    let (status, body) = service.get("/indexes/hotels/docs/3?$select=rating").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "rating": 4.6 }));

    let (status, body) = service.get("/indexes/hotels/docs/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("ResourceNotFound"));
}

#[actix_rt::test]
async fn partial_batch_failures_are_reported_per_item() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/index",
            json!({
                "value": [
                    { "@search.action": "merge", "id": "1", "rating": 4.9 },
                    { "@search.action": "merge", "id": "ghost", "rating": 1.0 }
                ]
            }),
        )
        .await;
    // at least one item succeeded
    assert_eq!(status, StatusCode::OK);
    let results = body["value"].as_array().unwrap();
    assert_eq!(results[0]["status"], json!(true));
    assert_eq!(results[1]["status"], json!(false));
    assert_eq!(results[1]["statusCode"], json!(404));

    // an all-failed batch answers 207
    let (status, _) = service
        .post(
            "/indexes/hotels/docs/index",
            json!({ "value": [ { "@search.action": "merge", "id": "ghost", "rating": 1.0 } ] }),
        )
        .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
}

#[actix_rt::test]
async fn suggest_and_autocomplete() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);

    let mut schema = common::hotels_schema();
    schema["suggesters"] = json!([
        { "name": "sg", "sourceFields": ["name"] }
    ]);
    let (status, _) = service.post("/indexes", schema).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) =
        service.post("/indexes/hotels/docs/index", common::hotels_documents()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/suggest",
            json!({ "search": "har", "suggesterName": "sg" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> =
        body["value"].as_array().unwrap().iter().map(|v| v["@search.text"].as_str().unwrap()).collect();
    assert!(texts.contains(&"Harbor View"));
    // each suggestion carries the key field
    assert!(body["value"][0]["id"].is_string());

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/autocomplete",
            json!({ "search": "har", "suggesterName": "sg", "autocompleteMode": "oneTerm" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let completions: Vec<&str> =
        body["value"].as_array().unwrap().iter().map(|v| v["text"].as_str().unwrap()).collect();
    assert_eq!(completions, vec!["harbor"]);

    // unknown suggester
    let (status, _) = service
        .post(
            "/indexes/hotels/docs/suggest",
            json!({ "search": "har", "suggesterName": "missing" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn synonym_maps_expand_queries() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);

    let (status, _) = service
        .post(
            "/synonymmaps",
            json!({ "name": "hotel-synonyms", "format": "solr",
                    "synonyms": "inexpensive => budget" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut schema = common::hotels_schema();
    schema["fields"][1]["synonymMaps"] = json!(["hotel-synonyms"]);
    let (status, _) = service.post("/indexes", schema).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) =
        service.post("/indexes/hotels/docs/index", common::hotels_documents()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = service
        .post("/indexes/hotels/docs/search", json!({ "search": "inexpensive" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result_ids(&body), vec!["2"]);
}

#[actix_rt::test]
async fn highlights_wrap_matches_with_custom_tags() {
    let dir = tempfile::tempdir().unwrap();
    let service = new_service(&dir);
    seed_hotels(&service).await;

    let (status, body) = service
        .post(
            "/indexes/hotels/docs/search",
            json!({
                "search": "harbor",
                "highlight": "name",
                "highlightPreTag": "<b>",
                "highlightPostTag": "</b>"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let highlighted = body["value"][0]["@search.highlights"]["name"][0].as_str().unwrap();
    assert!(highlighted.contains("<b>Harbor</b>"));
}
