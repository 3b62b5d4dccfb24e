//! End-to-end engine tests: index lifecycle, document batches, text and
//! vector search, hybrid fusion, facets and paging against a disk-backed
//! index.

use searchdock_core::search::{self, SearchRequest, VectorQuery};
use searchdock_core::{documents, IndexManager, SearchOptions, SynonymRules, VectorConfig};
use searchdock_types::documents::DocumentBatch;
use searchdock_types::index::IndexDefinition;
use serde_json::json;

fn hotels_definition() -> IndexDefinition {
    serde_json::from_value(json!({
        "name": "hotels",
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true },
            { "name": "name", "type": "Edm.String", "searchable": true, "filterable": true, "sortable": true },
            { "name": "description", "type": "Edm.String", "searchable": true },
            { "name": "rating", "type": "Edm.Double", "filterable": true, "sortable": true, "facetable": true },
            { "name": "tags", "type": "Collection(Edm.String)", "filterable": true, "facetable": true }
        ]
    }))
    .unwrap()
}

fn hotels_batch() -> DocumentBatch {
    serde_json::from_value(json!({
        "value": [
            { "@search.action": "upload", "id": "1", "name": "Fancy Stay",
              "description": "Luxury hotel with a spa", "rating": 5.0, "tags": ["luxury", "spa"] },
            { "@search.action": "upload", "id": "2", "name": "Budget Inn",
              "description": "Cheap and cheerful motel", "rating": 3.2, "tags": ["budget"] },
            { "@search.action": "upload", "id": "3", "name": "Harbor View",
              "description": "Rooms with a view of the harbor", "rating": 4.6, "tags": ["view"] },
            { "@search.action": "upload", "id": "4", "name": "Roach Motel",
              "description": "A cheap motel you will remember", "rating": 1.1, "tags": ["budget"] },
            { "@search.action": "upload", "id": "5", "name": "Grand Harbor",
              "description": "Grand rooms at the harbor", "rating": 4.8, "tags": ["luxury", "view"] }
        ]
    }))
    .unwrap()
}

fn no_synonyms(_: &str) -> Option<SynonymRules> {
    None
}

fn search_keys(outcome: &searchdock_core::SearchOutcome) -> Vec<&str> {
    outcome.hits.iter().map(|hit| hit.key.as_str()).collect()
}

fn manager(dir: &tempfile::TempDir) -> IndexManager {
    IndexManager::new(dir.path().to_path_buf(), VectorConfig::default())
}

#[test]
fn match_all_with_order_and_top() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("*".to_string()),
        order_by: Some("rating desc".to_string()),
        top: Some(2),
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    assert_eq!(search_keys(&outcome), vec!["1", "5"]);
}

#[test]
fn filter_with_interval_facet_sums_to_match_count() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("*".to_string()),
        filter: Some("rating ge 4.5".to_string()),
        facets: vec!["rating,interval:1".to_string()],
        count: true,
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();

    assert_eq!(outcome.count, Some(3));
    assert_eq!(search_keys(&outcome).len(), 3);
    let buckets = outcome.facets.unwrap()["rating"].as_array().unwrap().clone();
    let total: u64 = buckets.iter().map(|b| b["count"].as_u64().unwrap()).sum();
    assert_eq!(total, 3);
}

#[test]
fn text_search_ranks_and_highlights() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("cheap motel".to_string()),
        highlight: Some("description".to_string()),
        highlight_pre_tag: Some("<b>".to_string()),
        highlight_post_tag: Some("</b>".to_string()),
        count: true,
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();

    // searchMode=any: both cheap-motel docs match
    let keys = search_keys(&outcome);
    assert!(keys.contains(&"2") && keys.contains(&"4"));
    assert_eq!(outcome.count, Some(2));

    let highlighted = outcome
        .hits
        .iter()
        .find(|hit| hit.key == "2")
        .and_then(|hit| hit.highlights.as_ref())
        .expect("doc 2 has highlights");
    let fragment = highlighted["description"].as_array().unwrap()[0].as_str().unwrap();
    assert_eq!(fragment, "<b>Cheap</b> and cheerful <b>motel</b>");
}

#[test]
fn search_mode_all_requires_every_term() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("cheap remember".to_string()),
        search_mode: search::SearchMode::All,
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    assert_eq!(search_keys(&outcome), vec!["4"]);
}

#[test]
fn paging_concatenation_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let page = |top: usize, skip: usize| {
        let request = SearchRequest {
            search: Some("*".to_string()),
            order_by: Some("rating desc".to_string()),
            top: Some(top),
            skip,
            ..Default::default()
        };
        let outcome =
            search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
        outcome.hits.into_iter().map(|hit| hit.key).collect::<Vec<_>>()
    };

    let mut concatenated = page(2, 0);
    concatenated.extend(page(2, 2));
    assert_eq!(concatenated, page(4, 0));
    // paging past the end is empty, not an error
    assert!(page(10, 50).is_empty());
}

#[test]
fn merge_updates_one_field_and_keeps_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let merge: DocumentBatch = serde_json::from_value(json!({
        "value": [
            { "@search.action": "merge", "id": "2", "rating": 3.9 },
            { "@search.action": "merge", "id": "missing", "rating": 1.0 }
        ]
    }))
    .unwrap();
    let results = documents::apply_batch(&index, merge.value).unwrap();
    assert!(results[0].status);
    assert!(!results[1].status);
    assert_eq!(results[1].status_code, 404);

    let document = index.get_document("2").unwrap();
    assert_eq!(document["rating"], json!(3.9));
    assert_eq!(document["name"], json!("Budget Inn"));
    assert_eq!(document["tags"], json!(["budget"]));
}

#[test]
fn upload_is_idempotent_on_the_key() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let replay: DocumentBatch = serde_json::from_value(json!({
        "value": [
            { "@search.action": "merge", "id": "1", "rating": 2.0 },
            { "@search.action": "upload", "id": "1", "name": "Fancy Stay", "rating": 5.0 }
        ]
    }))
    .unwrap();
    documents::apply_batch(&index, replay.value).unwrap();

    let document = index.get_document("1").unwrap();
    assert_eq!(document["rating"], json!(5.0));
    // upload replaced the whole document, dropping unmentioned fields
    assert_eq!(document.get("description"), None);
    assert_eq!(index.doc_count(), 5);
}

#[test]
fn delete_removes_from_text_and_vector_stores() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();
    assert!(index.vectors().contains_key("A"));

    let delete: DocumentBatch = serde_json::from_value(json!({
        "value": [ { "@search.action": "delete", "id": "A" } ]
    }))
    .unwrap();
    documents::apply_batch(&index, delete.value).unwrap();

    assert_eq!(index.doc_count(), 2);
    assert!(index.get_document("A").is_none());
    assert!(!index.vectors().contains_key("A"));
}

fn vectors_definition() -> IndexDefinition {
    serde_json::from_value(json!({
        "name": "vectors",
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true },
            { "name": "desc", "type": "Edm.String", "searchable": true },
            { "name": "category", "type": "Edm.String", "filterable": true },
            { "name": "vec", "type": "Collection(Edm.Single)", "dimensions": 4,
              "vectorSearchProfile": "default" }
        ],
        "vectorSearch": {
            "algorithms": [ { "name": "algo", "kind": "exhaustiveKnn",
                              "exhaustiveKnnParameters": { "metric": "cosine" } } ],
            "profiles": [ { "name": "default", "algorithm": "algo" } ]
        }
    }))
    .unwrap()
}

fn vectors_batch() -> DocumentBatch {
    serde_json::from_value(json!({
        "value": [
            { "@search.action": "upload", "id": "A", "desc": "cheap downtown room",
              "category": "city", "vec": [1.0, 0.0, 0.0, 0.0] },
            { "@search.action": "upload", "id": "B", "desc": "cheap beach bungalow",
              "category": "beach", "vec": [0.9, 0.1, 0.0, 0.0] },
            { "@search.action": "upload", "id": "C", "desc": "expensive penthouse",
              "category": "city", "vec": [0.0, 1.0, 0.0, 0.0] }
        ]
    }))
    .unwrap()
}

#[test]
fn vector_knn_returns_nearest_by_cosine() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();

    let request = SearchRequest {
        vector_queries: vec![VectorQuery {
            vector: vec![1.0, 0.0, 0.0, 0.0],
            fields: "vec".to_string(),
            k: 2,
        }],
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    assert_eq!(search_keys(&outcome), vec!["A", "B"]);
    assert!(outcome.hits[0].score > outcome.hits[1].score);
}

#[test]
fn filtered_vector_search_pre_filters_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();

    let request = SearchRequest {
        filter: Some("category eq 'city'".to_string()),
        vector_queries: vec![VectorQuery {
            vector: vec![1.0, 0.0, 0.0, 0.0],
            fields: "vec".to_string(),
            k: 2,
        }],
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    // B is nearer than C but filtered out
    assert_eq!(search_keys(&outcome), vec!["A", "C"]);
}

#[test]
fn hybrid_rrf_fuses_text_and_vector_lists() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("cheap".to_string()),
        vector_queries: vec![VectorQuery {
            vector: vec![1.0, 0.0, 0.0, 0.0],
            fields: "vec".to_string(),
            k: 3,
        }],
        count: true,
        debug: true,
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();

    // A and B appear in both lists and outrank C (vector-only)
    let keys = search_keys(&outcome);
    assert_eq!(keys.len(), 3);
    assert!(keys[0] == "A" || keys[0] == "B");
    assert_eq!(keys[2], "C");
    // the union of both lists is the candidate set
    assert_eq!(outcome.count, Some(3));
    // debug carries the subscore breakdown
    let debug = outcome.hits[0].debug.as_ref().unwrap();
    assert!(debug["fused"].as_f64().unwrap() > 0.0);
    assert!(debug["vectors"]["vec"].as_f64().is_some());
}

#[test]
fn vector_dimension_mismatch_is_invalid_argument() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();

    let request = SearchRequest {
        vector_queries: vec![VectorQuery {
            vector: vec![1.0, 0.0],
            fields: "vec".to_string(),
            k: 2,
        }],
        ..Default::default()
    };
    let error =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap_err();
    assert!(matches!(error, searchdock_core::Error::VectorDimensionMismatch { .. }));
}

#[test]
fn synonyms_expand_query_terms() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let mut definition = hotels_definition();
    definition
        .fields
        .iter_mut()
        .find(|f| f.name == "description")
        .unwrap()
        .synonym_maps
        .push("hotel-synonyms".to_string());
    let index = manager.open(definition).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let synonyms = |name: &str| {
        (name == "hotel-synonyms").then(|| SynonymRules::parse("inexpensive => cheap"))
    };
    let request =
        SearchRequest { search: Some("inexpensive".to_string()), ..Default::default() };
    let outcome = search::execute(&index, &request, &synonyms, &SearchOptions::default()).unwrap();
    let keys = search_keys(&outcome);
    assert!(keys.contains(&"2") && keys.contains(&"4"));
}

#[test]
fn index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let manager = manager(&dir);
        let index = manager.open(vectors_definition()).unwrap();
        documents::apply_batch(&index, vectors_batch().value).unwrap();
    }
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    assert_eq!(index.doc_count(), 3);

    // text, columns and vectors are all back
    let request = SearchRequest {
        search: Some("cheap".to_string()),
        filter: Some("category eq 'beach'".to_string()),
        vector_queries: vec![VectorQuery {
            vector: vec![1.0, 0.0, 0.0, 0.0],
            fields: "vec".to_string(),
            k: 3,
        }],
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    assert_eq!(search_keys(&outcome), vec!["B"]);
}

#[test]
fn delete_all_clears_text_columns_and_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(vectors_definition()).unwrap();
    documents::apply_batch(&index, vectors_batch().value).unwrap();

    index.delete_all().unwrap();
    assert_eq!(index.doc_count(), 0);
    assert!(!index.vectors().contains_key("A"));

    let request = SearchRequest { search: Some("cheap".to_string()), ..Default::default() };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    assert!(outcome.hits.is_empty());
}

#[test]
fn schema_closure_drops_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();

    let batch: DocumentBatch = serde_json::from_value(json!({
        "value": [
            { "@search.action": "upload", "id": "x", "name": "Extra", "unknown_field": 42 }
        ]
    }))
    .unwrap();
    let results = documents::apply_batch(&index, batch.value).unwrap();
    assert!(results[0].status);
    let document = index.get_document("x").unwrap();
    assert!(!document.contains_key("unknown_field"));
}

#[test]
fn missing_key_fails_per_item_not_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();

    let batch: DocumentBatch = serde_json::from_value(json!({
        "value": [
            { "@search.action": "upload", "name": "No Key" },
            { "@search.action": "upload", "id": "ok", "name": "Has Key" }
        ]
    }))
    .unwrap();
    let results = documents::apply_batch(&index, batch.value).unwrap();
    assert!(!results[0].status);
    assert_eq!(results[0].status_code, 400);
    assert!(results[1].status);
    assert_eq!(index.doc_count(), 1);
}

#[test]
fn select_projects_fields() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);
    let index = manager.open(hotels_definition()).unwrap();
    documents::apply_batch(&index, hotels_batch().value).unwrap();

    let request = SearchRequest {
        search: Some("*".to_string()),
        select: Some(vec!["id".to_string(), "rating".to_string()]),
        top: Some(1),
        ..Default::default()
    };
    let outcome =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap();
    let document = &outcome.hits[0].document;
    assert_eq!(document.keys().collect::<Vec<_>>(), vec!["id", "rating"]);

    let request = SearchRequest {
        search: Some("*".to_string()),
        select: Some(vec!["bogus".to_string()]),
        ..Default::default()
    };
    let error =
        search::execute(&index, &request, &no_synonyms, &SearchOptions::default()).unwrap_err();
    assert!(matches!(error, searchdock_core::Error::UnknownField(..)));
}
