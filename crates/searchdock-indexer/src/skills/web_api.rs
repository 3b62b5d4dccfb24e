//! The custom web-API skill: records batch across context bindings and POST
//! to the configured endpoint as `{"values": [{recordId, data}]}`. Failures
//! become per-record warnings, never pipeline aborts.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use searchdock_types::indexer::parse_iso8601_duration;
use searchdock_types::skillset::{Skill, SkillKind};
use serde_json::{json, Map, Value};

use super::{resolve_input, write_outputs};
use crate::enriched::EnrichedDocument;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_DEGREE_OF_PARALLELISM: usize = 5;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn execute(
    http: &reqwest::Client,
    skill: &Skill,
    doc: &mut EnrichedDocument,
    bindings: &[String],
    warnings: &mut Vec<String>,
) {
    let SkillKind::WebApi {
        uri,
        http_method,
        http_headers,
        timeout,
        batch_size,
        degree_of_parallelism,
    } = &skill.kind
    else {
        return;
    };

    let batch_size = batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
    let parallelism = degree_of_parallelism.unwrap_or(DEFAULT_DEGREE_OF_PARALLELISM).max(1);
    let timeout = timeout
        .as_deref()
        .and_then(|t| parse_iso8601_duration(t).ok())
        .unwrap_or(DEFAULT_TIMEOUT);

    // one record per binding, keyed by its context path
    let mut records = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let mut data = Map::new();
        for input in &skill.inputs {
            match resolve_input(doc, input, binding, skill.context()) {
                Some(value) => {
                    data.insert(input.name.clone(), value);
                }
                None => {
                    data.insert(input.name.clone(), Value::Null);
                }
            }
        }
        records.push(json!({ "recordId": binding, "data": data }));
    }

    let chunks: Vec<Vec<Value>> =
        records.chunks(batch_size).map(|chunk| chunk.to_vec()).collect();

    let responses: Vec<Result<Value, String>> = stream::iter(chunks)
        .map(|chunk| {
            let http = http.clone();
            let uri = uri.clone();
            let method = http_method.clone().unwrap_or_else(|| "POST".to_string());
            let headers = http_headers.clone().unwrap_or_default();
            async move {
                call_endpoint(&http, &uri, &method, &headers, timeout, chunk).await
            }
        })
        .buffer_unordered(parallelism)
        .collect()
        .await;

    // correlate by recordId, then write synchronously
    let mut by_record: BTreeMap<String, Value> = BTreeMap::new();
    for response in responses {
        match response {
            Ok(body) => {
                let values = body
                    .get("values")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for record in values {
                    let Some(record_id) =
                        record.get("recordId").and_then(Value::as_str).map(str::to_string)
                    else {
                        warnings.push(format!(
                            "Skill `{}`: response record without a recordId was ignored.",
                            skill.display_name()
                        ));
                        continue;
                    };
                    if let Some(errors) = record.get("errors").and_then(Value::as_array) {
                        for error in errors {
                            warnings.push(format!(
                                "Skill `{}` record `{record_id}`: {error}.",
                                skill.display_name()
                            ));
                        }
                    }
                    by_record.insert(record_id, record);
                }
            }
            Err(message) => {
                warnings.push(format!("Skill `{}`: {message}", skill.display_name()));
            }
        }
    }

    for binding in bindings {
        let Some(record) = by_record.get(binding) else { continue };
        let Some(data) = record.get("data").and_then(Value::as_object) else { continue };
        write_outputs(skill, doc, binding, data);
    }
}

async fn call_endpoint(
    http: &reqwest::Client,
    uri: &str,
    method: &str,
    headers: &BTreeMap<String, String>,
    timeout: Duration,
    chunk: Vec<Value>,
) -> Result<Value, String> {
    let method: reqwest::Method =
        method.parse().map_err(|_| format!("`{method}` is not a valid HTTP method"))?;
    let mut request = http
        .request(method, uri)
        .timeout(timeout)
        .json(&json!({ "values": chunk }));
    for (name, value) in headers {
        request = request.header(name, value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| format!("call to `{uri}` failed: {e}"))?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("`{uri}` answered {status}; its records were skipped"));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| format!("`{uri}` returned an unreadable body: {e}"))
}
