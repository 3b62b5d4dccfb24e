//! The embedding skill: POST `{input, dimensions?}` per binding to the
//! configured endpoint and write the returned float vector.

use std::time::Duration;

use searchdock_types::skillset::{Skill, SkillKind};
use serde_json::{json, Map, Value};

use super::{missing_input, resolve_named_input, write_outputs};
use crate::enriched::EnrichedDocument;

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn execute(
    http: &reqwest::Client,
    skill: &Skill,
    doc: &mut EnrichedDocument,
    bindings: &[String],
    warnings: &mut Vec<String>,
) {
    let SkillKind::AzureOpenAiEmbedding { resource_uri, deployment_id, api_key, dimensions, .. } =
        &skill.kind
    else {
        return;
    };

    let mut produced: Vec<(String, Value)> = Vec::new();
    for binding in bindings {
        let Some(text) =
            resolve_named_input(skill, doc, binding, "text").and_then(|v| match v {
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
        else {
            warnings.push(missing_input(skill, "text"));
            continue;
        };

        let mut body = json!({ "input": text });
        if let Some(dimensions) = dimensions {
            body["dimensions"] = json!(dimensions);
        }
        if let Some(deployment_id) = deployment_id {
            body["model"] = json!(deployment_id);
        }

        let mut request =
            http.post(resource_uri).timeout(EMBEDDING_TIMEOUT).json(&body);
        if let Some(api_key) = api_key {
            request = request.header("api-key", api_key);
        }

        let vector = match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Value>().await {
                    Ok(body) => extract_embedding(&body),
                    Err(e) => {
                        warnings.push(format!(
                            "Skill `{}`: unreadable embedding response: {e}.",
                            skill.display_name()
                        ));
                        None
                    }
                }
            }
            Ok(response) => {
                warnings.push(format!(
                    "Skill `{}`: embedding endpoint answered {}.",
                    skill.display_name(),
                    response.status()
                ));
                None
            }
            Err(e) => {
                warnings.push(format!(
                    "Skill `{}`: embedding call failed: {e}.",
                    skill.display_name()
                ));
                None
            }
        };

        if let Some(vector) = vector {
            produced.push((binding.clone(), vector));
        }
    }

    for (binding, vector) in produced {
        let mut outputs = Map::new();
        outputs.insert("embedding".to_string(), vector);
        write_outputs(skill, doc, &binding, &outputs);
    }
}

/// Accept both the raw `{"embedding": […]}` shape and the OpenAI-style
/// `{"data": [{"embedding": […]}]}` envelope.
fn extract_embedding(body: &Value) -> Option<Value> {
    if let Some(embedding) = body.get("embedding") {
        return Some(embedding.clone());
    }
    body.get("data")?.as_array()?.first()?.get("embedding").cloned()
}
