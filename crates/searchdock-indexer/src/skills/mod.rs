//! Skillset execution over the enriched document.
//!
//! Skills run in declaration order; outputs of one skill are visible to the
//! next. A skill that cannot read a required input is skipped with a
//! warning, and failures inside a skill never abort the pipeline: the
//! document is published with whatever enrichments succeeded.

mod embedding;
mod web_api;

use searchdock_types::skillset::{
    InputFieldMapping, Skill, SkillKind, SkillsetDefinition, TextSplitMode,
};
use serde_json::{json, Map, Value};

use crate::enriched::EnrichedDocument;

pub struct SkillExecutor {
    http: reqwest::Client,
}

impl SkillExecutor {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Run every skill of the set; returns the accumulated warnings.
    pub async fn execute(
        &self,
        skillset: &SkillsetDefinition,
        doc: &mut EnrichedDocument,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        for skill in &skillset.skills {
            let bindings = doc.expand(skill.context());
            if bindings.is_empty() {
                warnings.push(format!(
                    "Skill `{}`: context `{}` matched nothing.",
                    skill.display_name(),
                    skill.context()
                ));
                continue;
            }

            match &skill.kind {
                SkillKind::WebApi { .. } => {
                    web_api::execute(&self.http, skill, doc, &bindings, &mut warnings).await;
                }
                SkillKind::AzureOpenAiEmbedding { .. } => {
                    embedding::execute(&self.http, skill, doc, &bindings, &mut warnings).await;
                }
                _ => {
                    for binding in &bindings {
                        run_local_skill(skill, doc, binding, &mut warnings);
                    }
                }
            }
        }
        warnings
    }
}

fn run_local_skill(
    skill: &Skill,
    doc: &mut EnrichedDocument,
    binding: &str,
    warnings: &mut Vec<String>,
) {
    let produced = match &skill.kind {
        SkillKind::TextSplit { text_split_mode, maximum_page_length, page_overlap_length } => {
            let Some(text) = input_string(skill, doc, binding, "text") else {
                warnings.push(missing_input(skill, "text"));
                return;
            };
            let chunks = match text_split_mode {
                TextSplitMode::Pages => split_pages(
                    &text,
                    maximum_page_length.unwrap_or(4000),
                    page_overlap_length.unwrap_or(0),
                ),
                TextSplitMode::Sentences => split_sentences(&text),
            };
            let mut produced = Map::new();
            produced.insert("textItems".to_string(), json!(chunks));
            produced
        }
        SkillKind::TextMerge { insert_pre_tag, insert_post_tag } => {
            let text = input_string(skill, doc, binding, "text").unwrap_or_default();
            let items = resolve_named_input(skill, doc, binding, "itemsToInsert")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            let pre = insert_pre_tag.as_deref().unwrap_or(" ");
            let post = insert_post_tag.as_deref().unwrap_or(" ");
            let mut merged = text;
            for item in items {
                if let Some(item) = item.as_str() {
                    merged.push_str(pre);
                    merged.push_str(item);
                    merged.push_str(post);
                }
            }
            let mut produced = Map::new();
            produced.insert("mergedText".to_string(), json!(merged));
            produced
        }
        SkillKind::Shaper {} => {
            let mut shaped = Map::new();
            for input in &skill.inputs {
                match resolve_input(doc, input, binding, skill.context()) {
                    Some(value) => {
                        shaped.insert(input.name.clone(), value);
                    }
                    None => warnings.push(missing_input(skill, &input.name)),
                }
            }
            let mut produced = Map::new();
            produced.insert("output".to_string(), Value::Object(shaped));
            produced
        }
        SkillKind::Conditional {} => {
            let condition = resolve_named_input(skill, doc, binding, "condition")
                .map(|v| truthy(&v))
                .unwrap_or(false);
            let branch = if condition { "whenTrue" } else { "whenFalse" };
            let value = resolve_named_input(skill, doc, binding, branch).unwrap_or(Value::Null);
            let mut produced = Map::new();
            produced.insert("output".to_string(), value);
            produced
        }
        // remote skills are dispatched before we get here
        SkillKind::WebApi { .. } | SkillKind::AzureOpenAiEmbedding { .. } => return,
    };

    write_outputs(skill, doc, binding, &produced);
}

pub(crate) fn write_outputs(
    skill: &Skill,
    doc: &mut EnrichedDocument,
    binding: &str,
    produced: &Map<String, Value>,
) {
    for output in &skill.outputs {
        if let Some(value) = produced.get(&output.name) {
            doc.set(&format!("{binding}/{}", output.target()), value.clone());
        }
    }
}

pub(crate) fn missing_input(skill: &Skill, input: &str) -> String {
    format!("Skill `{}`: required input `{input}` is missing; skill skipped.", skill.display_name())
}

fn input_string(
    skill: &Skill,
    doc: &EnrichedDocument,
    binding: &str,
    name: &str,
) -> Option<String> {
    resolve_named_input(skill, doc, binding, name)
        .and_then(|v| v.as_str().map(str::to_string))
}

pub(crate) fn resolve_named_input(
    skill: &Skill,
    doc: &EnrichedDocument,
    binding: &str,
    name: &str,
) -> Option<Value> {
    let input = skill.inputs.iter().find(|i| i.name == name)?;
    resolve_input(doc, input, binding, skill.context())
}

/// Resolve one input relative to a concrete context binding. Sources are
/// absolute paths whose wildcards align positionally with the context's;
/// `=`-prefixed sources are inline expressions.
pub(crate) fn resolve_input(
    doc: &EnrichedDocument,
    input: &InputFieldMapping,
    binding: &str,
    context_pattern: &str,
) -> Option<Value> {
    if let Some(source) = &input.source {
        if let Some(expression) = source.strip_prefix('=') {
            return eval_expression(doc, expression.trim(), binding, context_pattern);
        }
        let concrete = align_path(source, context_pattern, binding);
        if concrete.contains('*') {
            let values: Vec<Value> =
                doc.expand(&concrete).iter().filter_map(|path| doc.get(path).cloned()).collect();
            return Some(Value::Array(values));
        }
        return doc.get(&concrete).cloned();
    }

    if !input.inputs.is_empty() {
        // a structured input: expand the source context and shape one
        // object per match
        let contexts = match &input.source_context {
            Some(source_context) => doc.expand(&align_path(source_context, context_pattern, binding)),
            None => vec![binding.to_string()],
        };
        let mut items = Vec::with_capacity(contexts.len());
        for context in &contexts {
            let mut object = Map::new();
            for nested in &input.inputs {
                if let Some(value) = resolve_input(doc, nested, context, context) {
                    object.insert(nested.name.clone(), value);
                }
            }
            items.push(Value::Object(object));
        }
        return match &input.source_context {
            Some(_) => Some(Value::Array(items)),
            None => items.into_iter().next(),
        };
    }

    None
}

/// Substitute the wildcard segments of `source` with the concrete segments
/// the binding chose for the context's wildcards, in order.
fn align_path(source: &str, context_pattern: &str, binding: &str) -> String {
    let pattern: Vec<&str> = context_pattern.split('/').filter(|s| !s.is_empty()).collect();
    let bound: Vec<&str> = binding.split('/').filter(|s| !s.is_empty()).collect();
    let mut replacements = pattern
        .iter()
        .zip(&bound)
        .filter(|(p, _)| **p == "*")
        .map(|(_, b)| *b)
        .collect::<Vec<_>>()
        .into_iter();

    let segments: Vec<String> = source
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if segment == "*" {
                replacements.next().unwrap_or("*").to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// The condition expression subset: `$(path)` substitution with `==` / `!=`
/// against a literal, or a bare `$(path)` for truthiness.
fn eval_expression(
    doc: &EnrichedDocument,
    expression: &str,
    binding: &str,
    context_pattern: &str,
) -> Option<Value> {
    let resolve = |operand: &str| -> Option<Value> {
        let operand = operand.trim();
        if let Some(path) = operand.strip_prefix("$(").and_then(|s| s.strip_suffix(')')) {
            return doc.get(&align_path(path, context_pattern, binding)).cloned();
        }
        if let Some(literal) = operand.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Some(json!(literal));
        }
        match operand {
            "true" => Some(json!(true)),
            "false" => Some(json!(false)),
            "null" => Some(Value::Null),
            number => number.parse::<f64>().ok().map(|n| json!(n)),
        }
    };

    if let Some((left, right)) = expression.split_once("==") {
        return Some(json!(resolve(left) == resolve(right)));
    }
    if let Some((left, right)) = expression.split_once("!=") {
        return Some(json!(resolve(left) != resolve(right)));
    }
    resolve(expression)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Greedy fixed-size chunking with overlap, on char boundaries.
fn split_pages(text: &str, maximum_page_length: usize, overlap: usize) -> Vec<String> {
    let maximum_page_length = maximum_page_length.max(1);
    let overlap = overlap.min(maximum_page_length - 1);
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = maximum_page_length - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + maximum_page_length).min(chars.len());
        chunks.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
