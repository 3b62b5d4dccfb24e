use serde::{Deserialize, Serialize};

/// An ordered list of skills executed per source document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SkillsetDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub skills: Vec<Skill>,
}

/// The shared envelope of a skill; discriminator-specific fields live in
/// [`SkillKind`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Paths in inputs/outputs resolve relative to this; defaults to `/document`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputFieldMapping>,
    #[serde(default)]
    pub outputs: Vec<OutputFieldMapping>,
    #[serde(flatten)]
    pub kind: SkillKind,
}

impl Skill {
    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or("/document")
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.type_name().to_string())
    }
}

/// `name` is the value exposed to the skill; `source` is a path into the
/// enriched document (or an inline `=`-expression). Nested `inputs` build
/// structured shaper inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputFieldMapping {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputFieldMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputFieldMapping {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl OutputFieldMapping {
    pub fn target(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "@odata.type")]
pub enum SkillKind {
    #[serde(rename = "#Microsoft.Skills.Text.SplitSkill", rename_all = "camelCase")]
    TextSplit {
        #[serde(default)]
        text_split_mode: TextSplitMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum_page_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page_overlap_length: Option<usize>,
    },
    #[serde(rename = "#Microsoft.Skills.Text.MergeSkill", rename_all = "camelCase")]
    TextMerge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_pre_tag: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        insert_post_tag: Option<String>,
    },
    #[serde(rename = "#Microsoft.Skills.Util.ShaperSkill")]
    Shaper {},
    #[serde(rename = "#Microsoft.Skills.Util.ConditionalSkill")]
    Conditional {},
    #[serde(rename = "#Microsoft.Skills.Custom.WebApiSkill", rename_all = "camelCase")]
    WebApi {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        http_method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        http_headers: Option<std::collections::BTreeMap<String, String>>,
        /// ISO-8601 duration, e.g. `PT30S`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        degree_of_parallelism: Option<usize>,
    },
    #[serde(rename = "#Microsoft.Skills.Text.AzureOpenAIEmbeddingSkill", rename_all = "camelCase")]
    AzureOpenAiEmbedding {
        resource_uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deployment_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimensions: Option<usize>,
    },
}

impl SkillKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SkillKind::TextSplit { .. } => "#Microsoft.Skills.Text.SplitSkill",
            SkillKind::TextMerge { .. } => "#Microsoft.Skills.Text.MergeSkill",
            SkillKind::Shaper {} => "#Microsoft.Skills.Util.ShaperSkill",
            SkillKind::Conditional {} => "#Microsoft.Skills.Util.ConditionalSkill",
            SkillKind::WebApi { .. } => "#Microsoft.Skills.Custom.WebApiSkill",
            SkillKind::AzureOpenAiEmbedding { .. } => {
                "#Microsoft.Skills.Text.AzureOpenAIEmbeddingSkill"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextSplitMode {
    #[default]
    Pages,
    Sentences,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn split_skill_deserializes() {
        let skill: Skill = serde_json::from_value(json!({
            "@odata.type": "#Microsoft.Skills.Text.SplitSkill",
            "context": "/document",
            "textSplitMode": "pages",
            "maximumPageLength": 500,
            "inputs": [ { "name": "text", "source": "/document/content" } ],
            "outputs": [ { "name": "textItems", "targetName": "chunks" } ]
        }))
        .unwrap();

        assert_eq!(skill.context(), "/document");
        assert_eq!(skill.outputs[0].target(), "chunks");
        match skill.kind {
            SkillKind::TextSplit { maximum_page_length, .. } => {
                assert_eq!(maximum_page_length, Some(500));
            }
            other => panic!("wrong kind: {other:?}"),
        }
    }

    #[test]
    fn web_api_skill_round_trips() {
        let body = json!({
            "@odata.type": "#Microsoft.Skills.Custom.WebApiSkill",
            "uri": "https://enricher.example/run",
            "batchSize": 4,
            "degreeOfParallelism": 2,
            "inputs": [ { "name": "text", "source": "/document/content" } ],
            "outputs": [ { "name": "sentiment" } ]
        });
        let skill: Skill = serde_json::from_value(body.clone()).unwrap();
        let back = serde_json::to_value(&skill).unwrap();
        assert_eq!(back["@odata.type"], body["@odata.type"]);
        assert_eq!(back["batchSize"], json!(4));
        // output with no targetName writes under its own name
        assert_eq!(skill.outputs[0].target(), "sentiment");
    }

    #[test]
    fn unknown_discriminator_is_an_error() {
        let result: Result<Skill, _> = serde_json::from_value(json!({
            "@odata.type": "#Microsoft.Skills.Vision.OcrSkill",
            "inputs": [],
            "outputs": []
        }));
        assert!(result.is_err());
    }
}
