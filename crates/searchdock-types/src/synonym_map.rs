use serde::{Deserialize, Serialize};

/// A named Solr-format synonym rule set referenced by index fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SynonymMapDefinition {
    pub name: String,
    #[serde(default = "SynonymMapDefinition::default_format")]
    pub format: String,
    /// Newline-separated rules: `a, b, c` (equivalences) or `a, b => c`
    /// (directional).
    pub synonyms: String,
}

impl SynonymMapDefinition {
    fn default_format() -> String {
        "solr".to_string()
    }
}
