//! Analyzer registration and normalizer application.
//!
//! Analyzers run inside tantivy (write- and query-time tokenization);
//! normalizers produce the canonical form used for filter/facet/sort
//! equality on analyzed fields.

use searchdock_types::index::IndexDefinition;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RawTokenizer, SimpleTokenizer, TextAnalyzer,
    WhitespaceTokenizer,
};

pub const STANDARD_ANALYZER: &str = "sd_standard";
pub const KEYWORD_ANALYZER: &str = "sd_keyword";
pub const WHITESPACE_ANALYZER: &str = "sd_whitespace";
pub const ASCII_ANALYZER: &str = "sd_ascii";

/// Register the tokenizer chains the schema may reference.
pub fn register_analyzers(index: &tantivy::Index) {
    index.tokenizers().register(
        STANDARD_ANALYZER,
        TextAnalyzer::builder(SimpleTokenizer::default()).filter(LowerCaser).build(),
    );
    index.tokenizers().register(
        KEYWORD_ANALYZER,
        TextAnalyzer::builder(RawTokenizer::default()).filter(LowerCaser).build(),
    );
    index.tokenizers().register(
        WHITESPACE_ANALYZER,
        TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build(),
    );
    index.tokenizers().register(
        ASCII_ANALYZER,
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(AsciiFoldingFilter)
            .build(),
    );
}

/// Map a schema analyzer name onto a registered tokenizer chain. Unknown
/// names fall back to the standard chain.
pub fn resolve_analyzer(name: Option<&str>) -> &'static str {
    match name {
        None | Some("standard.lucene") | Some("standard") | Some("simple") => STANDARD_ANALYZER,
        Some("keyword") => KEYWORD_ANALYZER,
        Some("whitespace") => WHITESPACE_ANALYZER,
        Some(name) if name.ends_with(".lucene") => ASCII_ANALYZER,
        Some(_) => STANDARD_ANALYZER,
    }
}

/// Tokenize `text` with a registered analyzer, returning (token, byte range)
/// pairs against the original text.
pub fn analyze(
    index: &tantivy::Index,
    analyzer: &str,
    text: &str,
) -> Vec<(String, std::ops::Range<usize>)> {
    let mut analyzer = match index.tokenizers().get(analyzer) {
        Some(analyzer) => analyzer,
        None => return Vec::new(),
    };
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while let Some(token) = stream.next() {
        tokens.push((token.text.clone(), token.offset_from..token.offset_to));
    }
    tokens
}

/// Apply a named normalizer to a raw value. Built-ins: `lowercase`,
/// `uppercase`, `standard`, `asciifolding`, `elision`. A custom normalizer
/// declared on the index composes its token filters in order.
pub fn normalize(definition: &IndexDefinition, normalizer: Option<&str>, input: &str) -> String {
    let Some(name) = normalizer else {
        return input.to_string();
    };
    match name {
        "lowercase" => input.to_lowercase(),
        "uppercase" => input.to_uppercase(),
        "standard" => input.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        "asciifolding" => fold_ascii(input),
        "elision" => elide(input),
        custom => {
            let Some(custom) = definition.normalizers.iter().find(|n| n.name == custom) else {
                return input.to_string();
            };
            let mut value = input.to_string();
            for filter in &custom.token_filters {
                value = match filter.as_str() {
                    "lowercase" => value.to_lowercase(),
                    "uppercase" => value.to_uppercase(),
                    "asciifolding" => fold_ascii(&value),
                    "elision" => elide(&value),
                    _ => value,
                };
            }
            value
        }
    }
}

/// Fold the Latin-1 and Latin Extended-A accented ranges to their ASCII base
/// characters; anything else passes through.
pub fn fold_ascii(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'A',
            'ç' | 'ć' | 'č' => 'c',
            'Ç' | 'Ć' | 'Č' => 'C',
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ĕ' | 'Ė' | 'Ę' | 'Ě' => 'E',
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ĭ' | 'į' => 'i',
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Ĭ' | 'Į' => 'I',
            'ñ' | 'ń' | 'ň' => 'n',
            'Ñ' | 'Ń' | 'Ň' => 'N',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ŏ' | 'Ő' => 'O',
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ŭ' | 'Ů' | 'Ű' | 'Ų' => 'U',
            'ý' | 'ÿ' => 'y',
            'Ý' | 'Ÿ' => 'Y',
            'ž' | 'ź' | 'ż' => 'z',
            'Ž' | 'Ź' | 'Ż' => 'Z',
            'ß' => 's',
            other => other,
        })
        .collect()
}

const ELISION_PREFIXES: &[&str] =
    &["l'", "d'", "j'", "m'", "t'", "s'", "n'", "c'", "qu'", "jusqu'", "lorsqu'"];

fn elide(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let lowered = word.to_lowercase();
            for prefix in ELISION_PREFIXES {
                if lowered.starts_with(prefix) {
                    return &word[prefix.len()..];
                }
            }
            word
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition_with_custom_normalizer() -> IndexDefinition {
        serde_json::from_value(json!({
            "name": "test",
            "fields": [ { "name": "id", "type": "Edm.String", "key": true } ],
            "normalizers": [
                { "name": "fold_lower", "tokenFilters": ["asciifolding", "lowercase"] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn built_in_normalizers() {
        let definition = definition_with_custom_normalizer();
        assert_eq!(normalize(&definition, Some("lowercase"), "HÔtel"), "hôtel");
        assert_eq!(normalize(&definition, Some("uppercase"), "café"), "CAFÉ");
        assert_eq!(normalize(&definition, Some("asciifolding"), "café"), "cafe");
        assert_eq!(normalize(&definition, Some("elision"), "l'hôtel d'été"), "hôtel été");
        assert_eq!(normalize(&definition, None, "AsIs"), "AsIs");
    }

    #[test]
    fn custom_normalizer_composes_in_order() {
        let definition = definition_with_custom_normalizer();
        assert_eq!(normalize(&definition, Some("fold_lower"), "CAFÉ"), "cafe");
    }

    #[test]
    fn analyze_reports_original_offsets() {
        let index = tantivy::Index::create_in_ram(tantivy::schema::Schema::builder().build());
        register_analyzers(&index);
        let tokens = analyze(&index, STANDARD_ANALYZER, "Cheap, cozy Stay!");
        let texts: Vec<_> = tokens.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["cheap", "cozy", "stay"]);
        assert_eq!(&"Cheap, cozy Stay!"[tokens[2].1.clone()], "Stay");
    }
}
