//! Solr-format synonym rules, applied at query time.
//!
//! `a, b, c` creates bidirectional equivalences; `a, b => c, d` maps each
//! left term to the right-hand list. Lookup is case-insensitive and the
//! expansion is OR-ed with the original term at its position.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct SynonymRules {
    expansions: HashMap<String, Vec<String>>,
}

impl SynonymRules {
    pub fn parse(rules: &str) -> Self {
        let mut expansions: HashMap<String, Vec<String>> = HashMap::new();

        for line in rules.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((left, right)) = line.split_once("=>") {
                let sources = split_terms(left);
                let targets = split_terms(right);
                for source in &sources {
                    let entry = expansions.entry(source.to_lowercase()).or_default();
                    for target in &targets {
                        push_unique(entry, target);
                    }
                }
            } else {
                let terms = split_terms(line);
                for term in &terms {
                    let entry = expansions.entry(term.to_lowercase()).or_default();
                    for other in &terms {
                        if other.to_lowercase() != term.to_lowercase() {
                            push_unique(entry, other);
                        }
                    }
                }
            }
        }

        Self { expansions }
    }

    pub fn expand(&self, term: &str) -> &[String] {
        self.expansions.get(&term.to_lowercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.expansions.is_empty()
    }
}

fn split_terms(part: &str) -> Vec<String> {
    part.split(',').map(str::trim).filter(|t| !t.is_empty()).map(str::to_string).collect()
}

fn push_unique(list: &mut Vec<String>, term: &str) {
    if !list.iter().any(|t| t.eq_ignore_ascii_case(term)) {
        list.push(term.to_string());
    }
}
