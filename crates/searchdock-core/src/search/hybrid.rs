//! Hybrid fusion: text and vector result lists combined into one ranking,
//! by Reciprocal Rank Fusion (the default) or normalized weighted sum.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionKind {
    #[default]
    ReciprocalRank,
    Weighted,
}

#[derive(Debug, Clone)]
pub struct FusionOptions {
    pub kind: FusionKind,
    pub rrf_k: f64,
    pub text_weight: f64,
    pub vector_weight: f64,
}

impl Default for FusionOptions {
    fn default() -> Self {
        Self {
            kind: FusionKind::ReciprocalRank,
            rrf_k: 60.0,
            text_weight: 0.3,
            vector_weight: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListSource {
    Text,
    Vector(String),
}

/// One ranked input list, best first.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub source: ListSource,
    pub entries: Vec<(u32, f64)>,
}

#[derive(Debug, Clone)]
pub struct FusedHit {
    pub seq: u32,
    pub score: f64,
    pub text_score: Option<f64>,
    pub vector_scores: Vec<(String, f64)>,
}

/// Fuse the lists; the output is sorted by fused score descending, ties by
/// ascending sequence id so the ranking is deterministic across runs.
pub fn fuse(lists: &[RankedList], options: &FusionOptions) -> Vec<FusedHit> {
    let mut fused: BTreeMap<u32, FusedHit> = BTreeMap::new();

    for list in lists {
        let max_score = list
            .entries
            .iter()
            .map(|&(_, score)| score)
            .fold(f64::MIN, f64::max)
            .max(f64::MIN_POSITIVE);
        for (position, &(seq, score)) in list.entries.iter().enumerate() {
            let contribution = match options.kind {
                // ranks number from 1
                FusionKind::ReciprocalRank => 1.0 / (options.rrf_k + (position + 1) as f64),
                FusionKind::Weighted => {
                    let weight = match &list.source {
                        ListSource::Text => options.text_weight,
                        ListSource::Vector(_) => options.vector_weight,
                    };
                    weight * (score / max_score)
                }
            };

            let hit = fused.entry(seq).or_insert_with(|| FusedHit {
                seq,
                score: 0.0,
                text_score: None,
                vector_scores: Vec::new(),
            });
            hit.score += contribution;
            match &list.source {
                ListSource::Text => hit.text_score = Some(score),
                ListSource::Vector(field) => hit.vector_scores.push((field.clone(), score)),
            }
        }
    }

    let mut hits: Vec<FusedHit> = fused.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
    hits
}
