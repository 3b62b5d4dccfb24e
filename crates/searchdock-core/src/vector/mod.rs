//! The per-index vector store: one slot table per vector field, kept in
//! lockstep with the inverted index by the document-operations layer.
//!
//! Mutation takes the writer lock and is serialized; searches share a read
//! lock. The whole store snapshots to one bincode file per index and the
//! HNSW graphs are rebuilt from the snapshot at open.

mod hnsw;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

use hnsw::HnswGraph;
use parking_lot::RwLock;
use roaring::RoaringBitmap;
use searchdock_types::index::{
    HnswParameters, IndexDefinition, VectorAlgorithmKind, VectorMetric,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine-level tuning, from the service configuration.
#[derive(Debug, Clone)]
pub struct VectorConfig {
    pub use_hnsw: bool,
    pub oversample_multiplier: usize,
    pub default_hnsw: HnswParameters,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { use_hnsw: true, oversample_multiplier: 4, default_hnsw: HnswParameters::default() }
    }
}

#[derive(Debug)]
enum FieldAlgorithm {
    BruteForce,
    Hnsw { graph: HnswGraph, params: HnswParameters },
}

#[derive(Debug)]
struct VectorField {
    dims: usize,
    metric: VectorMetric,
    algorithm: FieldAlgorithm,
    slots: Vec<(String, Vec<f32>)>,
    live: RoaringBitmap,
    key_to_slot: HashMap<String, u32>,
}

impl VectorField {
    fn new(dims: usize, metric: VectorMetric, algorithm: FieldAlgorithm) -> Self {
        Self {
            dims,
            metric,
            algorithm,
            slots: Vec::new(),
            live: RoaringBitmap::new(),
            key_to_slot: HashMap::new(),
        }
    }

    fn put(&mut self, key: &str, vector: Vec<f32>) {
        // a replaced vector tombstones its old slot; links to it die with it
        if let Some(old) = self.key_to_slot.get(key) {
            self.live.remove(*old);
        }
        let slot = self.slots.len() as u32;
        self.slots.push((key.to_string(), vector));
        self.live.insert(slot);
        self.key_to_slot.insert(key.to_string(), slot);
        if let FieldAlgorithm::Hnsw { graph, .. } = &mut self.algorithm {
            let slots = &self.slots;
            let metric = self.metric;
            graph.insert(slot, &|a, b| {
                distance(metric, &slots[a as usize].1, &slots[b as usize].1)
            });
        }
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.key_to_slot.remove(key) {
            Some(slot) => self.live.remove(slot),
            None => false,
        }
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        filter_keys: Option<&HashSet<String>>,
        oversample_multiplier: usize,
    ) -> Vec<(String, f32)> {
        let allowed: Option<RoaringBitmap> = filter_keys.map(|keys| {
            keys.iter()
                .filter_map(|key| self.key_to_slot.get(key))
                .copied()
                .filter(|slot| self.live.contains(*slot))
                .collect()
        });

        let ranked: Vec<(u32, f32)> = match &self.algorithm {
            FieldAlgorithm::BruteForce => {
                let candidates: Box<dyn Iterator<Item = u32>> = match &allowed {
                    Some(allowed) => Box::new(allowed.iter()),
                    None => Box::new(self.live.iter()),
                };
                let mut scored: Vec<(u32, f32)> = candidates
                    .map(|slot| (slot, distance(self.metric, &self.slots[slot as usize].1, query)))
                    .collect();
                scored.sort_by(|a, b| a.1.total_cmp(&b.1));
                scored.truncate(k);
                scored
            }
            FieldAlgorithm::Hnsw { graph, params } => {
                // filtered search oversamples, then post-filters
                let fetch = if allowed.is_some() { k * oversample_multiplier.max(1) } else { k };
                let ef = ef_search.max(params.ef_search).max(fetch);
                let mut found = graph.search(
                    &|slot| distance(self.metric, &self.slots[slot as usize].1, query),
                    fetch,
                    ef,
                    &self.live,
                );
                if let Some(allowed) = &allowed {
                    found.retain(|(slot, _)| allowed.contains(*slot));
                }
                found.truncate(k);
                found
            }
        };

        ranked
            .into_iter()
            .map(|(slot, dist)| {
                (self.slots[slot as usize].0.clone(), score_from_distance(self.metric, dist))
            })
            .collect()
    }
}

pub struct VectorStore {
    snapshot_path: PathBuf,
    config: VectorConfig,
    fields: RwLock<HashMap<String, VectorField>>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    fields: Vec<FieldSnapshot>,
}

#[derive(Serialize, Deserialize)]
struct FieldSnapshot {
    name: String,
    entries: Vec<(String, Vec<f32>)>,
}

impl VectorStore {
    /// Build the store for an index definition, loading the snapshot file if
    /// one survives from a previous run.
    pub fn open(
        definition: &IndexDefinition,
        config: VectorConfig,
        snapshot_path: PathBuf,
    ) -> Result<Self> {
        let mut fields = HashMap::new();
        for field in definition.vector_fields() {
            let dims = field.dimensions.unwrap_or_default();
            let (metric, algorithm) = match definition.vector_algorithm_for(field) {
                Some(algorithm) => match algorithm.kind {
                    VectorAlgorithmKind::Hnsw if config.use_hnsw => {
                        let params = algorithm
                            .hnsw_parameters
                            .clone()
                            .unwrap_or_else(|| config.default_hnsw.clone());
                        (
                            params.metric,
                            FieldAlgorithm::Hnsw {
                                graph: HnswGraph::new(params.m, params.ef_construction),
                                params,
                            },
                        )
                    }
                    VectorAlgorithmKind::Hnsw => {
                        let params = algorithm
                            .hnsw_parameters
                            .clone()
                            .unwrap_or_else(|| config.default_hnsw.clone());
                        (params.metric, FieldAlgorithm::BruteForce)
                    }
                    VectorAlgorithmKind::ExhaustiveKnn => {
                        let metric = algorithm
                            .exhaustive_knn_parameters
                            .clone()
                            .unwrap_or_default()
                            .metric;
                        (metric, FieldAlgorithm::BruteForce)
                    }
                },
                None => (VectorMetric::Cosine, FieldAlgorithm::BruteForce),
            };
            fields.insert(field.name.clone(), VectorField::new(dims, metric, algorithm));
        }

        let store = Self { snapshot_path, config, fields: RwLock::new(fields) };
        store.load_snapshot()?;
        Ok(store)
    }

    fn load_snapshot(&self) -> Result<()> {
        if !self.snapshot_path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.snapshot_path)?;
        let snapshot: Snapshot = bincode::deserialize(&bytes)?;
        let mut fields = self.fields.write();
        for field_snapshot in snapshot.fields {
            if let Some(field) = fields.get_mut(&field_snapshot.name) {
                for (key, vector) in field_snapshot.entries {
                    if vector.len() == field.dims {
                        field.put(&key, vector);
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the live entries to the snapshot file.
    pub fn persist(&self) -> Result<()> {
        let fields = self.fields.read();
        let snapshot = Snapshot {
            fields: fields
                .iter()
                .map(|(name, field)| FieldSnapshot {
                    name: name.clone(),
                    entries: field
                        .live
                        .iter()
                        .map(|slot| field.slots[slot as usize].clone())
                        .collect(),
                })
                .collect(),
        };
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.snapshot_path, bincode::serialize(&snapshot)?)?;
        Ok(())
    }

    pub fn put(&self, field: &str, key: &str, vector: Vec<f32>) -> Result<()> {
        let mut fields = self.fields.write();
        let Some(entry) = fields.get_mut(field) else {
            return Err(Error::InvalidArgument(format!("`{field}` is not a vector field.")));
        };
        if vector.len() != entry.dims {
            return Err(Error::VectorDimensionMismatch {
                field: field.to_string(),
                expected: entry.dims,
                got: vector.len(),
            });
        }
        entry.put(key, vector);
        Ok(())
    }

    /// Remove `key` from every vector field of the index.
    pub fn delete(&self, key: &str) {
        let mut fields = self.fields.write();
        for field in fields.values_mut() {
            field.delete(key);
        }
    }

    pub fn search(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        filter_keys: Option<&HashSet<String>>,
    ) -> Result<Vec<(String, f32)>> {
        let fields = self.fields.read();
        let Some(entry) = fields.get(field) else {
            return Err(Error::InvalidArgument(format!("`{field}` is not a vector field.")));
        };
        if query.len() != entry.dims {
            return Err(Error::VectorDimensionMismatch {
                field: field.to_string(),
                expected: entry.dims,
                got: query.len(),
            });
        }
        Ok(entry.search(
            query,
            k,
            self.config.default_hnsw.ef_search,
            filter_keys,
            self.config.oversample_multiplier,
        ))
    }

    /// True when `key` has an entry in any vector field.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.read().values().any(|f| {
            f.key_to_slot.get(key).is_some_and(|slot| f.live.contains(*slot))
        })
    }

    pub fn clear(&self) -> Result<()> {
        {
            let mut fields = self.fields.write();
            for field in fields.values_mut() {
                let dims = field.dims;
                let metric = field.metric;
                let algorithm = match &field.algorithm {
                    FieldAlgorithm::BruteForce => FieldAlgorithm::BruteForce,
                    FieldAlgorithm::Hnsw { params, .. } => FieldAlgorithm::Hnsw {
                        graph: HnswGraph::new(params.m, params.ef_construction),
                        params: params.clone(),
                    },
                };
                *field = VectorField::new(dims, metric, algorithm);
            }
        }
        self.persist()
    }
}

fn distance(metric: VectorMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        VectorMetric::Cosine => 1.0 - cosine_similarity(a, b),
        VectorMetric::DotProduct => -dot(a, b),
        VectorMetric::Euclidean => {
            a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>()
        }
    }
}

/// Higher is better on the wire; each mapping is monotone in the similarity.
fn score_from_distance(metric: VectorMetric, dist: f32) -> f32 {
    match metric {
        VectorMetric::Cosine => 1.0 - dist,
        VectorMetric::DotProduct => -dist,
        VectorMetric::Euclidean => 1.0 / (1.0 + dist.max(0.0).sqrt()),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn definition(kind: &str) -> IndexDefinition {
        serde_json::from_value(json!({
            "name": "vectors",
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "embedding", "type": "Collection(Edm.Single)", "dimensions": 4,
                  "vectorSearchProfile": "default" }
            ],
            "vectorSearch": {
                "algorithms": [
                    { "name": "algo", "kind": kind,
                      "hnswParameters": { "m": 8, "efConstruction": 50, "efSearch": 40, "metric": "cosine" } }
                ],
                "profiles": [ { "name": "default", "algorithm": "algo" } ]
            }
        }))
        .unwrap()
    }

    fn store(kind: &str, dir: &tempfile::TempDir) -> VectorStore {
        VectorStore::open(
            &definition(kind),
            VectorConfig::default(),
            dir.path().join("vectors.bin"),
        )
        .unwrap()
    }

    #[test]
    fn cosine_knn_orders_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store("exhaustiveKnn", &dir);
        store.put("embedding", "A", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        store.put("embedding", "B", vec![0.9, 0.1, 0.0, 0.0]).unwrap();
        store.put("embedding", "C", vec![0.0, 1.0, 0.0, 0.0]).unwrap();

        let found = store.search("embedding", &[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        let keys: Vec<_> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert!(found[0].1 > found[1].1);
    }

    #[test]
    fn hnsw_agrees_with_brute_force_on_small_sets() {
        let dir = tempfile::tempdir().unwrap();
        let hnsw = store("hnsw", &dir);
        let brute = store("exhaustiveKnn", &dir);
        for i in 0..60u32 {
            let angle = i as f32 / 10.0;
            let vector = vec![angle.cos(), angle.sin(), 0.0, 0.0];
            hnsw.put("embedding", &format!("k{i}"), vector.clone()).unwrap();
            brute.put("embedding", &format!("k{i}"), vector).unwrap();
        }
        let query = [1.0, 0.1, 0.0, 0.0];
        let expected: Vec<String> = brute
            .search("embedding", &query, 5, None)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        let found: Vec<String> =
            hnsw.search("embedding", &query, 5, None).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn filtered_search_restricts_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store("hnsw", &dir);
        store.put("embedding", "A", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        store.put("embedding", "B", vec![0.9, 0.1, 0.0, 0.0]).unwrap();
        store.put("embedding", "C", vec![0.8, 0.2, 0.0, 0.0]).unwrap();

        let allowed: HashSet<String> = ["B".to_string(), "C".to_string()].into();
        let found =
            store.search("embedding", &[1.0, 0.0, 0.0, 0.0], 2, Some(&allowed)).unwrap();
        let keys: Vec<_> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["B", "C"]);
    }

    #[test]
    fn delete_removes_from_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = store("exhaustiveKnn", &dir);
        store.put("embedding", "A", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
        assert!(store.contains_key("A"));
        store.delete("A");
        assert!(!store.contains_key("A"));
        assert!(store.search("embedding", &[1.0, 0.0, 0.0, 0.0], 5, None).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store("exhaustiveKnn", &dir);
        assert!(matches!(
            store.put("embedding", "A", vec![1.0, 0.0]),
            Err(Error::VectorDimensionMismatch { .. })
        ));
        assert!(matches!(
            store.search("embedding", &[1.0], 3, None),
            Err(Error::VectorDimensionMismatch { .. })
        ));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store("hnsw", &dir);
            store.put("embedding", "A", vec![1.0, 0.0, 0.0, 0.0]).unwrap();
            store.put("embedding", "B", vec![0.0, 1.0, 0.0, 0.0]).unwrap();
            store.persist().unwrap();
        }
        let store = store("hnsw", &dir);
        let found = store.search("embedding", &[1.0, 0.0, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(found[0].0, "A");
    }
}
