//! Hierarchical Navigable Small World graph over densely numbered slots.
//!
//! The graph only stores link structure; distances are supplied by the
//! caller, which owns the vectors. Mutation is serialized by the owning
//! store; reads are lock-free on a shared snapshot.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use roaring::RoaringBitmap;

#[derive(Debug, Clone)]
pub struct HnswGraph {
    m: usize,
    m0: usize,
    ef_construction: usize,
    level_mult: f64,
    entry_point: Option<u32>,
    max_level: usize,
    /// `links[node][level]` = neighbor ids.
    links: Vec<Vec<Vec<u32>>>,
    rng: SmallRng,
}

impl HnswGraph {
    pub fn new(m: usize, ef_construction: usize) -> Self {
        let m = m.max(2);
        Self {
            m,
            m0: m * 2,
            ef_construction: ef_construction.max(m),
            level_mult: 1.0 / (m as f64).ln(),
            entry_point: None,
            max_level: 0,
            links: Vec::new(),
            // deterministic level sampling keeps rebuilds reproducible
            rng: SmallRng::seed_from_u64(0x5eed),
        }
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    fn sample_level(&mut self) -> usize {
        let uniform: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-uniform.ln() * self.level_mult).floor() as usize
    }

    /// Insert node `id`; `dist` returns the distance between two stored
    /// nodes. Ids must be appended densely (id == current len).
    pub fn insert(&mut self, id: u32, dist: &dyn Fn(u32, u32) -> f32) {
        debug_assert_eq!(id as usize, self.links.len());
        let level = self.sample_level();
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        let mut current = entry;
        // greedy descent through the levels above the new node's level
        for lc in ((level + 1)..=self.max_level).rev() {
            current = self.greedy_closest(current, lc, &|n| dist(n, id));
        }

        let mut entry_points = vec![current];
        for lc in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(&entry_points, self.ef_construction, lc, &|n| dist(n, id));
            let max_links = if lc == 0 { self.m0 } else { self.m };

            let neighbors: Vec<u32> =
                candidates.iter().take(max_links).map(|&(n, _)| n).collect();
            self.links[id as usize][lc] = neighbors.clone();

            for neighbor in neighbors {
                let list = &mut self.links[neighbor as usize][lc];
                list.push(id);
                if list.len() > max_links {
                    // keep the closest links
                    let mut scored: Vec<(u32, f32)> =
                        list.iter().map(|&n| (n, dist(neighbor, n))).collect();
                    scored.sort_by(|a, b| a.1.total_cmp(&b.1));
                    scored.truncate(max_links);
                    *list = scored.into_iter().map(|(n, _)| n).collect();
                }
            }

            entry_points = candidates.into_iter().map(|(n, _)| n).collect();
            if entry_points.is_empty() {
                entry_points = vec![current];
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }
    }

    /// Best-first search of the bottom layer, descending greedily first.
    /// Returns up to `k` live nodes, closest first.
    pub fn search(
        &self,
        dist_to: &dyn Fn(u32) -> f32,
        k: usize,
        ef_search: usize,
        live: &RoaringBitmap,
    ) -> Vec<(u32, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };

        let mut current = entry;
        for lc in (1..=self.max_level).rev() {
            current = self.greedy_closest(current, lc, dist_to);
        }

        let ef = ef_search.max(k);
        let mut found = self.search_layer(&[current], ef, 0, dist_to);
        found.retain(|&(n, _)| live.contains(n));
        found.truncate(k);
        found
    }

    fn greedy_closest(&self, start: u32, level: usize, dist_to: &dyn Fn(u32) -> f32) -> u32 {
        let mut current = start;
        let mut current_dist = dist_to(current);
        loop {
            let mut improved = false;
            for &neighbor in self.neighbors(current, level) {
                let d = dist_to(neighbor);
                if d < current_dist {
                    current = neighbor;
                    current_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    fn neighbors(&self, node: u32, level: usize) -> &[u32] {
        self.links
            .get(node as usize)
            .and_then(|levels| levels.get(level))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Classic ef-bounded best-first search of one layer; returns candidates
    /// sorted closest first.
    fn search_layer(
        &self,
        entry_points: &[u32],
        ef: usize,
        level: usize,
        dist_to: &dyn Fn(u32) -> f32,
    ) -> Vec<(u32, f32)> {
        let mut visited = RoaringBitmap::new();
        // min-heap of nodes to expand
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat<f32>, u32)>> = BinaryHeap::new();
        // max-heap of the best `ef` results
        let mut results: BinaryHeap<(OrderedFloat<f32>, u32)> = BinaryHeap::new();

        for &entry in entry_points {
            if visited.insert(entry) {
                let d = dist_to(entry);
                candidates.push(Reverse((OrderedFloat(d), entry)));
                results.push((OrderedFloat(d), entry));
            }
        }

        while let Some(Reverse((OrderedFloat(d), node))) = candidates.pop() {
            let furthest = results.peek().map(|(d, _)| d.0).unwrap_or(f32::INFINITY);
            if d > furthest && results.len() >= ef {
                break;
            }
            for &neighbor in self.neighbors(node, level) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let d = dist_to(neighbor);
                let furthest = results.peek().map(|(d, _)| d.0).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < furthest {
                    candidates.push(Reverse((OrderedFloat(d), neighbor)));
                    results.push((OrderedFloat(d), neighbor));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut sorted: Vec<(u32, f32)> =
            results.into_iter().map(|(OrderedFloat(d), n)| (n, d)).collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_graph(vectors: &[Vec<f32>]) -> HnswGraph {
        let mut graph = HnswGraph::new(8, 40);
        for id in 0..vectors.len() as u32 {
            graph.insert(id, &|a, b| l2(&vectors[a as usize], &vectors[b as usize]));
        }
        graph
    }

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn finds_exact_nearest_neighbors_on_a_grid() {
        // 10x10 grid of points
        let vectors: Vec<Vec<f32>> =
            (0..100).map(|i| vec![(i % 10) as f32, (i / 10) as f32]).collect();
        let graph = build_graph(&vectors);
        let live: RoaringBitmap = (0..100u32).collect();

        let query = vec![3.2f32, 4.1];
        let found = graph.search(&|n| l2(&vectors[n as usize], &query), 4, 64, &live);

        assert_eq!(found.len(), 4);
        // (3,4) is the closest grid point
        assert_eq!(found[0].0, 43);
        // results come back closest first
        for pair in found.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn tombstoned_nodes_are_skipped() {
        let vectors: Vec<Vec<f32>> = (0..50).map(|i| vec![i as f32]).collect();
        let graph = build_graph(&vectors);
        let mut live: RoaringBitmap = (0..50u32).collect();
        live.remove(0);

        let query = vec![0.0f32];
        let found = graph.search(&|n| l2(&vectors[n as usize], &query), 1, 32, &live);
        assert_eq!(found[0].0, 1);
    }

    #[test]
    fn empty_graph_returns_nothing() {
        let graph = HnswGraph::new(8, 40);
        assert!(graph.search(&|_| 0.0, 5, 32, &RoaringBitmap::new()).is_empty());
    }
}
