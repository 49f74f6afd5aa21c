use crate::cancel::CancelFlag;
use crate::config::AnnBuildParams;
use crate::embeddings::{dot, splitmix64, unit_f32};
use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

const MAX_LEVEL: usize = 16;
const CANCEL_CHECK_INTERVAL: usize = 64;

/// Similarity of one node to the current query.
///
/// Ordering is by similarity, then by *lower* ordinal, so that the greatest element is
/// the best hit and ties resolve towards ascending key order.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scored {
    pub similarity: f32,
    pub node: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .total_cmp(&other.similarity)
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// Hierarchical navigable small-world graph over unit-normalized vectors.
///
/// The graph only stores ordinals; vectors are owned by the snapshot and passed in.
/// It is built once per snapshot and never mutated after publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswIndex {
    entry_point: Option<u32>,
    max_level: usize,
    /// `links[node][layer]` holds the neighbour ordinals of `node` on `layer`
    links: Vec<Vec<Vec<u32>>>,
}

impl HnswIndex {
    /// Build the graph by inserting every vector in ordinal order.
    pub fn build(
        vectors: &[Vec<f32>],
        params: &AnnBuildParams,
        cancel: &CancelFlag,
    ) -> Result<Self> {
        let mut index = Self {
            entry_point: None,
            max_level: 0,
            links: Vec::with_capacity(vectors.len()),
        };
        let level_mult = 1.0 / (params.max_degree() as f64).ln();

        for node in 0..vectors.len() {
            if node % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(VectorStoreError::Cancelled);
            }
            let level = assign_level(params.seed, node, level_mult);
            index.insert(vectors, node as u32, level, params);
        }

        Ok(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[must_use]
    pub const fn max_level(&self) -> usize {
        self.max_level
    }

    /// Check that the graph is consistent with a vector table of `len` rows.
    pub fn validate(&self, len: usize) -> Result<()> {
        if self.links.len() != len {
            return Err(VectorStoreError::Corrupt(format!(
                "graph has {} nodes, expected {len}",
                self.links.len()
            )));
        }
        match self.entry_point {
            None if len > 0 => {
                return Err(VectorStoreError::Corrupt("graph has no entry point".into()));
            }
            Some(entry) if entry as usize >= len => {
                return Err(VectorStoreError::Corrupt(format!(
                    "entry point {entry} out of range"
                )));
            }
            _ => {}
        }
        let out_of_range = self
            .links
            .iter()
            .flatten()
            .flatten()
            .any(|&neighbour| neighbour as usize >= len);
        if out_of_range {
            return Err(VectorStoreError::Corrupt("neighbour out of range".into()));
        }
        Ok(())
    }

    /// Approximate top-`k` search. `accept` restricts which ordinals may be returned.
    ///
    /// Returns hits ordered by similarity descending, ordinal ascending.
    pub(crate) fn search(
        &self,
        vectors: &[Vec<f32>],
        query: &[f32],
        k: usize,
        ef: usize,
        accept: impl Fn(u32) -> bool,
    ) -> Vec<Scored> {
        let Some(mut entry) = self.entry_point else {
            return Vec::new();
        };
        for layer in (1..=self.max_level).rev() {
            entry = self.greedy_closest(vectors, query, entry, layer);
        }
        self.search_layer(vectors, query, &[entry], ef.max(k), 0)
            .into_iter()
            .filter(|hit| accept(hit.node))
            .take(k)
            .collect()
    }

    fn neighbours(&self, node: u32, layer: usize) -> &[u32] {
        self.links[node as usize]
            .get(layer)
            .map_or(&[], Vec::as_slice)
    }

    fn insert(&mut self, vectors: &[Vec<f32>], node: u32, level: usize, params: &AnnBuildParams) {
        self.links.push(vec![Vec::new(); level + 1]);
        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_level = level;
            return;
        };

        let query = &vectors[node as usize];
        let top = self.max_level;
        for layer in (level + 1..=top).rev() {
            entry = self.greedy_closest(vectors, query, entry, layer);
        }

        let mut entries = vec![entry];
        for layer in (0..=level.min(top)).rev() {
            let candidates =
                self.search_layer(vectors, query, &entries, params.ef_construction.max(1), layer);
            let cap = if layer == 0 {
                params.layer0_degree()
            } else {
                params.max_degree()
            };

            let selected = select_neighbours(vectors, &candidates, params.max_degree());
            for &neighbour in &selected {
                let list = &mut self.links[neighbour as usize][layer];
                list.push(node);
                if list.len() > cap {
                    self.prune(vectors, neighbour, layer, cap);
                }
            }
            self.links[node as usize][layer] = selected;
            entries = candidates.iter().map(|hit| hit.node).collect();
        }

        if level > top {
            self.entry_point = Some(node);
            self.max_level = level;
        }
    }

    fn prune(&mut self, vectors: &[Vec<f32>], node: u32, layer: usize, cap: usize) {
        let base = &vectors[node as usize];
        let mut scored: Vec<Scored> = self.links[node as usize][layer]
            .iter()
            .map(|&other| Scored {
                similarity: dot(base, &vectors[other as usize]),
                node: other,
            })
            .collect();
        scored.sort_by(|a, b| b.cmp(a));
        self.links[node as usize][layer] = select_neighbours(vectors, &scored, cap);
    }

    fn greedy_closest(&self, vectors: &[Vec<f32>], query: &[f32], entry: u32, layer: usize) -> u32 {
        let mut best = Scored {
            similarity: dot(query, &vectors[entry as usize]),
            node: entry,
        };
        loop {
            let mut improved = false;
            for &neighbour in self.neighbours(best.node, layer) {
                let candidate = Scored {
                    similarity: dot(query, &vectors[neighbour as usize]),
                    node: neighbour,
                };
                if candidate > best {
                    best = candidate;
                    improved = true;
                }
            }
            if !improved {
                return best.node;
            }
        }
    }

    fn search_layer(
        &self,
        vectors: &[Vec<f32>],
        query: &[f32],
        entries: &[u32],
        ef: usize,
        layer: usize,
    ) -> Vec<Scored> {
        let mut visited: HashSet<u32> = HashSet::new();
        let mut candidates: BinaryHeap<Scored> = BinaryHeap::new();
        let mut results: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();

        for &entry in entries {
            if visited.insert(entry) {
                let scored = Scored {
                    similarity: dot(query, &vectors[entry as usize]),
                    node: entry,
                };
                candidates.push(scored);
                results.push(Reverse(scored));
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(current) = candidates.pop() {
            if let Some(Reverse(worst)) = results.peek() {
                if results.len() >= ef && current < *worst {
                    break;
                }
            }
            for &neighbour in self.neighbours(current.node, layer) {
                if !visited.insert(neighbour) {
                    continue;
                }
                let scored = Scored {
                    similarity: dot(query, &vectors[neighbour as usize]),
                    node: neighbour,
                };
                let admit = results.len() < ef
                    || results.peek().map_or(true, |Reverse(worst)| scored > *worst);
                if admit {
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<Scored> = results.into_iter().map(|Reverse(hit)| hit).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }
}

/// Exact scan over `ordinals`, best first.
pub(crate) fn exact_scan(
    vectors: &[Vec<f32>],
    query: &[f32],
    ordinals: impl Iterator<Item = u32>,
    k: usize,
) -> Vec<Scored> {
    let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(k + 1);
    for node in ordinals {
        let scored = Scored {
            similarity: dot(query, &vectors[node as usize]),
            node,
        };
        heap.push(Reverse(scored));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut out: Vec<Scored> = heap.into_iter().map(|Reverse(hit)| hit).collect();
    out.sort_by(|a, b| b.cmp(a));
    out
}

/// Diversity heuristic: keep a candidate only if it is closer to the query than to any
/// neighbour already kept, then top up with the skipped ones.
fn select_neighbours(vectors: &[Vec<f32>], candidates: &[Scored], m: usize) -> Vec<u32> {
    let mut selected: Vec<Scored> = Vec::with_capacity(m);
    let mut skipped: Vec<Scored> = Vec::new();
    for candidate in candidates {
        if selected.len() >= m {
            break;
        }
        let vector = &vectors[candidate.node as usize];
        let diverse = selected
            .iter()
            .all(|kept| dot(vector, &vectors[kept.node as usize]) < candidate.similarity);
        if diverse {
            selected.push(*candidate);
        } else {
            skipped.push(*candidate);
        }
    }
    for candidate in skipped {
        if selected.len() >= m {
            break;
        }
        selected.push(candidate);
    }
    selected.into_iter().map(|hit| hit.node).collect()
}

fn assign_level(seed: u64, node: usize, level_mult: f64) -> usize {
    let mut state = seed ^ (node as u64).wrapping_mul(0xD1B5_4A32_D192_ED03);
    let uniform = 1.0 - f64::from(unit_f32(splitmix64(&mut state)));
    let level = (-uniform.ln() * level_mult).floor();
    (level as usize).min(MAX_LEVEL)
}
