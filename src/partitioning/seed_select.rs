//! Seed selection for graph partitioning.
//!
//! [`pick_seeds`] draws seed vertices with probability weighted by vertex
//! degree and without replacement; [`spread_seeds`] takes one such seed and
//! adds the vertices farthest from the seeds chosen so far, so the grown
//! parts start apart from each other.

use crate::partitioning::PartitionerConfig;
use crate::partitioning::error::PartitionerError;
use crate::partitioning::graph_traits::PartitionableGraph;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;

/// Returns an error if `degrees.len()` doesn’t match the number of vertices.
pub fn pick_seeds<G>(
    graph: &G,
    degrees: &[u64],
    num_seeds: usize,
    cfg: &PartitionerConfig,
) -> Result<Vec<usize>, PartitionerError>
where
    G: PartitionableGraph,
{
    let n = graph.num_vertices();
    if degrees.len() != n {
        return Err(PartitionerError::DegreeLengthMismatch {
            expected: n,
            got: degrees.len(),
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }
    let num_seeds = num_seeds.min(n);
    let mut rng = SmallRng::seed_from_u64(cfg.rng_seed);
    let mut weights = degrees.to_vec();
    let mut chosen = Vec::with_capacity(num_seeds);
    let mut pool: Vec<usize> = (0..n).collect();
    for _ in 0..num_seeds {
        let total: u64 = weights.iter().sum();
        if total == 0 {
            // All remaining degrees are zero, pick uniformly
            pool.retain(|v| !chosen.contains(v));
            if pool.is_empty() {
                break;
            }
            let idx = rng.gen_range(0..pool.len());
            chosen.push(pool.remove(idx));
            continue;
        }
        let t = rng.gen_range(0..total);
        let mut acc = 0u64;
        let i = weights
            .iter()
            .position(|&w| {
                acc += w;
                acc > t
            })
            .unwrap_or(n - 1);
        chosen.push(i);
        // Remove this vertex from future selection
        weights[i] = 0;
    }
    Ok(chosen)
}

/// `count` seeds: one weighted draw, then farthest-first by hop distance.
/// Unreachable vertices count as infinitely far, so every connected
/// component gets a seed before any component gets two.
pub fn spread_seeds<G>(graph: &G, count: usize, cfg: &PartitionerConfig) -> Result<Vec<usize>, PartitionerError>
where
    G: PartitionableGraph,
{
    let n = graph.num_vertices();
    let degrees: Vec<u64> = (0..n).map(|v| graph.degree(v) as u64).collect();
    let mut seeds = pick_seeds(graph, &degrees, 1, cfg)?;
    let count = count.min(n);
    let mut dist = vec![usize::MAX; n];
    if let Some(&first) = seeds.first() {
        relax_distances(graph, first, &mut dist);
    }
    while seeds.len() < count {
        // ties go to the smallest index
        let Some(next) = (0..n)
            .filter(|v| dist[*v] > 0)
            .max_by(|&a, &b| dist[a].cmp(&dist[b]).then(b.cmp(&a)))
        else {
            break;
        };
        seeds.push(next);
        relax_distances(graph, next, &mut dist);
    }
    Ok(seeds)
}

fn relax_distances<G: PartitionableGraph>(graph: &G, source: usize, dist: &mut [usize]) {
    let mut queue = VecDeque::from([source]);
    dist[source] = 0;
    while let Some(u) = queue.pop_front() {
        for &v in graph.neighbors(u) {
            if dist[u] + 1 < dist[v] {
                dist[v] = dist[u] + 1;
                queue.push_back(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::graph_traits::tests::TestGraph;

    #[test]
    fn pick_seeds_length_mismatch() {
        let g = TestGraph::path(3);
        let err = pick_seeds(&g, &[1, 2], 1, &PartitionerConfig::default()).unwrap_err();
        assert_eq!(err, PartitionerError::DegreeLengthMismatch { expected: 3, got: 2 });
    }

    #[test]
    fn pick_seeds_more_than_n() {
        let g = TestGraph::path(3);
        let seeds = pick_seeds(&g, &[1, 1, 1], 5, &PartitionerConfig::default()).expect("seeds");
        let mut sorted = seeds.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn zero_degree_vertices_are_never_drawn_before_others() {
        let g = TestGraph::path(4);
        let seeds = pick_seeds(&g, &[0, 3, 0, 0], 1, &PartitionerConfig::default()).expect("seeds");
        assert_eq!(seeds, vec![1]);
    }

    #[test]
    fn spread_seeds_reach_both_ends_of_a_path() {
        let g = TestGraph::path(9);
        let seeds = spread_seeds(&g, 3, &PartitionerConfig::default()).expect("seeds");
        assert_eq!(seeds.len(), 3);
        let mut rest = seeds[1..].to_vec();
        rest.sort_unstable();
        // the second seed is an end of the path, the third the other end or
        // the far side of the first seed
        assert!(rest.contains(&0) || rest.contains(&8), "seeds = {seeds:?}");
    }

    #[test]
    fn spread_seeds_cover_components_first() {
        let g = TestGraph {
            adj: vec![vec![1], vec![0], vec![3], vec![2]],
        };
        let seeds = spread_seeds(&g, 2, &PartitionerConfig::default()).expect("seeds");
        let comp = |v: usize| v / 2;
        assert_ne!(comp(seeds[0]), comp(seeds[1]));
    }
}
