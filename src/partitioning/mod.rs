//! Entry-point for native graph partitioning.
//!
//! [`partition`] is deterministic: the same graph and config give the same
//! map on every rank, so ranks can partition redundantly instead of
//! exchanging the result.

pub mod error;
pub mod graph_traits;
pub mod metrics;
pub mod seed_select;

pub use self::error::PartitionerError;
pub use self::graph_traits::PartitionableGraph;
pub use self::metrics::*;

use std::collections::VecDeque;

pub type PartitionId = usize;

#[derive(Debug, Clone)]
pub struct PartitionerConfig {
    pub n_parts: usize,
    /// Allowed load above the ideal part load during refinement, as a
    /// fraction of it.
    pub imbalance_tol: f64,
    pub rng_seed: u64,
    /// Refinement sweeps after graph growing.
    pub max_iters: usize,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            n_parts: 2,
            imbalance_tol: 0.05,
            rng_seed: 42,
            max_iters: 20,
        }
    }
}

/// Part of every vertex, indexed by vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMap {
    parts: Vec<PartitionId>,
    n_parts: usize,
}

impl PartitionMap {
    pub fn from_parts(parts: Vec<PartitionId>, n_parts: usize) -> Self {
        Self { parts, n_parts }
    }

    pub fn part_of(&self, v: usize) -> PartitionId {
        self.parts[v]
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn num_parts(&self) -> usize {
        self.n_parts
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, PartitionId)> + '_ {
        self.parts.iter().copied().enumerate()
    }

    /// Vertices of part `p` in ascending order.
    pub fn members(&self, p: PartitionId) -> impl Iterator<Item = usize> + '_ {
        self.iter().filter(move |&(_, q)| q == p).map(|(v, _)| v)
    }
}

/// Split `graph` into `cfg.n_parts` parts by greedy graph growing from
/// spread-out seeds, followed by boundary refinement that lowers the edge
/// cut without breaking the load bound.
pub fn partition<G>(graph: &G, cfg: &PartitionerConfig) -> Result<PartitionMap, PartitionerError>
where
    G: PartitionableGraph,
{
    if cfg.n_parts == 0 {
        return Err(PartitionerError::NoParts);
    }
    let n = graph.num_vertices();
    let k = cfg.n_parts;
    if n == 0 {
        return Ok(PartitionMap::from_parts(Vec::new(), k));
    }

    let total: u64 = (0..n).map(|v| graph.weight(v)).sum();
    let target = total.div_ceil(k as u64).max(1);

    // 1. grow parts round-robin from the seeds
    let seeds = seed_select::spread_seeds(graph, k, cfg)?;
    let mut owner: Vec<Option<PartitionId>> = vec![None; n];
    let mut loads = vec![0u64; k];
    let mut queues: Vec<VecDeque<usize>> = vec![VecDeque::new(); k];
    for (p, &s) in seeds.iter().enumerate() {
        queues[p].push_back(s);
    }
    loop {
        let mut progressed = false;
        for p in 0..k {
            if loads[p] >= target {
                continue;
            }
            while let Some(v) = queues[p].pop_front() {
                if owner[v].is_some() {
                    continue;
                }
                owner[v] = Some(p);
                loads[p] += graph.weight(v);
                queues[p].extend(graph.neighbors(v).iter().filter(|&&u| owner[u].is_none()));
                progressed = true;
                break;
            }
        }
        if !progressed {
            break;
        }
    }

    // 2. vertices no part reached: join the lightest neighbouring part, or
    //    the lightest part overall
    for v in 0..n {
        if owner[v].is_some() {
            continue;
        }
        let p = graph
            .neighbors(v)
            .iter()
            .filter_map(|&u| owner[u])
            .min_by_key(|&p| (loads[p], p))
            .or_else(|| (0..k).min_by_key(|&p| (loads[p], p)))
            .ok_or(PartitionerError::NoParts)?;
        owner[v] = Some(p);
        loads[p] += graph.weight(v);
    }

    let mut parts = owner
        .iter()
        .enumerate()
        .map(|(v, p)| p.ok_or(PartitionerError::MissingPartition(v)))
        .collect::<Result<Vec<_>, _>>()?;

    // 3. boundary refinement
    let bound = ((target as f64) * (1.0 + cfg.imbalance_tol)).ceil() as u64;
    let mut conn = vec![0usize; k];
    for _ in 0..cfg.max_iters {
        let mut moved = false;
        for v in 0..n {
            let p = parts[v];
            let w = graph.weight(v);
            if loads[p] <= w {
                continue;
            }
            conn.iter_mut().for_each(|c| *c = 0);
            for &u in graph.neighbors(v) {
                conn[parts[u]] += 1;
            }
            // lower the cut within the bound, or shed load from an
            // overfull part without raising the cut
            let best = (0..k)
                .filter(|&q| {
                    q != p
                        && ((conn[q] > conn[p] && loads[q] + w <= bound)
                            || (conn[q] > 0
                                && conn[q] >= conn[p]
                                && loads[p] > target
                                && loads[q] + w <= target))
                })
                .max_by(|&a, &b| conn[a].cmp(&conn[b]).then(b.cmp(&a)));
            if let Some(q) = best {
                parts[v] = q;
                loads[p] -= w;
                loads[q] += w;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    let pm = PartitionMap::from_parts(parts, k);
    log::debug!(
        "partitioned {n} vertices into {k} parts: edge cut {}, imbalance {:.3}",
        edge_cut(graph, &pm),
        imbalance(graph, &pm)
    );
    Ok(pm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::graph_traits::tests::TestGraph;

    fn grid(nx: usize, ny: usize) -> TestGraph {
        let id = |i: usize, j: usize| j * nx + i;
        let mut adj = vec![Vec::new(); nx * ny];
        for j in 0..ny {
            for i in 0..nx {
                let v = id(i, j);
                if i > 0 {
                    adj[v].push(id(i - 1, j));
                }
                if j > 0 {
                    adj[v].push(id(i, j - 1));
                }
                if i + 1 < nx {
                    adj[v].push(id(i + 1, j));
                }
                if j + 1 < ny {
                    adj[v].push(id(i, j + 1));
                }
                adj[v].sort_unstable();
            }
        }
        TestGraph { adj }
    }

    #[test]
    fn every_vertex_gets_one_part() {
        let g = grid(6, 4);
        for k in 1..=5 {
            let cfg = PartitionerConfig {
                n_parts: k,
                ..Default::default()
            };
            let pm = partition(&g, &cfg).expect("partition");
            assert_eq!(pm.len(), 24);
            assert!(pm.iter().all(|(_, p)| p < k));
            let covered: usize = (0..k).map(|p| pm.members(p).count()).sum();
            assert_eq!(covered, 24);
        }
    }

    #[test]
    fn partition_is_deterministic() {
        let g = grid(5, 5);
        let cfg = PartitionerConfig {
            n_parts: 3,
            ..Default::default()
        };
        assert_eq!(partition(&g, &cfg).expect("a"), partition(&g, &cfg).expect("b"));
    }

    #[test]
    fn path_halves_are_balanced_and_contiguous() {
        let g = TestGraph::path(10);
        let pm = partition(&g, &PartitionerConfig::default()).expect("partition");
        assert_eq!(part_loads(&g, &pm), vec![5, 5]);
        assert_eq!(edge_cut(&g, &pm), 1);
    }

    #[test]
    fn more_parts_than_vertices_leaves_parts_empty() {
        let g = TestGraph::path(2);
        let cfg = PartitionerConfig {
            n_parts: 4,
            ..Default::default()
        };
        let pm = partition(&g, &cfg).expect("partition");
        assert_eq!(pm.len(), 2);
        assert_ne!(pm.part_of(0), pm.part_of(1));
    }

    #[test]
    fn zero_parts_is_an_error() {
        let cfg = PartitionerConfig {
            n_parts: 0,
            ..Default::default()
        };
        assert_eq!(
            partition(&TestGraph::path(3), &cfg),
            Err(PartitionerError::NoParts)
        );
    }
}
