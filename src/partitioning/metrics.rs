//! Partitioning metrics utilities.
//!
//! Edge cut and load balance of a partition, used to log partition quality
//! and in tests.

use super::{PartitionMap, PartitionableGraph};

/// Computes the edge cut of a partitioning (O(E)).
///
/// The edge cut is the number of edges that cross between different parts.
pub fn edge_cut<G: PartitionableGraph>(g: &G, pm: &PartitionMap) -> usize {
    g.edges()
        .filter(|&(u, v)| pm.part_of(u) != pm.part_of(v))
        .count()
}

/// Summed vertex weight of every part.
pub fn part_loads<G: PartitionableGraph>(g: &G, pm: &PartitionMap) -> Vec<u64> {
    let mut loads = vec![0u64; pm.num_parts()];
    for (v, p) in pm.iter() {
        loads[p] += g.weight(v);
    }
    loads
}

/// Heaviest part load over the mean load; 1.0 is perfect balance.
pub fn imbalance<G: PartitionableGraph>(g: &G, pm: &PartitionMap) -> f64 {
    let loads = part_loads(g, pm);
    let total: u64 = loads.iter().sum();
    if total == 0 || loads.is_empty() {
        return 1.0;
    }
    let mean = total as f64 / loads.len() as f64;
    loads.iter().copied().max().unwrap_or(0) as f64 / mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::graph_traits::tests::TestGraph;

    #[test]
    fn path_split_in_half_cuts_one_edge() {
        let g = TestGraph::path(4);
        let pm = PartitionMap::from_parts(vec![0, 0, 1, 1], 2);
        assert_eq!(edge_cut(&g, &pm), 1);
        assert_eq!(part_loads(&g, &pm), vec![2, 2]);
        assert!((imbalance(&g, &pm) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lopsided_partition_reports_imbalance() {
        let g = TestGraph::path(4);
        let pm = PartitionMap::from_parts(vec![0, 0, 0, 1], 2);
        assert_eq!(edge_cut(&g, &pm), 1);
        assert!((imbalance(&g, &pm) - 1.5).abs() < 1e-12);
    }
}
