// Graph trait abstraction for partitioning

/// Undirected graph over vertices `0..num_vertices()`.
///
/// Neighbour lists must be symmetric and free of self loops. Partitioners
/// only read the graph.
pub trait PartitionableGraph {
    fn num_vertices(&self) -> usize;

    /// Neighbours of `v`, sorted ascending.
    fn neighbors(&self, v: usize) -> &[usize];

    /// Load of a vertex; partitions balance the summed weight.
    fn weight(&self, _v: usize) -> u64 {
        1
    }

    /// Degree of a vertex (number of neighbors).
    fn degree(&self, v: usize) -> usize {
        self.neighbors(v).len()
    }

    /// All undirected edges `(u, v)` with `u < v`.
    fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.num_vertices()).flat_map(move |u| {
            self.neighbors(u)
                .iter()
                .copied()
                .filter(move |&v| u < v)
                .map(move |v| (u, v))
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Simple in-memory undirected graph for testing.
    pub(crate) struct TestGraph {
        pub adj: Vec<Vec<usize>>,
    }

    impl TestGraph {
        /// Path 0 - 1 - ... - (n-1).
        pub fn path(n: usize) -> Self {
            let adj = (0..n)
                .map(|v| {
                    let mut nb = Vec::new();
                    if v > 0 {
                        nb.push(v - 1);
                    }
                    if v + 1 < n {
                        nb.push(v + 1);
                    }
                    nb
                })
                .collect();
            Self { adj }
        }
    }

    impl PartitionableGraph for TestGraph {
        fn num_vertices(&self) -> usize {
            self.adj.len()
        }
        fn neighbors(&self, v: usize) -> &[usize] {
            &self.adj[v]
        }
    }

    #[test]
    fn edges_are_listed_once() {
        let g = TestGraph::path(4);
        let edges: Vec<_> = g.edges().collect();
        assert_eq!(edges, vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(g.degree(1), 2);
    }
}
