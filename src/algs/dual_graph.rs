//! Build a CSR (compressed-sparse-row) *dual graph* of an element list.
//
// Each element is a vertex; an undirected edge joins any two elements that
// share at least one node.
//
// Returned in ParMETIS-ready CSR triples:
//
// * `xadj[i] .. xadj[i+1]`   = neighbour list of element *i*
// * `adjncy`                 = concatenated neighbour vertices
// * `vwgt[i]`                = vertex weight, default = 1
//
// The graph is symmetric, self-free, and neighbour lists are sorted, so the
// same element list gives the same graph on every rank.

use std::collections::{BTreeMap, BTreeSet};

use crate::partitioning::graph_traits::PartitionableGraph;

/// CSR triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualGraph {
    pub xadj: Vec<usize>,
    pub adjncy: Vec<usize>,
    pub vwgt: Vec<i32>, // ParMETIS expects i32
}

impl DualGraph {
    pub fn num_vertices(&self) -> usize {
        self.xadj.len().saturating_sub(1)
    }

    pub fn neighbors_of(&self, v: usize) -> &[usize] {
        &self.adjncy[self.xadj[v]..self.xadj[v + 1]]
    }
}

impl PartitionableGraph for DualGraph {
    fn num_vertices(&self) -> usize {
        DualGraph::num_vertices(self)
    }

    fn neighbors(&self, v: usize) -> &[usize] {
        self.neighbors_of(v)
    }

    fn weight(&self, v: usize) -> u64 {
        self.vwgt[v].max(0) as u64
    }
}

/// Build the dual graph. Vertex `i` is the `i`-th entry of `elements`,
/// given as the node gids of each element.
pub fn build_dual<'a>(elements: impl IntoIterator<Item = &'a [i64]>) -> DualGraph {
    // 1. node -> elements touching it
    let mut touching: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    let mut n = 0;
    for (idx, nodes) in elements.into_iter().enumerate() {
        for &node in nodes {
            let list = touching.entry(node).or_default();
            if list.last() != Some(&idx) {
                list.push(idx);
            }
        }
        n = idx + 1;
    }

    // 2. every pair sharing a node is an edge
    let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for list in touching.values() {
        for (i, &a) in list.iter().enumerate() {
            for &b in &list[i + 1..] {
                adj[a].insert(b);
                adj[b].insert(a);
            }
        }
    }

    // 3. sets -> CSR
    let mut xadj = Vec::with_capacity(n + 1);
    let mut adjncy = Vec::new();
    xadj.push(0);
    for nbrs in &adj {
        adjncy.extend(nbrs.iter().copied());
        xadj.push(adjncy.len());
    }

    DualGraph {
        xadj,
        adjncy,
        vwgt: vec![1; n],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_graph_two_cells() {
        // two triangles sharing an edge, a third touching only at node 4
        let cells: Vec<Vec<i64>> = vec![vec![1, 2, 3], vec![2, 3, 4], vec![4, 5, 6]];
        let dg = build_dual(cells.iter().map(Vec::as_slice));
        assert_eq!(dg.num_vertices(), 3);
        assert_eq!(dg.neighbors_of(0), &[1]);
        assert_eq!(dg.neighbors_of(1), &[0, 2]);
        assert_eq!(dg.neighbors_of(2), &[1]);
        assert_eq!(dg.vwgt, vec![1, 1, 1]);
    }

    #[test]
    fn isolated_elements_have_no_edges() {
        let cells: Vec<Vec<i64>> = vec![vec![1, 2], vec![3, 4]];
        let dg = build_dual(cells.iter().map(Vec::as_slice));
        assert_eq!(dg.xadj, vec![0, 0, 0]);
        assert!(dg.adjncy.is_empty());
    }
}
