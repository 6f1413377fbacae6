//! Degree-of-freedom numbering.
//!
//! A standard dofset draws its global dof ids from a [`DofRegistry`] shared
//! by all discretizations of one problem, so ids never collide across
//! fields. An independent dofset numbers from zero on its own; micro-scale
//! discretizations without nested parallelism use it.

use crate::algs::collective::all_gather_bytes;
use crate::algs::communicator::Communicator;
use crate::algs::wire::{WireI64, cast_slice, cast_slice_from};
use crate::deck_error::DeckError;
use crate::discretization::node::{Element, Node};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

/// Running dof counter shared by the standard dofsets of one problem.
#[derive(Debug, Default)]
pub struct DofRegistry {
    next: Mutex<usize>,
}

impl DofRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve `count` consecutive ids, returning the first.
    fn reserve(&self, count: usize) -> usize {
        let mut next = self.next.lock();
        let first = *next;
        *next += count;
        first
    }

    pub fn max_gid(&self) -> Option<usize> {
        self.next.lock().checked_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DofSetKind {
    Standard,
    Independent,
}

/// Dof numbering of one discretization.
#[derive(Clone, Debug)]
pub struct DofSet {
    kind: DofSetKind,
    registry: Arc<DofRegistry>,
    numbering: BTreeMap<i64, Range<usize>>,
    num_global: usize,
}

impl DofSet {
    pub fn standard(registry: Arc<DofRegistry>) -> Self {
        Self {
            kind: DofSetKind::Standard,
            registry,
            numbering: BTreeMap::new(),
            num_global: 0,
        }
    }

    pub fn independent() -> Self {
        Self {
            kind: DofSetKind::Independent,
            registry: DofRegistry::new(),
            numbering: BTreeMap::new(),
            num_global: 0,
        }
    }

    pub fn kind(&self) -> &DofSetKind {
        &self.kind
    }

    /// Dof ids of a column node.
    pub fn dofs(&self, node: i64) -> Option<Range<usize>> {
        self.numbering.get(&node).cloned()
    }

    pub fn num_global_dofs(&self) -> usize {
        self.num_global
    }

    /// Number all nodes. Collective: every rank contributes its row nodes
    /// with their dof count, ids are handed out in global node id order.
    pub(crate) fn assign<C: Communicator>(
        &mut self,
        comm: &C,
        nodes: &BTreeMap<i64, Node>,
        elements: &BTreeMap<i64, Element>,
    ) -> Result<(), DeckError> {
        let mut ndof: BTreeMap<i64, usize> = BTreeMap::new();
        for e in elements.values() {
            for &n in &e.nodes {
                let d = ndof.entry(n).or_default();
                *d = (*d).max(e.dofs_per_node);
            }
        }
        let rank = comm.rank();
        let mine: Vec<WireI64> = nodes
            .values()
            .filter(|n| n.owner == rank)
            .flat_map(|n| {
                let d = ndof.get(&n.gid).copied().unwrap_or(0);
                [WireI64::of(n.gid), WireI64::of(d as i64)]
            })
            .collect();
        let pieces = all_gather_bytes(comm, cast_slice(&mine))?;
        let mut global: Vec<(i64, usize)> = pieces
            .iter()
            .flat_map(|p| {
                cast_slice_from::<WireI64>(p)
                    .chunks_exact(2)
                    .map(|pair| (pair[0].get(), pair[1].get() as usize))
                    .collect::<Vec<_>>()
            })
            .collect();
        global.sort_unstable();
        let total: usize = global.iter().map(|&(_, d)| d).sum();
        let first = match self.kind {
            DofSetKind::Standard => self.registry.reserve(total),
            DofSetKind::Independent => 0,
        };
        self.numbering.clear();
        let mut next = first;
        for (gid, d) in global {
            if nodes.contains_key(&gid) {
                self.numbering.insert(gid, next..next + d);
            }
            next += d;
        }
        self.num_global = total;
        Ok(())
    }
}
