//! Interface dof vectors and the assembly of particle wall forces onto them.
//!
//! An [`InterfaceVector`] holds the values of the interface dofs owned by
//! this rank, sorted by global dof id. Norms and dot products are reduced
//! over the coupling communicator, so every rank sees the same number.

use crate::algs::collective::{
    all_gather_bytes, all_reduce_sum_f64, all_reduce_sum_i64, exchange_bytes,
};
use crate::algs::communicator::Communicator;
use crate::algs::wire::{WireDofValue, WireLen, cast_slice, cast_slice_from};
use crate::deck_error::DeckError;
use itertools::Itertools;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterfaceVector {
    gids: Vec<usize>,
    values: Vec<f64>,
}

impl InterfaceVector {
    /// Zero vector over `gids`; duplicates are dropped.
    pub fn zeros(gids: impl IntoIterator<Item = usize>) -> Self {
        let gids: Vec<usize> = gids.into_iter().sorted_unstable().dedup().collect();
        let values = vec![0.0; gids.len()];
        Self { gids, values }
    }

    /// Vector from `(gid, value)` pairs; values of repeated gids are summed.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut summed: BTreeMap<usize, f64> = BTreeMap::new();
        for (gid, v) in pairs {
            *summed.entry(gid).or_default() += v;
        }
        let (gids, values) = summed.into_iter().unzip();
        Self { gids, values }
    }

    pub fn gids(&self) -> &[usize] {
        &self.gids
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.gids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gids.is_empty()
    }

    pub fn get(&self, gid: usize) -> Option<f64> {
        self.gids.binary_search(&gid).ok().map(|i| self.values[i])
    }

    /// Add `v` at `gid`. Returns false if `gid` is not part of the vector.
    pub fn add_at(&mut self, gid: usize, v: f64) -> bool {
        match self.gids.binary_search(&gid) {
            Ok(i) => {
                self.values[i] += v;
                true
            }
            Err(_) => false,
        }
    }

    pub fn put_scalar(&mut self, v: f64) {
        self.values.iter_mut().for_each(|x| *x = v);
    }

    fn check_layout(&self, other: &Self) -> Result<(), DeckError> {
        if self.gids == other.gids {
            Ok(())
        } else {
            Err(DeckError::InterfaceMismatch(format!(
                "layouts of {} and {} dofs differ",
                self.len(),
                other.len()
            )))
        }
    }

    /// `self = a * other + b * self`.
    pub fn update(&mut self, a: f64, other: &Self, b: f64) -> Result<(), DeckError> {
        self.check_layout(other)?;
        for (x, y) in self.values.iter_mut().zip(&other.values) {
            *x = a * y + b * *x;
        }
        Ok(())
    }

    /// `self - other`.
    pub fn difference(&self, other: &Self) -> Result<Self, DeckError> {
        let mut d = self.clone();
        d.update(-1.0, other, 1.0)?;
        Ok(d)
    }

    fn local_dot(&self, other: &Self) -> Result<f64, DeckError> {
        self.check_layout(other)?;
        Ok(self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum())
    }

    /// Dot product over all ranks of `comm`.
    pub fn dot<C: Communicator>(&self, other: &Self, comm: &C) -> Result<f64, DeckError> {
        all_reduce_sum_f64(comm, self.local_dot(other)?)
    }

    pub fn norm2<C: Communicator>(&self, comm: &C) -> Result<f64, DeckError> {
        Ok(self.dot(self, comm)?.sqrt())
    }

    /// Number of dofs over all ranks of `comm`.
    pub fn global_len<C: Communicator>(&self, comm: &C) -> Result<usize, DeckError> {
        let n = all_reduce_sum_i64(comm, self.len() as i64)?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

/// How particle wall forces reach the structural interface dofs.
#[derive(Clone, Debug)]
pub enum InterfaceForceAssembler {
    /// Both fields are distributed alike; every contribution is local.
    Local,
    /// Contributions are sent to the rank owning the interface dof.
    Export { owners: BTreeMap<usize, usize> },
}

impl InterfaceForceAssembler {
    /// Build the export variant from the dofs each rank owns. Collective.
    pub fn export<C: Communicator>(comm: &C, owned: &InterfaceVector) -> Result<Self, DeckError> {
        let mine: Vec<WireLen> = owned.gids().iter().map(|&g| WireLen::new(g)).collect();
        let all = all_gather_bytes(comm, cast_slice(&mine))?;
        let mut owners = BTreeMap::new();
        for (rank, piece) in all.iter().enumerate() {
            for gid in cast_slice_from::<WireLen>(piece) {
                owners.insert(gid.get(), rank);
            }
        }
        Ok(Self::Export { owners })
    }

    /// Overwrite `target` with the sum of all `contributions` over all ranks.
    /// Collective for both variants: a contribution no rank can take fails
    /// the assembly on every rank.
    pub fn assemble<C: Communicator>(
        &self,
        comm: &C,
        contributions: &[(usize, f64)],
        target: &mut InterfaceVector,
    ) -> Result<(), DeckError> {
        target.put_scalar(0.0);
        match self {
            Self::Local => {
                let unknown = contributions
                    .iter()
                    .filter(|&&(gid, v)| !target.add_at(gid, v))
                    .count();
                let unknown = all_reduce_sum_i64(comm, unknown as i64)?;
                if unknown > 0 {
                    return Err(DeckError::InterfaceMismatch(format!(
                        "{unknown} wall force contribution(s) on dofs not owned by the contributing rank"
                    )));
                }
                Ok(())
            }
            Self::Export { owners } => {
                let mut outgoing: Vec<Vec<WireDofValue>> = vec![Vec::new(); comm.size()];
                let mut unknown = 0i64;
                for &(gid, v) in contributions {
                    match owners.get(&gid) {
                        Some(&owner) => outgoing[owner].push(WireDofValue::new(gid, v)),
                        None => unknown += 1,
                    }
                }
                // agree before any rank starts sending
                let unknown = all_reduce_sum_i64(comm, unknown)?;
                if unknown > 0 {
                    return Err(DeckError::InterfaceMismatch(format!(
                        "{unknown} wall force contribution(s) on dofs no rank owns"
                    )));
                }
                let outgoing = outgoing.iter().map(|r| cast_slice(r).to_vec()).collect();
                let mut misplaced = 0i64;
                for piece in exchange_bytes(comm, outgoing)? {
                    for r in cast_slice_from::<WireDofValue>(&piece) {
                        if !target.add_at(r.gid(), r.value()) {
                            misplaced += 1;
                        }
                    }
                }
                let misplaced = all_reduce_sum_i64(comm, misplaced)?;
                if misplaced > 0 {
                    return Err(DeckError::InterfaceMismatch(format!(
                        "{misplaced} exported force(s) arrived on a rank not owning the dof"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn vector_arithmetic_checks_layout() {
        let mut a = InterfaceVector::from_pairs([(3, 1.0), (1, 2.0), (3, 1.0)]);
        assert_eq!(a.gids(), &[1, 3]);
        assert_eq!(a.get(3), Some(2.0));
        let b = InterfaceVector::zeros([3, 1]);
        a.update(1.0, &b, 0.5).expect("same layout");
        assert_eq!(a.values(), &[1.0, 1.0]);
        assert!((a.norm2(&NoComm).expect("norm") - 2f64.sqrt()).abs() < 1e-15);
        let c = InterfaceVector::zeros([1]);
        assert!(matches!(a.difference(&c), Err(DeckError::InterfaceMismatch(_))));
    }

    #[test]
    fn local_assembly_rejects_foreign_dofs() {
        let mut f = InterfaceVector::zeros([0, 1]);
        InterfaceForceAssembler::Local
            .assemble(&NoComm, &[(0, 1.5), (0, 0.5), (1, -1.0)], &mut f)
            .expect("assemble");
        assert_eq!(f.values(), &[2.0, -1.0]);
        assert!(
            InterfaceForceAssembler::Local
                .assemble(&NoComm, &[(7, 1.0)], &mut f)
                .is_err()
        );
    }

    #[test]
    fn a_foreign_dof_on_one_rank_fails_the_local_assembly_everywhere() {
        // only rank 0 pushes onto a dof it does not own; rank 1 must not be
        // left in the next reduction on its own
        let world = ThreadComm::world(2);
        let results: Vec<(bool, f64)> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .cloned()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank();
                        let mut force = InterfaceVector::zeros([r]);
                        let contributions = if r == 0 { vec![(0, 1.0), (5, 1.0)] } else { vec![(1, 2.0)] };
                        let failed = matches!(
                            InterfaceForceAssembler::Local.assemble(&comm, &contributions, &mut force),
                            Err(DeckError::InterfaceMismatch(_))
                        );
                        (failed, force.global_len(&comm).expect("still in step") as f64)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank panicked"))
                .collect()
        });
        assert_eq!(results, vec![(true, 2.0), (true, 2.0)]);
    }

    #[test]
    fn export_sums_contributions_on_the_owner() {
        // rank r owns dofs 2r and 2r+1; every rank pushes 1.0 onto every dof
        let world = ThreadComm::world(3);
        let results: Vec<Vec<f64>> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .cloned()
                .map(|comm| {
                    s.spawn(move || {
                        let r = comm.rank();
                        let mut force = InterfaceVector::zeros([2 * r, 2 * r + 1]);
                        let asm = InterfaceForceAssembler::export(&comm, &force).expect("owners");
                        let contributions: Vec<_> = (0..6).map(|g| (g, 1.0 + r as f64)).collect();
                        asm.assemble(&comm, &contributions, &mut force).expect("assemble");
                        force.values().to_vec()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank panicked"))
                .collect()
        });
        for values in results {
            assert_eq!(values, vec![6.0, 6.0]);
        }
    }
}
