#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-deck
//!
//! mesh-deck reads the input deck of a multiphysics finite-element run on
//! every rank of a communicator, builds the discretizations the problem type
//! asks for, distributes their meshes, and drives the partitioned two-way
//! coupling of a structure with a particle field.
//!
//! ## Features
//! - Distributed deck reader: rank 0 reads, every rank sees the same sections
//! - Key/value parameter sections and typed line definitions
//! - Field plans for every supported problem type, polynomial and NURBS
//! - Element and box-domain mesh readers with a deterministic partitioner
//! - Problem slots for multiscale materials, each with its own sub-communicator
//! - Dirichlet-Neumann coupling with constant or Aitken relaxation
//!
//! ## Determinism
//!
//! Partitioning and colors are computed redundantly from data every rank
//! holds, so runs with the same deck and rank count give the same layout.
//! Collective phases either succeed on every rank or return the same error on
//! every rank.
//!
//! ## Communicators
//!
//! [`NoComm`](algs::communicator::NoComm) runs serially,
//! [`ThreadComm`](algs::communicator::ThreadComm) models ranks as threads of
//! one process, and `MpiComm` (feature `mpi-support`) wraps an MPI
//! communicator.

pub mod algs;
pub mod condition;
pub mod config;
pub mod coupling;
pub mod deck_error;
pub mod discretization;
pub mod io;
pub mod material;
pub mod multiscale;
pub mod partitioning;
pub mod problem;

pub use deck_error::DeckError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::config::ParameterList;
    pub use crate::coupling::{
        CouplingParams, InterfaceForceAssembler, InterfaceState, InterfaceVector, ParticleField,
        PartitionedCoupling, StructureField,
    };
    pub use crate::deck_error::DeckError;
    pub use crate::discretization::{Discretization, DiscretizationKind};
    pub use crate::io::{DeckReader, MeshReader};
    pub use crate::material::MaterialMap;
    pub use crate::problem::read::read_input;
    pub use crate::problem::{CommunicatorBundle, Problem, ProblemSet, ProblemType, ShapeFunctionType};
}
