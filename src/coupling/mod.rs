//! Partitioned two-way coupling between a structure and a particle field.

pub mod driver;
pub mod interface;
pub mod params;
pub mod relaxation;
pub mod restart;

pub use driver::{
    ConvergenceNorms, InterfaceState, ParticleField, PartitionedCoupling, StructureField,
    check_convergence,
};
pub use interface::{InterfaceForceAssembler, InterfaceVector};
pub use params::{CouplingAlgorithm, CouplingParams, PASI_SECTION};
pub use relaxation::{Relaxation, RelaxationScheme, aitken_omega};
pub use restart::CouplingRestart;
