//! Discretizations: the per-field meshes a problem is built from.

pub mod cell_shape;
pub mod discret;
pub mod dofset;
pub mod faces;
pub mod field_plan;
pub mod kind;
pub mod knots;
pub mod node;
pub mod registry;

pub use cell_shape::CellShape;
pub use discret::Discretization;
pub use dofset::{DofRegistry, DofSet, DofSetKind};
pub use faces::{Face, FaceStructure};
pub use field_plan::{FieldFlags, FieldSpec, ReaderSpec, plan_fields};
pub use kind::DiscretizationKind;
pub use knots::{DirectionKnots, KnotType, KnotVector, PatchKnots};
pub use node::{Element, Node};
pub use registry::{ElementDefinition, ElementRegistry};
