//! Materials: the definition table and the per-problem material map.

pub mod definitions;
pub mod map;

pub use definitions::{MATERIAL_DEFINITIONS, MaterialDefinition, MaterialKind, find_definition};
pub use map::{Material, MaterialData, MaterialMap, MaterialRecipe, MicroScale};
