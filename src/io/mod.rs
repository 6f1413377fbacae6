//! Input deck I/O.
//!
//! The [`reader::DeckReader`] shares the deck across ranks; the remaining
//! modules parse its sections into parameters, typed lines, design
//! topology, knot vectors and distributed meshes. [`writer`] holds the
//! per-discretization output.

pub mod design;
pub mod key_value;
pub mod knots;
pub mod line_definition;
pub mod mesh_reader;
pub mod reader;
pub mod section_store;
pub mod writer;

pub use key_value::{read_key_value, read_parameters_in_section};
pub use line_definition::{InputParameterContainer, LineDefinition, read_all_lines_in_section};
pub use mesh_reader::{DomainReader, ElementReader, MeshReader};
pub use reader::{DeckReader, ReaderConfig};
pub use section_store::{SectionLines, SectionPosition, normalize_section_name};
pub use writer::{DiscretizationWriter, OutputControl};
