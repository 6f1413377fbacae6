//! Initial particles from the `--PARTICLES` section.

use crate::deck_error::DeckError;
use crate::io::line_definition::LineDefinition;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const PARTICLE_SECTION: &str = "PARTICLES";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Zero-based position in the section, unique over all ranks.
    pub gid: usize,
    pub phase: String,
    pub position: [f64; 3],
    pub radius: Option<f64>,
    pub mass: Option<f64>,
}

static PARTICLE_LINE: Lazy<LineDefinition> = Lazy::new(|| {
    LineDefinition::builder()
        .add_named_string("TYPE")
        .add_named_double_vector("POS", 3)
        .add_optional_named_double("RAD")
        .add_optional_named_double("MASS")
        .build()
});

/// Parse `TYPE <phase> POS x y z [RAD r] [MASS m]`.
pub fn parse_particle(gid: usize, line: &str) -> Result<Particle, DeckError> {
    let c = PARTICLE_LINE.read(line)?;
    let pos: Vec<f64> = c.get("POS")?;
    Ok(Particle {
        gid,
        phase: c.get("TYPE")?,
        position: [pos[0], pos[1], pos[2]],
        radius: c.get_opt("RAD"),
        mass: c.get_opt("MASS"),
    })
}
