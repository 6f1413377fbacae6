//! Boundary and coupling conditions on design objects.
//!
//! A condition section such as `--DESIGN SURF DIRICH CONDITIONS` holds one
//! line per design object, `E <id> - <parameters>`, with `id` counting from
//! 1. The node cloud of the design object is attached when the conditions
//! are distributed to the discretizations.

use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use crate::io::design::DesignKind;
use crate::io::line_definition::{InputParameterContainer, LineDefinition, LineDefinitionBuilder};
use crate::io::reader::DeckReader;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// One condition instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Condition name shared by all geometries, e.g. `Dirichlet`.
    pub name: String,
    /// Zero-based design object id.
    pub id: i64,
    pub kind: DesignKind,
    pub params: InputParameterContainer,
    /// Node cloud of the design object, sorted.
    pub nodes: Arc<Vec<i64>>,
}

impl Condition {
    /// Copy without element geometry; nodes and parameters are kept.
    pub fn copy_without_geometry(&self) -> Self {
        self.clone()
    }

    /// Whether `gid` lies in the node cloud.
    pub fn contains_node(&self, gid: i64) -> bool {
        self.nodes.binary_search(&gid).is_ok()
    }
}

/// Schema of one condition section.
#[derive(Debug)]
pub struct ConditionDefinition {
    /// Full section name.
    pub section: String,
    pub name: String,
    pub description: String,
    pub kind: DesignKind,
    line: LineDefinition,
}

impl ConditionDefinition {
    fn new(
        suffix: &str,
        name: impl Into<String>,
        description: &str,
        kind: DesignKind,
        body: impl FnOnce(LineDefinitionBuilder) -> LineDefinitionBuilder,
    ) -> Self {
        Self {
            section: format!("{} {suffix}", kind.condition_prefix()),
            name: name.into(),
            description: format!("{} {description}", kind.label()),
            kind,
            line: body(LineDefinition::builder().add_named_int("E")).build(),
        }
    }

    /// Parse every line of the section into conditions without nodes.
    pub fn read<C: Communicator>(&self, reader: &DeckReader<C>) -> Result<Vec<Condition>, DeckError> {
        let mut out = Vec::new();
        for line in reader.lines_in_section(&self.section) {
            let line = line?;
            out.push(self.read_line(&line)?);
        }
        Ok(out)
    }

    fn read_line(&self, line: &str) -> Result<Condition, DeckError> {
        // a lone `-` separates the id from the parameters
        let joined = line
            .split_whitespace()
            .enumerate()
            .filter(|&(i, t)| !(i == 2 && t == "-"))
            .map(|(_, t)| t)
            .collect::<Vec<_>>()
            .join(" ");
        let params = self.line.read(&joined)?;
        let id: i64 = params.get("E")?;
        if id < 1 {
            return Err(DeckError::LineDefinition {
                line: line.to_string(),
                expected: self.line.to_string(),
                reason: "design ids count from 1".into(),
            });
        }
        Ok(Condition {
            name: self.name.clone(),
            id: id - 1,
            kind: self.kind,
            params,
            nodes: Arc::new(Vec::new()),
        })
    }
}

fn dof_values(b: LineDefinitionBuilder) -> LineDefinitionBuilder {
    b.add_named_int("NUMDOF")
        .add_named_int_vector_from("ONOFF", "NUMDOF")
        .add_named_double_vector_from("VAL", "NUMDOF")
        .add_named_int_vector_from("FUNCT", "NUMDOF")
}

/// Every condition section the reader knows.
pub static CONDITION_DEFINITIONS: Lazy<Vec<ConditionDefinition>> = Lazy::new(|| {
    let mut defs = Vec::new();
    for kind in DesignKind::ALL {
        defs.push(ConditionDefinition::new(
            "DIRICH CONDITIONS",
            "Dirichlet",
            "Dirichlet",
            kind,
            |b| dof_values(b).add_optional_named_string("TAG").with_default("none"),
        ));
        defs.push(ConditionDefinition::new(
            "NEUMANN CONDITIONS",
            format!("{}Neumann", &kind.label()[1..]),
            "Neumann",
            kind,
            |b| dof_values(b).add_optional_named_string("TYPE").with_default("Live"),
        ));
        defs.push(ConditionDefinition::new(
            "INITIAL FIELD CONDITIONS",
            "Initfield",
            "Initial field",
            kind,
            |b| b.add_named_string("FIELD").add_named_int("FUNCT"),
        ));
    }
    for kind in [DesignKind::Line, DesignKind::Surface] {
        defs.push(ConditionDefinition::new(
            "FSI COUPLING CONDITIONS",
            "FSICoupling",
            "FSI Coupling",
            kind,
            |b| b.add_named_int("coupling_id"),
        ));
    }
    defs.push(ConditionDefinition::new(
        "PARTICLE WALL",
        "ParticleWall",
        "particle wall",
        DesignKind::Surface,
        |b| b.add_optional_named_int("MAT"),
    ));
    defs
});
