//! Result descriptions: expected values checked after a run.
//!
//! Each `RESULT DESCRIPTION` line names a field, a discretization, an
//! entity and a quantity:
//!
//! ```text
//! STRUCTURE DIS structure NODE 7 QUANTITY dispx VALUE 1.5e-3 TOLERANCE 1e-9
//! SCATRA DIS scatra DNODE 2 QUANTITY phi VALUE 0.5 TOLERANCE 1e-8
//! ```
//!
//! `DNODE`, `DLINE`, `DSURFACE` and `DVOL` address the node set of a design
//! object, resolved against the design topology when read.

use crate::deck_error::DeckError;
use crate::io::design::{DesignKind, DesignTopology};
use crate::io::line_definition::{InputParameterContainer, LineDefinition};
use once_cell::sync::Lazy;

pub const RESULT_SECTION: &str = "RESULT DESCRIPTION";

/// Fields that may appear at the start of a result line.
pub const RESULT_FIELDS: &[&str] = &[
    "STRUCTURE",
    "FLUID",
    "ALE",
    "SCATRA",
    "THERMAL",
    "LUBRICATION",
    "ELECTROMAGNETIC",
    "POROFLUIDMULTIPHASE",
    "ARTNET",
    "RED_AIRWAY",
    "PARTICLE",
];

/// Entity a result test is evaluated at.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultTarget {
    Node(i64),
    Element(i64),
    /// Nodes of a design object (zero-based id).
    NodeSet {
        kind: DesignKind,
        id: i64,
        nodes: Vec<i64>,
    },
    /// A particle, by its global id.
    Particle(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResultTest {
    pub field: String,
    /// Discretization name; empty for particles.
    pub dis: String,
    pub target: ResultTarget,
    pub quantity: String,
    pub value: f64,
    pub tolerance: f64,
}

/// Parsed result tests of one problem.
#[derive(Clone, Debug, Default)]
pub struct ResultTestManager {
    tests: Vec<ResultTest>,
}

impl ResultTestManager {
    pub fn add(&mut self, test: ResultTest) {
        self.tests.push(test);
    }

    pub fn tests(&self) -> &[ResultTest] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Tests of one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ResultTest> + 'a {
        self.tests.iter().filter(move |t| t.field == field)
    }
}

enum Entity {
    Node,
    Element,
    Design(DesignKind),
}

struct ResultLine {
    field: &'static str,
    entity: Entity,
    def: LineDefinition,
}

fn entity_key(entity: &Entity) -> &'static str {
    match entity {
        Entity::Node => "NODE",
        Entity::Element => "ELEMENT",
        Entity::Design(kind) => kind.tag(),
    }
}

static RESULT_LINES: Lazy<Vec<ResultLine>> = Lazy::new(|| {
    let mut lines = Vec::new();
    for &field in RESULT_FIELDS.iter().filter(|f| **f != "PARTICLE") {
        let entities = [Entity::Node, Entity::Element]
            .into_iter()
            .chain(DesignKind::ALL.into_iter().map(Entity::Design));
        for entity in entities {
            let def = LineDefinition::builder()
                .add_tag(field)
                .add_named_string("DIS")
                .add_named_int(entity_key(&entity))
                .add_named_string("QUANTITY")
                .add_named_double("VALUE")
                .add_named_double("TOLERANCE")
                .add_optional_named_string("NAME")
                .build();
            lines.push(ResultLine { field, entity, def });
        }
    }
    lines.push(ResultLine {
        field: "PARTICLE",
        entity: Entity::Node,
        def: LineDefinition::builder()
            .add_tag("PARTICLE")
            .add_named_int("ID")
            .add_named_string("QUANTITY")
            .add_named_double("VALUE")
            .add_named_double("TOLERANCE")
            .build(),
    });
    lines
});

fn to_test(
    rl: &ResultLine,
    c: &InputParameterContainer,
    design: &DesignTopology,
) -> Result<ResultTest, DeckError> {
    let (dis, target) = if rl.field == "PARTICLE" {
        (String::new(), ResultTarget::Particle(c.get("ID")?))
    } else {
        let id: i64 = c.get(entity_key(&rl.entity))?;
        let target = match rl.entity {
            Entity::Node => ResultTarget::Node(id),
            Entity::Element => ResultTarget::Element(id),
            Entity::Design(kind) => ResultTarget::NodeSet {
                kind,
                id: id - 1,
                nodes: design.nodes(kind, id - 1)?.iter().copied().collect(),
            },
        };
        (c.get("DIS")?, target)
    };
    Ok(ResultTest {
        field: rl.field.to_string(),
        dis,
        target,
        quantity: c.get("QUANTITY")?,
        value: c.get("VALUE")?,
        tolerance: c.get("TOLERANCE")?,
    })
}

/// Parse one result line; the first matching definition wins.
pub fn parse_result_line(line: &str, design: &DesignTopology) -> Result<ResultTest, DeckError> {
    let field = line.split_whitespace().next().unwrap_or_default();
    let mut first_err = None;
    for rl in RESULT_LINES.iter().filter(|rl| rl.field == field) {
        match rl.def.read(line) {
            Ok(c) => return to_test(rl, &c, design),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    Err(first_err.unwrap_or_else(|| DeckError::LineDefinition {
        line: line.to_string(),
        expected: RESULT_FIELDS.join("|"),
        reason: format!("unknown result field `{field}`"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_and_design_targets() {
        let mut design = DesignTopology::default();
        design.insert(DesignKind::Point, 1, 4);
        let t = parse_result_line(
            "STRUCTURE DIS structure NODE 7 QUANTITY dispx VALUE 1.5e-3 TOLERANCE 1e-9",
            &design,
        )
        .expect("node");
        assert_eq!(t.target, ResultTarget::Node(7));
        assert_eq!(t.dis, "structure");
        let t = parse_result_line("SCATRA DIS scatra DNODE 2 QUANTITY phi VALUE 0.5 TOLERANCE 1e-8", &design)
            .expect("dnode");
        assert_eq!(
            t.target,
            ResultTarget::NodeSet {
                kind: DesignKind::Point,
                id: 1,
                nodes: vec![4]
            }
        );
        let p = parse_result_line("PARTICLE ID 3 QUANTITY posx VALUE 0.0 TOLERANCE 1e-12", &design)
            .expect("particle");
        assert_eq!(p.target, ResultTarget::Particle(3));
    }

    #[test]
    fn unknown_field_and_missing_design_fail() {
        let design = DesignTopology::default();
        assert!(parse_result_line("MAGIC DIS x NODE 1 QUANTITY a VALUE 1 TOLERANCE 1", &design).is_err());
        assert!(matches!(
            parse_result_line("FLUID DIS fluid DLINE 1 QUANTITY velx VALUE 1 TOLERANCE 1", &design),
            Err(DeckError::DesignOutOfRange { .. })
        ));
    }
}
