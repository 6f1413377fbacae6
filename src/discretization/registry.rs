//! Element types known to the element readers.
//!
//! An element line reads `<gid> <TYPE> <SHAPE> <node gids...> <tail>`; the
//! registry says which shapes a type accepts, how many dofs its nodes carry
//! and how the tail (`MAT <id>` plus element options) is laid out.

use crate::deck_error::DeckError;
use crate::discretization::cell_shape::CellShape;
use crate::discretization::node::Element;
use crate::io::line_definition::LineDefinition;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use CellShape::*;

const SOLID_SHAPES: &[CellShape] = &[Hex8, Hex20, Hex27, Tet4, Tet10, Wedge6, Pyramid5, Nurbs8, Nurbs27];
const PLANE_SHAPES: &[CellShape] = &[Quad4, Quad8, Quad9, Tri3, Tri6, Nurbs4, Nurbs9];
const FLUID_SHAPES: &[CellShape] = &[
    Hex8, Hex20, Hex27, Tet4, Tet10, Wedge6, Pyramid5, Quad4, Quad8, Quad9, Tri3, Tri6, Nurbs4,
    Nurbs9, Nurbs8, Nurbs27,
];
const SCALAR_SHAPES: &[CellShape] = &[
    Hex8, Hex20, Hex27, Tet4, Tet10, Wedge6, Pyramid5, Quad4, Quad8, Quad9, Tri3, Tri6, Line2,
    Line3, Nurbs2, Nurbs3, Nurbs4, Nurbs9, Nurbs8, Nurbs27,
];
const LINE_SHAPES: &[CellShape] = &[Line2];
const LUBRICATION_SHAPES: &[CellShape] = &[Quad4, Quad8, Quad9, Tri3, Tri6, Line2, Line3];
const ELEMAG_SHAPES: &[CellShape] = &[Hex8, Hex20, Hex27, Tet4, Tet10, Quad4, Quad8, Quad9, Tri3, Tri6];

/// Schema of one element type.
#[derive(Debug)]
pub struct ElementDefinition {
    pub element_type: &'static str,
    pub shapes: &'static [CellShape],
    dofs: fn(CellShape) -> usize,
    pub tail: LineDefinition,
}

impl ElementDefinition {
    pub fn dofs_per_node(&self, shape: CellShape) -> usize {
        (self.dofs)(shape)
    }
}

/// Lookup table of element types.
#[derive(Debug)]
pub struct ElementRegistry {
    defs: BTreeMap<&'static str, ElementDefinition>,
}

static ELEMENT_REGISTRY: Lazy<ElementRegistry> = Lazy::new(ElementRegistry::build);

fn mat_tail() -> LineDefinition {
    LineDefinition::builder().add_named_int("MAT").build()
}

impl ElementRegistry {
    /// The process-wide registry.
    pub fn global() -> &'static ElementRegistry {
        &ELEMENT_REGISTRY
    }

    fn build() -> Self {
        let mut defs = BTreeMap::new();
        let mut add = |element_type: &'static str,
                       shapes: &'static [CellShape],
                       dofs: fn(CellShape) -> usize,
                       tail: LineDefinition| {
            defs.insert(
                element_type,
                ElementDefinition {
                    element_type,
                    shapes,
                    dofs,
                    tail,
                },
            );
        };
        add(
            "SOLID",
            SOLID_SHAPES,
            |_| 3,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_string("KINEM")
                .with_default("nonlinear")
                .add_optional_named_string("TECH")
                .build(),
        );
        add(
            "WALL",
            PLANE_SHAPES,
            |_| 2,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_string("KINEM")
                .with_default("nonlinear")
                .add_optional_named_string("EAS")
                .add_optional_named_double("THICK")
                .with_default(1.0)
                .add_optional_named_string("STRESS_STRAIN")
                .with_default("plane_stress")
                .add_optional_named_int_vector("GP", 2)
                .build(),
        );
        add(
            "FLUID",
            FLUID_SHAPES,
            |s| s.dimension() + 1,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_string("NA")
                .with_default("Euler")
                .build(),
        );
        add("ALE2", PLANE_SHAPES, |_| 2, mat_tail());
        add("ALE3", SOLID_SHAPES, |_| 3, mat_tail());
        add(
            "TRANSP",
            SCALAR_SHAPES,
            |_| 1,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_string("TYPE")
                .with_default("Std")
                .add_optional_named_string("FIBER1")
                .build(),
        );
        add("THERMO", SCALAR_SHAPES, |_| 1, mat_tail());
        add(
            "ART",
            LINE_SHAPES,
            |_| 2,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_int("GP")
                .add_optional_named_double("DIAM")
                .build(),
        );
        add(
            "RED_AIRWAY",
            LINE_SHAPES,
            |_| 1,
            LineDefinition::builder()
                .add_named_int("MAT")
                .add_optional_named_string("TYPE")
                .with_default("Resistive")
                .build(),
        );
        add("LUBRICATION", LUBRICATION_SHAPES, |_| 1, mat_tail());
        add("POROFLUIDMULTIPHASE", SCALAR_SHAPES, |_| 1, mat_tail());
        for elemag in ["ELECTROMAGNETIC", "ELECTROMAGNETICDIFF"] {
            add(
                elemag,
                ELEMAG_SHAPES,
                |_| 0,
                LineDefinition::builder()
                    .add_named_int("MAT")
                    .add_optional_named_int("DEG")
                    .with_default(1)
                    .add_optional_named_string("SPC")
                    .build(),
            );
        }
        Self { defs }
    }

    pub fn get(&self, element_type: &str) -> Option<&ElementDefinition> {
        self.defs.get(element_type)
    }

    pub fn element_types(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().copied()
    }

    /// Element type token of an element line, without parsing the rest.
    pub fn element_type_of(line: &str) -> Option<&str> {
        line.split_whitespace().nth(1)
    }

    /// Parse one element line.
    pub fn parse_line(&self, line: &str) -> Result<Element, DeckError> {
        let bad = |reason: String| DeckError::LineDefinition {
            line: line.to_string(),
            expected: "<gid> <TYPE> <SHAPE> <node gids...> MAT <int> ...".into(),
            reason,
        };
        let mut tokens = line.split_whitespace();
        let gid_tok = tokens.next().ok_or_else(|| bad("empty element line".into()))?;
        let gid: i64 = gid_tok
            .parse()
            .map_err(|_| bad(format!("element id `{gid_tok}` is not an integer")))?;
        if gid < 1 {
            return Err(bad(format!("element id {gid} must be positive")));
        }
        let element_type = tokens.next().ok_or_else(|| bad("missing element type".into()))?;
        let shape_tok = tokens.next().ok_or_else(|| bad("missing cell shape".into()))?;
        let unknown = || DeckError::UnknownElement {
            element_type: element_type.to_string(),
            shape: shape_tok.to_string(),
            line: line.to_string(),
        };
        let def = self.get(element_type).ok_or_else(unknown)?;
        let shape: CellShape = shape_tok.parse().map_err(|_| unknown())?;
        if !def.shapes.contains(&shape) {
            return Err(unknown());
        }
        let nodes = (0..shape.num_nodes())
            .map(|i| {
                let t = tokens
                    .next()
                    .ok_or_else(|| bad(format!("{shape} needs {} nodes", shape.num_nodes())))?;
                t.parse::<i64>()
                    .map_err(|_| bad(format!("node {} `{t}` is not an integer", i + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rest: Vec<&str> = tokens.collect();
        let params = def.tail.read(&rest.join(" "))?;
        let material = params.get_opt::<i32>("MAT");
        Ok(Element {
            gid,
            element_type: element_type.to_string(),
            shape,
            nodes,
            material,
            dofs_per_node: def.dofs_per_node(shape),
            params,
            owner: 0,
        })
    }
}
