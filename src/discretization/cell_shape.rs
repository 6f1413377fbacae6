//! Cell shapes as spelled in element lines.

use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element shape.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CellShape {
    Point1,
    Line2,
    Line3,
    Tri3,
    Tri6,
    Quad4,
    Quad8,
    Quad9,
    Tet4,
    Tet10,
    Hex8,
    Hex20,
    Hex27,
    Wedge6,
    Pyramid5,
    Nurbs2,
    Nurbs3,
    Nurbs4,
    Nurbs9,
    Nurbs8,
    Nurbs27,
}

const ALL_SHAPES: [CellShape; 21] = [
    CellShape::Point1,
    CellShape::Line2,
    CellShape::Line3,
    CellShape::Tri3,
    CellShape::Tri6,
    CellShape::Quad4,
    CellShape::Quad8,
    CellShape::Quad9,
    CellShape::Tet4,
    CellShape::Tet10,
    CellShape::Hex8,
    CellShape::Hex20,
    CellShape::Hex27,
    CellShape::Wedge6,
    CellShape::Pyramid5,
    CellShape::Nurbs2,
    CellShape::Nurbs3,
    CellShape::Nurbs4,
    CellShape::Nurbs9,
    CellShape::Nurbs8,
    CellShape::Nurbs27,
];

// corner-node faces of the linear shapes, in local node numbering
const LINE_FACES: &[&[usize]] = &[&[0], &[1]];
const TRI_FACES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 0]];
const QUAD_FACES: &[&[usize]] = &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const TET_FACES: &[&[usize]] = &[&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]];
const HEX_FACES: &[&[usize]] = &[
    &[0, 3, 2, 1],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[0, 4, 7, 3],
    &[4, 5, 6, 7],
];
const WEDGE_FACES: &[&[usize]] = &[
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[0, 3, 5, 2],
];
const PYRAMID_FACES: &[&[usize]] = &[&[0, 3, 2, 1], &[0, 1, 4], &[1, 2, 4], &[2, 3, 4], &[0, 4, 3]];

impl CellShape {
    pub fn input_name(self) -> &'static str {
        match self {
            CellShape::Point1 => "POINT1",
            CellShape::Line2 => "LINE2",
            CellShape::Line3 => "LINE3",
            CellShape::Tri3 => "TRI3",
            CellShape::Tri6 => "TRI6",
            CellShape::Quad4 => "QUAD4",
            CellShape::Quad8 => "QUAD8",
            CellShape::Quad9 => "QUAD9",
            CellShape::Tet4 => "TET4",
            CellShape::Tet10 => "TET10",
            CellShape::Hex8 => "HEX8",
            CellShape::Hex20 => "HEX20",
            CellShape::Hex27 => "HEX27",
            CellShape::Wedge6 => "WEDGE6",
            CellShape::Pyramid5 => "PYRAMID5",
            CellShape::Nurbs2 => "NURBS2",
            CellShape::Nurbs3 => "NURBS3",
            CellShape::Nurbs4 => "NURBS4",
            CellShape::Nurbs9 => "NURBS9",
            CellShape::Nurbs8 => "NURBS8",
            CellShape::Nurbs27 => "NURBS27",
        }
    }

    /// Number of nodes (control points for NURBS) per element.
    pub fn num_nodes(self) -> usize {
        match self {
            CellShape::Point1 => 1,
            CellShape::Line2 | CellShape::Nurbs2 => 2,
            CellShape::Line3 | CellShape::Tri3 | CellShape::Nurbs3 => 3,
            CellShape::Quad4 | CellShape::Tet4 | CellShape::Nurbs4 => 4,
            CellShape::Pyramid5 => 5,
            CellShape::Tri6 | CellShape::Wedge6 => 6,
            CellShape::Quad8 | CellShape::Hex8 | CellShape::Nurbs8 => 8,
            CellShape::Quad9 | CellShape::Nurbs9 => 9,
            CellShape::Tet10 => 10,
            CellShape::Hex20 => 20,
            CellShape::Hex27 | CellShape::Nurbs27 => 27,
        }
    }

    /// Topological dimension.
    pub fn dimension(self) -> usize {
        match self {
            CellShape::Point1 => 0,
            CellShape::Line2 | CellShape::Line3 | CellShape::Nurbs2 | CellShape::Nurbs3 => 1,
            CellShape::Tri3
            | CellShape::Tri6
            | CellShape::Quad4
            | CellShape::Quad8
            | CellShape::Quad9
            | CellShape::Nurbs4
            | CellShape::Nurbs9 => 2,
            _ => 3,
        }
    }

    pub fn is_nurbs(self) -> bool {
        matches!(
            self,
            CellShape::Nurbs2
                | CellShape::Nurbs3
                | CellShape::Nurbs4
                | CellShape::Nurbs9
                | CellShape::Nurbs8
                | CellShape::Nurbs27
        )
    }

    /// Faces as lists of local corner nodes. Higher-order Lagrange shapes
    /// number their corners first, so they share the linear tables. NURBS
    /// elements have no nodal faces.
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            CellShape::Line2 | CellShape::Line3 => LINE_FACES,
            CellShape::Tri3 | CellShape::Tri6 => TRI_FACES,
            CellShape::Quad4 | CellShape::Quad8 | CellShape::Quad9 => QUAD_FACES,
            CellShape::Tet4 | CellShape::Tet10 => TET_FACES,
            CellShape::Hex8 | CellShape::Hex20 | CellShape::Hex27 => HEX_FACES,
            CellShape::Wedge6 => WEDGE_FACES,
            CellShape::Pyramid5 => PYRAMID_FACES,
            _ => &[],
        }
    }
}

impl FromStr for CellShape {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_SHAPES
            .iter()
            .copied()
            .find(|c| c.input_name() == s)
            .ok_or_else(|| DeckError::Malformed(format!("unknown cell shape `{s}`")))
    }
}

impl fmt::Display for CellShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.input_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faces_use_existing_local_nodes() {
        for shape in ALL_SHAPES {
            for face in shape.faces() {
                assert!(face.iter().all(|&n| n < shape.num_nodes()), "{shape}");
            }
            assert_eq!(shape.input_name().parse::<CellShape>().expect("name"), shape);
        }
        assert_eq!(CellShape::Hex8.faces().len(), 6);
        assert!(CellShape::Nurbs27.faces().is_empty());
    }
}
