//! Nodes and elements of a discretization.

use crate::discretization::cell_shape::CellShape;
use crate::io::line_definition::InputParameterContainer;
use serde::{Deserialize, Serialize};

/// A mesh node or NURBS control point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub gid: i64,
    pub coords: [f64; 3],
    /// Control point weight; `None` for Lagrange nodes.
    pub weight: Option<f64>,
    /// Owning rank in the discretization's communicator.
    pub owner: usize,
}

impl Node {
    pub fn new(gid: i64, coords: [f64; 3]) -> Self {
        Self {
            gid,
            coords,
            weight: None,
            owner: 0,
        }
    }
}

/// One element as read from its line.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub gid: i64,
    /// Element type token, e.g. `SOLID` or `FLUID`.
    pub element_type: String,
    pub shape: CellShape,
    /// Global node ids in local element order.
    pub nodes: Vec<i64>,
    /// Material id from `MAT <id>`, if the element has one.
    pub material: Option<i32>,
    pub dofs_per_node: usize,
    /// Remaining named components of the line.
    pub params: InputParameterContainer,
    pub owner: usize,
}
