//! A named, distributed discretization of one physical field.

use crate::algs::collective::{all_reduce_min_i64, all_reduce_sum_i64};
use crate::algs::communicator::Communicator;
use crate::condition::Condition;
use crate::deck_error::DeckError;
use crate::discretization::dofset::DofSet;
use crate::discretization::faces::FaceStructure;
use crate::discretization::kind::DiscretizationKind;
use crate::discretization::knots::KnotVector;
use crate::discretization::node::{Element, Node};
use crate::io::writer::{DiscretizationWriter, StepRecord};
use std::collections::BTreeMap;

/// Nodes and elements of one field on one rank.
///
/// Each rank holds its row (owned) entities plus the ghost layer; together
/// they form the column maps. Any mutation clears `filled`, and
/// [`Discretization::fill_complete`] must run again before dofs or faces
/// are queried.
#[derive(Debug)]
pub struct Discretization<C: Communicator> {
    name: String,
    kind: DiscretizationKind,
    comm: C,
    n_dim: usize,
    nodes: BTreeMap<i64, Node>,
    elements: BTreeMap<i64, Element>,
    dofset: DofSet,
    knots: Option<KnotVector>,
    faces: Option<FaceStructure>,
    conditions: BTreeMap<String, Vec<Condition>>,
    writer: DiscretizationWriter,
    filled: bool,
}

impl<C: Communicator> Discretization<C> {
    /// Create an empty discretization that owns `writer` from the start.
    pub fn with_writer(
        name: impl Into<String>,
        kind: DiscretizationKind,
        comm: C,
        n_dim: usize,
        writer: DiscretizationWriter,
        dofset: DofSet,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            comm,
            n_dim,
            nodes: BTreeMap::new(),
            elements: BTreeMap::new(),
            dofset,
            knots: None,
            faces: None,
            conditions: BTreeMap::new(),
            writer,
            filled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DiscretizationKind {
        self.kind
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub fn writer(&self) -> &DiscretizationWriter {
        &self.writer
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), DeckError> {
        if self.nodes.contains_key(&node.gid) {
            return Err(DeckError::DuplicateNode(node.gid));
        }
        self.nodes.insert(node.gid, node);
        self.filled = false;
        Ok(())
    }

    pub fn add_element(&mut self, element: Element) -> Result<(), DeckError> {
        if self.elements.contains_key(&element.gid) {
            return Err(DeckError::DuplicateElement(element.gid));
        }
        self.elements.insert(element.gid, element);
        self.filled = false;
        Ok(())
    }

    pub fn node(&self, gid: i64) -> Option<&Node> {
        self.nodes.get(&gid)
    }

    pub fn element(&self, gid: i64) -> Option<&Element> {
        self.elements.get(&gid)
    }

    /// Column nodes in gid order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Column elements in gid order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn node_row_gids(&self) -> Vec<i64> {
        let rank = self.comm.rank();
        self.nodes.values().filter(|n| n.owner == rank).map(|n| n.gid).collect()
    }

    pub fn node_col_gids(&self) -> Vec<i64> {
        self.nodes.keys().copied().collect()
    }

    pub fn element_row_gids(&self) -> Vec<i64> {
        let rank = self.comm.rank();
        self.elements.values().filter(|e| e.owner == rank).map(|e| e.gid).collect()
    }

    pub fn element_col_gids(&self) -> Vec<i64> {
        self.elements.keys().copied().collect()
    }

    /// Whether this rank holds the node, owned or ghosted.
    pub fn have_global_node(&self, gid: i64) -> bool {
        self.nodes.contains_key(&gid)
    }

    pub fn have_global_element(&self, gid: i64) -> bool {
        self.elements.contains_key(&gid)
    }

    /// Collective.
    pub fn num_global_elements(&self) -> Result<usize, DeckError> {
        let n = all_reduce_sum_i64(&self.comm, self.element_row_gids().len() as i64)?;
        Ok(n as usize)
    }

    /// Collective.
    pub fn num_global_nodes(&self) -> Result<usize, DeckError> {
        let n = all_reduce_sum_i64(&self.comm, self.node_row_gids().len() as i64)?;
        Ok(n as usize)
    }

    /// Smallest element gid over all ranks (`i64::MAX` when empty).
    /// Collective.
    pub fn min_all_element_gid(&self) -> Result<i64, DeckError> {
        let local = self.elements.keys().next().copied().unwrap_or(i64::MAX);
        all_reduce_min_i64(&self.comm, local)
    }

    /// Check connectivity, number dofs and build faces. Collective when
    /// `assign_dofs` is set.
    pub fn fill_complete(&mut self, assign_dofs: bool, build_faces: bool) -> Result<(), DeckError> {
        for e in self.elements.values() {
            if let Some(&missing) = e.nodes.iter().find(|n| !self.nodes.contains_key(n)) {
                return Err(DeckError::MissingNode {
                    node: missing,
                    element: e.gid,
                });
            }
        }
        if assign_dofs {
            self.dofset.assign(&self.comm, &self.nodes, &self.elements)?;
        }
        if build_faces && self.kind.has_face_structure() {
            self.faces = Some(FaceStructure::build(self.elements.values()));
        }
        self.filled = true;
        Ok(())
    }

    pub fn dofset(&self) -> &DofSet {
        &self.dofset
    }

    /// Attach a finished knot vector. Only NURBS discretizations carry one.
    pub fn set_knots(&mut self, knots: KnotVector) -> Result<(), DeckError> {
        if !self.kind.has_knot_vector() {
            return Err(DeckError::InvalidDiscretization {
                dis: self.name.clone(),
                reason: format!("a {} discretization cannot hold a knot vector", self.kind),
            });
        }
        if !knots.is_filled() {
            return Err(DeckError::KnotVector {
                dis: self.name.clone(),
                reason: "knot vector attached before finish_knots".into(),
            });
        }
        self.knots = Some(knots);
        Ok(())
    }

    pub fn knots(&self) -> Option<&KnotVector> {
        self.knots.as_ref()
    }

    pub fn faces(&self) -> Option<&FaceStructure> {
        self.faces.as_ref()
    }

    pub fn add_condition(&mut self, name: impl Into<String>, condition: Condition) {
        self.conditions.entry(name.into()).or_default().push(condition);
        self.filled = false;
    }

    pub fn conditions(&self, name: &str) -> &[Condition] {
        self.conditions.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn condition_names(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    /// Write this rank's piece for one output step.
    pub fn write_output(&mut self, step: usize, time: f64) -> Result<(), DeckError> {
        if !self.filled {
            return Err(DeckError::InvalidDiscretization {
                dis: self.name.clone(),
                reason: "output requested before fill_complete".into(),
            });
        }
        let record = StepRecord {
            step,
            time,
            num_row_nodes: self.node_row_gids().len(),
            num_row_elements: self.element_row_gids().len(),
            num_global_dofs: self.dofset.num_global_dofs(),
        };
        self.writer.write_step(record)
    }
}
