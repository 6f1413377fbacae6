//! Internal and boundary faces of face-based discretizations.

use crate::discretization::node::Element;
use std::collections::BTreeMap;

/// One face, identified by its sorted corner node ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Face {
    pub nodes: Vec<i64>,
    /// Element with the smaller gid.
    pub master: i64,
    /// Neighbor across the face; `None` on the mesh boundary (or at the
    /// edge of the local column elements).
    pub slave: Option<i64>,
}

/// Faces of the column elements.
#[derive(Clone, Debug, Default)]
pub struct FaceStructure {
    faces: Vec<Face>,
}

impl FaceStructure {
    /// Collect faces from `elements`. Elements are visited in gid order, so
    /// the first element to touch a face becomes its master.
    pub fn build<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Self {
        let mut by_nodes: BTreeMap<Vec<i64>, Face> = BTreeMap::new();
        let mut sorted: Vec<&Element> = elements.into_iter().collect();
        sorted.sort_by_key(|e| e.gid);
        for e in sorted {
            for local in e.shape.faces() {
                let mut key: Vec<i64> = local.iter().filter_map(|&i| e.nodes.get(i).copied()).collect();
                key.sort_unstable();
                by_nodes
                    .entry(key.clone())
                    .and_modify(|f| {
                        if f.slave.is_none() && f.master != e.gid {
                            f.slave = Some(e.gid);
                        }
                    })
                    .or_insert(Face {
                        nodes: key,
                        master: e.gid,
                        slave: None,
                    });
            }
        }
        Self {
            faces: by_nodes.into_values().collect(),
        }
    }

    pub fn internal(&self) -> impl Iterator<Item = &Face> {
        self.faces.iter().filter(|f| f.slave.is_some())
    }

    pub fn boundary(&self) -> impl Iterator<Item = &Face> {
        self.faces.iter().filter(|f| f.slave.is_none())
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
