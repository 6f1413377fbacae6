//! Design topology: which mesh nodes belong to which design point, line,
//! surface or volume.
//!
//! Conditions and result tests address geometry through these design
//! objects. The four `D*-NODE TOPOLOGY` sections list one `NODE <gid>
//! <DTAG> <id>` pair per line, ids counting from 1.

use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use crate::io::line_definition::LineDefinition;
use crate::io::reader::DeckReader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Dimension of a design object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DesignKind {
    Point,
    Line,
    Surface,
    Volume,
}

impl DesignKind {
    pub const ALL: [DesignKind; 4] = [
        DesignKind::Point,
        DesignKind::Line,
        DesignKind::Surface,
        DesignKind::Volume,
    ];

    pub fn topology_section(self) -> &'static str {
        match self {
            DesignKind::Point => "DNODE-NODE TOPOLOGY",
            DesignKind::Line => "DLINE-NODE TOPOLOGY",
            DesignKind::Surface => "DSURF-NODE TOPOLOGY",
            DesignKind::Volume => "DVOL-NODE TOPOLOGY",
        }
    }

    /// Tag following the node id in a topology line.
    pub fn tag(self) -> &'static str {
        match self {
            DesignKind::Point => "DNODE",
            DesignKind::Line => "DLINE",
            DesignKind::Surface => "DSURFACE",
            DesignKind::Volume => "DVOL",
        }
    }

    /// Prefix of condition section names, e.g. `DESIGN POINT DIRICH CONDITIONS`.
    pub fn condition_prefix(self) -> &'static str {
        match self {
            DesignKind::Point => "DESIGN POINT",
            DesignKind::Line => "DESIGN LINE",
            DesignKind::Surface => "DESIGN SURF",
            DesignKind::Volume => "DESIGN VOL",
        }
    }

    /// Name used in messages: `DPoint`, `DLine`, `DSurface`, `DVolume`.
    pub fn label(self) -> &'static str {
        match self {
            DesignKind::Point => "DPoint",
            DesignKind::Line => "DLine",
            DesignKind::Surface => "DSurface",
            DesignKind::Volume => "DVolume",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DesignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Node clouds of every design object, indexed by kind and zero-based id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesignTopology {
    sets: [Vec<BTreeSet<i64>>; 4],
}

impl DesignTopology {
    pub fn insert(&mut self, kind: DesignKind, id: usize, node: i64) {
        let sets = &mut self.sets[kind.index()];
        if sets.len() <= id {
            sets.resize_with(id + 1, BTreeSet::new);
        }
        sets[id].insert(node);
    }

    /// Number of design objects of `kind`.
    pub fn len(&self, kind: DesignKind) -> usize {
        self.sets[kind.index()].len()
    }

    /// Nodes of design object `id` (zero-based).
    pub fn nodes(&self, kind: DesignKind, id: i64) -> Result<&BTreeSet<i64>, DeckError> {
        let sets = &self.sets[kind.index()];
        usize::try_from(id)
            .ok()
            .and_then(|i| sets.get(i))
            .ok_or(DeckError::DesignOutOfRange {
                kind: kind.label(),
                id,
                len: sets.len(),
            })
    }
}

/// Read all four topology sections. Collective only through the reader,
/// which holds these sections on every rank.
pub fn read_design_topology<C: Communicator>(reader: &DeckReader<C>) -> Result<DesignTopology, DeckError> {
    let mut topo = DesignTopology::default();
    for kind in DesignKind::ALL {
        let def = LineDefinition::builder()
            .add_named_int("NODE")
            .add_named_int(kind.tag())
            .build();
        for line in reader.lines_in_section(kind.topology_section()) {
            let line = line?;
            let c = def.read(&line)?;
            let node: i64 = c.get("NODE")?;
            let id: usize = c.get(kind.tag())?;
            if id == 0 {
                return Err(DeckError::LineDefinition {
                    line: line.into_owned(),
                    expected: def.to_string(),
                    reason: format!("{} ids count from 1", kind.tag()),
                });
            }
            topo.insert(kind, id - 1, node);
        }
    }
    Ok(topo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_ids_name_the_design_object() {
        let mut t = DesignTopology::default();
        t.insert(DesignKind::Point, 0, 7);
        t.insert(DesignKind::Line, 1, 3);
        assert_eq!(t.len(DesignKind::Line), 2);
        assert!(t.nodes(DesignKind::Line, 0).expect("empty line").is_empty());
        let e = t.nodes(DesignKind::Point, 3).unwrap_err();
        assert_eq!(
            e.to_string(),
            "DPoint 3 not in range [0:1[\nDPoint condition on non existent DPoint?"
        );
    }
}
