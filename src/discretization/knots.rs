//! NURBS knot vectors.

use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// End condition of a knot vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnotType {
    /// Open vector: first and last knots repeated `degree + 1` times.
    Interpolated,
    Periodic,
}

impl FromStr for KnotType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Interpolated" => Ok(KnotType::Interpolated),
            "Periodic" => Ok(KnotType::Periodic),
            other => Err(format!("unknown knot vector type `{other}`")),
        }
    }
}

/// Knots of one parametric direction of a patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionKnots {
    pub degree: usize,
    pub knot_type: KnotType,
    pub knots: Vec<f64>,
}

impl DirectionKnots {
    /// Number of knot spans carrying elements.
    pub fn num_elements(&self) -> usize {
        self.knots.len().saturating_sub(2 * self.degree + 1)
    }

    fn validate(&self) -> Result<(), String> {
        let p = self.degree;
        if self.knots.len() < 2 * (p + 1) {
            return Err(format!(
                "{} knots are too few for degree {p}",
                self.knots.len()
            ));
        }
        if self.knots.windows(2).any(|w| w[1] < w[0]) {
            return Err("knots are not non-decreasing".into());
        }
        if self.knot_type == KnotType::Interpolated {
            let n = self.knots.len();
            let open_start = self.knots[..=p].iter().all(|&k| k == self.knots[0]);
            let open_end = self.knots[n - p - 1..].iter().all(|&k| k == self.knots[n - 1]);
            if !open_start || !open_end {
                return Err(format!(
                    "interpolated knot vector needs {} repeated end knots",
                    p + 1
                ));
            }
        }
        Ok(())
    }
}

/// One patch: one [`DirectionKnots`] per parametric dimension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchKnots {
    pub id: usize,
    pub directions: Vec<DirectionKnots>,
}

impl PatchKnots {
    pub fn num_elements(&self) -> usize {
        self.directions.iter().map(DirectionKnots::num_elements).product()
    }
}

/// Knot vectors of a NURBS discretization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnotVector {
    /// Discretization the knots belong to.
    pub dis: String,
    pub n_dim: usize,
    pub patches: Vec<PatchKnots>,
    /// First element gid of every patch, set by [`KnotVector::finish_knots`].
    offsets: Option<Vec<i64>>,
}

impl KnotVector {
    pub fn new(dis: impl Into<String>, n_dim: usize, patches: Vec<PatchKnots>) -> Self {
        Self {
            dis: dis.into(),
            n_dim,
            patches,
            offsets: None,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DeckError {
        DeckError::KnotVector {
            dis: self.dis.clone(),
            reason: reason.into(),
        }
    }

    /// Validate all patches and lay out element gids patch by patch,
    /// starting at `smallest_gid`.
    pub fn finish_knots(&mut self, smallest_gid: i64) -> Result<(), DeckError> {
        if self.patches.is_empty() {
            return Err(self.error("no patches"));
        }
        let mut offsets = Vec::with_capacity(self.patches.len());
        let mut next = smallest_gid;
        for patch in &self.patches {
            if patch.directions.len() != self.n_dim {
                return Err(self.error(format!(
                    "patch {} has {} directions, expected {}",
                    patch.id,
                    patch.directions.len(),
                    self.n_dim
                )));
            }
            for d in &patch.directions {
                d.validate()
                    .map_err(|r| self.error(format!("patch {}: {r}", patch.id)))?;
            }
            offsets.push(next);
            next += patch.num_elements() as i64;
        }
        self.offsets = Some(offsets);
        Ok(())
    }

    pub fn is_filled(&self) -> bool {
        self.offsets.is_some()
    }

    /// Patch index holding element `gid`; `None` before `finish_knots`.
    pub fn patch_of_element(&self, gid: i64) -> Option<usize> {
        let offsets = self.offsets.as_ref()?;
        let idx = offsets.partition_point(|&o| o <= gid).checked_sub(1)?;
        let end = offsets[idx] + self.patches[idx].num_elements() as i64;
        (gid < end).then_some(idx)
    }
}
