//! Reader for `--<DISCRETIZATION> KNOTVECTORS` sections.
//!
//! ```text
//! NURBS_DIMENSION 2
//! BEGIN NURBSPATCH
//! ID 1
//! NUMKNOTS 6
//! DEGREE 2
//! TYPE Interpolated
//! 0.0
//! ...            (NUMKNOTS values, then the next direction)
//! END NURBSPATCH
//! ```

use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use crate::discretization::knots::{DirectionKnots, KnotType, KnotVector, PatchKnots};
use crate::io::key_value::read_key_value;
use crate::io::reader::DeckReader;

/// Section holding the knots of discretization `dis`.
pub fn knot_section_name(dis: &str) -> String {
    format!("{} KNOTVECTORS", dis.to_uppercase())
}

#[derive(Default)]
struct PendingDirection {
    num_knots: Option<usize>,
    degree: Option<usize>,
    knot_type: Option<KnotType>,
    knots: Vec<f64>,
}

/// Parse the knot section of `dis`. The knot vector still needs
/// [`KnotVector::finish_knots`].
pub fn read_knots<C: Communicator>(reader: &DeckReader<C>, dis: &str) -> Result<KnotVector, DeckError> {
    let section = knot_section_name(dis);
    let err = |reason: String| DeckError::KnotVector {
        dis: dis.to_string(),
        reason,
    };
    let mut n_dim: Option<usize> = None;
    let mut patches: Vec<PatchKnots> = Vec::new();
    let mut current: Option<PatchKnots> = None;
    let mut dir = PendingDirection::default();
    let mut lines = 0;

    for line in reader.lines_in_section(&section) {
        let line = line?;
        lines += 1;
        if let Ok(value) = line.parse::<f64>() {
            let Some(expected) = dir.num_knots else {
                return Err(err(format!("knot value `{line}` before NUMKNOTS")));
            };
            dir.knots.push(value);
            if dir.knots.len() == expected {
                let patch = current
                    .as_mut()
                    .ok_or_else(|| err("knot values outside BEGIN/END NURBSPATCH".into()))?;
                let done = std::mem::take(&mut dir);
                patch.directions.push(DirectionKnots {
                    degree: done.degree.ok_or_else(|| err("DEGREE missing".into()))?,
                    knot_type: done.knot_type.ok_or_else(|| err("TYPE missing".into()))?,
                    knots: done.knots,
                });
            }
            continue;
        }
        let (key, value) = read_key_value(&line)?;
        let as_usize = |v: &str| {
            v.parse::<usize>()
                .map_err(|_| err(format!("`{key} {v}` is not a non-negative integer")))
        };
        match key.as_str() {
            "NURBS_DIMENSION" => n_dim = Some(as_usize(&value)?),
            "BEGIN" => {
                if current.is_some() {
                    return Err(err("nested BEGIN NURBSPATCH".into()));
                }
                current = Some(PatchKnots {
                    id: patches.len() + 1,
                    directions: Vec::new(),
                });
            }
            "ID" => {
                let patch = current
                    .as_mut()
                    .ok_or_else(|| err("ID outside BEGIN/END NURBSPATCH".into()))?;
                patch.id = as_usize(&value)?;
            }
            "NUMKNOTS" => {
                if !dir.knots.is_empty() {
                    return Err(err(format!(
                        "NUMKNOTS given after {} of {:?} knots",
                        dir.knots.len(),
                        dir.num_knots
                    )));
                }
                dir.num_knots = Some(as_usize(&value)?);
            }
            "DEGREE" => dir.degree = Some(as_usize(&value)?),
            "TYPE" => dir.knot_type = Some(value.parse().map_err(err)?),
            "END" => {
                let patch = current
                    .take()
                    .ok_or_else(|| err("END NURBSPATCH without BEGIN".into()))?;
                if dir.num_knots.is_some() {
                    return Err(err(format!("patch {} ends inside a knot list", patch.id)));
                }
                patches.push(patch);
            }
            other => return Err(err(format!("unexpected key `{other}`"))),
        }
    }

    if lines == 0 {
        return Err(DeckError::MissingSection(section));
    }
    if current.is_some() {
        return Err(err("missing END NURBSPATCH".into()));
    }
    let n_dim = n_dim.ok_or_else(|| err("NURBS_DIMENSION missing".into()))?;
    Ok(KnotVector::new(dis, n_dim, patches))
}
