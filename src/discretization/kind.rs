//! Closed set of discretization variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural variant of a discretization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscretizationKind {
    /// Plain Lagrange elements.
    Polynomial,
    /// Isogeometric; carries a knot vector.
    Nurbs,
    /// Polynomial plus internal faces (stabilized fluid).
    Faces,
    /// Hybridizable discontinuous Galerkin; face based.
    Hdg,
    /// Cut-cell XFEM; face based.
    Xfem,
    /// XFEM wall model enrichment; face based.
    XWall,
}

impl DiscretizationKind {
    pub fn has_knot_vector(self) -> bool {
        self == DiscretizationKind::Nurbs
    }

    pub fn has_face_structure(self) -> bool {
        matches!(
            self,
            DiscretizationKind::Faces
                | DiscretizationKind::Hdg
                | DiscretizationKind::Xfem
                | DiscretizationKind::XWall
        )
    }

    pub fn is_hdg(self) -> bool {
        self == DiscretizationKind::Hdg
    }
}

impl fmt::Display for DiscretizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiscretizationKind::Polynomial => "polynomial",
            DiscretizationKind::Nurbs => "nurbs",
            DiscretizationKind::Faces => "faces",
            DiscretizationKind::Hdg => "hdg",
            DiscretizationKind::Xfem => "xfem",
            DiscretizationKind::XWall => "xwall",
        })
    }
}
