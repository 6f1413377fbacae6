//! Known material input lines.

use crate::io::line_definition::{LineDefinition, LineDefinitionBuilder};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Material model named on a `MAT <id> <NAME>` line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    StVenantKirchhoff,
    ElastHyper,
    CoupNeoHooke,
    Fluid,
    Scatra,
    Fourier,
    StructMultiscale,
    ScatraMultiscale,
    NewmanMultiscale,
    ElchMat,
    ElchPhase,
    Newman,
    Ion,
    ParticleDem,
}

impl MaterialKind {
    /// Materials that hand part of their evaluation to a micro-scale problem.
    pub fn is_multiscale(self) -> bool {
        matches!(
            self,
            MaterialKind::StructMultiscale
                | MaterialKind::ScatraMultiscale
                | MaterialKind::NewmanMultiscale
        )
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let def = MATERIAL_DEFINITIONS.iter().find(|d| d.kind == *self);
        match def {
            Some(d) => f.write_str(d.name),
            None => write!(f, "{self:?}"),
        }
    }
}

/// Schema of one material line.
#[derive(Debug)]
pub struct MaterialDefinition {
    pub name: &'static str,
    pub kind: MaterialKind,
    pub description: &'static str,
    /// Full line, starting with `MAT <int> <NAME>`.
    pub line: LineDefinition,
}

fn head(name: &str) -> LineDefinitionBuilder {
    LineDefinition::builder().add_named_int("MAT").add_tag(name)
}

fn def(
    name: &'static str,
    kind: MaterialKind,
    description: &'static str,
    body: impl FnOnce(LineDefinitionBuilder) -> LineDefinitionBuilder,
) -> MaterialDefinition {
    MaterialDefinition {
        name,
        kind,
        description,
        line: body(head(name)).build(),
    }
}

/// Every material the reader identifies.
pub static MATERIAL_DEFINITIONS: Lazy<Vec<MaterialDefinition>> = Lazy::new(|| {
    use MaterialKind::*;
    vec![
        def(
            "MAT_Struct_StVenantKirchhoff",
            StVenantKirchhoff,
            "St.Venant--Kirchhoff material",
            |b| b.add_named_double("YOUNG").add_named_double("NUE").add_named_double("DENS"),
        ),
        def("MAT_ElastHyper", ElastHyper, "list/collection of hyperelastic materials", |b| {
            b.add_named_int("NUMMAT")
                .add_named_int_vector_from("MATIDS", "NUMMAT")
                .add_named_double("DENS")
                .add_optional_named_int("POLYCONVEX")
                .with_default(0)
        }),
        def("ELAST_CoupNeoHooke", CoupNeoHooke, "compressible neo-Hooke summand", |b| {
            b.add_named_double("YOUNG").add_named_double("NUE")
        }),
        def("MAT_fluid", Fluid, "Newtonian fluid", |b| {
            b.add_named_double("DYNVISCOSITY")
                .add_named_double("DENSITY")
                .add_optional_named_double("GAMMA")
                .with_default(0.0)
        }),
        def("MAT_scatra", Scatra, "scalar transport material", |b| {
            b.add_named_double("DIFFUSIVITY")
                .add_optional_named_double("REACOEFF")
                .with_default(0.0)
                .add_optional_named_double("SCNUM")
                .with_default(0.0)
                .add_optional_named_double("DENSIFICATION")
                .with_default(0.0)
        }),
        def("MAT_Fourier", Fourier, "anisotropic linear Fourier heat conduction", |b| {
            b.add_named_double("CAPA")
                .add_named_int("CONDUCT_PARA_NUM")
                .add_named_double_vector_from("CONDUCT", "CONDUCT_PARA_NUM")
        }),
        def("MAT_Struct_Multiscale", StructMultiscale, "structural multi-scale material", |b| {
            b.add_named_string("MICROFILE")
                .add_named_int("MICRODIS_NUM")
                .add_optional_named_double("INITVOL")
                .with_default(0.0)
                .add_optional_named_string("RUNPOSTFILTER")
                .with_default("No")
        }),
        def("MAT_scatra_multiscale", ScatraMultiscale, "scalar transport multi-scale material", |b| {
            b.add_named_string("MICROFILE")
                .add_named_int("MICRODIS_NUM")
                .add_named_double("POROSITY")
                .add_named_double("TORTUOSITY")
                .add_named_double("A_s")
                .add_named_double("DIFFUSIVITY")
                .add_optional_named_double("REACOEFF")
                .with_default(0.0)
        }),
        def("MAT_newman_multiscale", NewmanMultiscale, "multi-scale electrochemistry material", |b| {
            b.add_named_string("MICROFILE")
                .add_named_int("MICRODIS_NUM")
                .add_named_double("VALENCE")
                .add_named_double("ELECTRONIC_COND")
                .add_optional_named_double("A_s")
                .with_default(0.0)
        }),
        def("MAT_elchmat", ElchMat, "electrochemistry material wrapper", |b| {
            b.add_named_int("NUMDOF")
                .add_named_int("NUMSCAL")
                .add_named_int("NUMPHASE")
                .add_named_int_vector_from("PHASEIDS", "NUMPHASE")
                .add_optional_named_int("LOCAL")
        }),
        def("MAT_elchphase", ElchPhase, "one phase of an electrochemistry material", |b| {
            b.add_named_double("EPSILON")
                .add_named_double("TORTUOSITY")
                .add_named_int("NUMMAT")
                .add_named_int_vector_from("MATIDS", "NUMMAT")
        }),
        def("MAT_newman", Newman, "Newman electrolyte species", |b| {
            b.add_named_double("VALENCE")
                .add_named_int("DIFF_PARA_NUM")
                .add_named_double_vector_from("DIFF_PARA", "DIFF_PARA_NUM")
                .add_named_int("COND_PARA_NUM")
                .add_named_double_vector_from("COND_PARA", "COND_PARA_NUM")
        }),
        def("MAT_ion", Ion, "charged species", |b| {
            b.add_named_double("DIFFUSIVITY")
                .add_named_double("VALENCE")
                .add_optional_named_double("DENSIFICATION")
                .with_default(0.0)
        }),
        def("PAR_DEM", ParticleDem, "discrete element particle", |b| {
            b.add_named_double("INITRADIUS")
                .add_named_double("INITDENSITY")
                .add_optional_named_double("YOUNG")
                .add_optional_named_double("NUE")
        }),
    ]
});

/// Definition of a material by its input name.
pub fn find_definition(name: &str) -> Option<&'static MaterialDefinition> {
    MATERIAL_DEFINITIONS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_found() {
        let mut names: Vec<_> = MATERIAL_DEFINITIONS.iter().map(|d| d.name).collect();
        let n = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), n);
        assert_eq!(
            find_definition("MAT_elchphase").map(|d| d.kind),
            Some(MaterialKind::ElchPhase)
        );
        assert!(find_definition("MAT_bogus").is_none());
    }

    #[test]
    fn multiscale_line_reads_defaults() {
        let d = find_definition("MAT_Struct_Multiscale").expect("known");
        let c = d.line.read("MAT 4 MAT_Struct_Multiscale MICROFILE micro.dat MICRODIS_NUM 2").expect("read");
        assert_eq!(c.get::<String>("MICROFILE").expect("file"), "micro.dat");
        assert_eq!(c.get::<f64>("INITVOL").expect("default"), 0.0);
        assert!(MaterialKind::StructMultiscale.is_multiscale());
        assert_eq!(MaterialKind::ElchMat.to_string(), "MAT_elchmat");
    }
}
