//! Which discretizations a problem type needs, and where their elements come
//! from.
//!
//! [`plan_fields`] is a pure function of the problem type, the spatial
//! approximation and a few flags from the parameter list. Construction of
//! the planned discretizations and the mesh read happen in
//! [`crate::problem::read::read_fields`].

use crate::config::ParameterList;
use crate::deck_error::DeckError;
use crate::discretization::kind::DiscretizationKind;
use crate::problem::types::{ProblemType, ShapeFunctionType};

/// Parameter flags that change the plan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldFlags {
    /// `FLUID DYNAMIC/WALL MODEL/X_WALL`
    pub x_wall: bool,
    /// `XFLUID DYNAMIC/GENERAL/XFLUIDFLUID`
    pub xfluid_fluid: bool,
    /// `ARTERY_COUPLING` of the active porous multiphase section.
    pub artery_coupling: bool,
    /// `SSI CONTROL/MANIFOLD/ADD_MANIFOLD`
    pub add_manifold: bool,
}

impl FieldFlags {
    /// Collect the flags relevant for `problem` from the parameter list.
    pub fn from_parameters(params: &ParameterList, problem: ProblemType) -> Result<Self, DeckError> {
        let artery_section = match problem {
            ProblemType::poroelast | ProblemType::poromultiphase => "POROMULTIPHASE DYNAMIC",
            ProblemType::poromultiphasescatra => "POROMULTIPHASESCATRA DYNAMIC",
            ProblemType::porofluidmultiphase => "POROFLUIDMULTIPHASE DYNAMIC",
            _ => "",
        };
        Ok(Self {
            x_wall: params.get_at_or("FLUID DYNAMIC/WALL MODEL", "X_WALL", false)?,
            xfluid_fluid: params.get_at_or("XFLUID DYNAMIC/GENERAL", "XFLUIDFLUID", false)?,
            artery_coupling: !artery_section.is_empty()
                && params.get_at_or(artery_section, "ARTERY_COUPLING", false)?,
            add_manifold: params.get_at_or("SSI CONTROL/MANIFOLD", "ADD_MANIFOLD", false)?,
        })
    }
}

/// Source of a discretization's elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderSpec {
    /// Element lines of `section`, optionally only the listed element types.
    Elements {
        section: String,
        element_types: Option<Vec<String>>,
    },
    /// Either `--<FIELD> ELEMENTS` or a generated box, chosen by the
    /// `GEOMETRY` parameter of `geometry_section`.
    Domain {
        field_key: String,
        geometry_section: String,
    },
}

/// One planned discretization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: DiscretizationKind,
    pub readers: Vec<ReaderSpec>,
}

impl FieldSpec {
    fn new(name: &str, kind: DiscretizationKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            readers: Vec::new(),
        }
    }

    fn elements(mut self, section: &str) -> Self {
        self.readers.push(ReaderSpec::Elements {
            section: section.to_string(),
            element_types: None,
        });
        self
    }

    fn elements_of(mut self, section: &str, types: &[&str]) -> Self {
        self.readers.push(ReaderSpec::Elements {
            section: section.to_string(),
            element_types: Some(types.iter().map(|t| t.to_string()).collect()),
        });
        self
    }

    fn domain(mut self, field_key: &str, geometry_section: &str) -> Self {
        self.readers.push(ReaderSpec::Domain {
            field_key: field_key.to_string(),
            geometry_section: geometry_section.to_string(),
        });
        self
    }
}

/// Plan the discretizations of `problem` in registration order.
pub fn plan_fields(
    problem: ProblemType,
    shape: ShapeFunctionType,
    flags: FieldFlags,
) -> Result<Vec<FieldSpec>, DeckError> {
    use DiscretizationKind::*;
    use ProblemType as P;

    let nurbs = shape == ShapeFunctionType::Nurbs;
    let hdg = shape == ShapeFunctionType::Hdg;
    // plain fields follow the shape: nurbs or polynomial
    let basic = if nurbs { Nurbs } else { Polynomial };
    let reject_nurbs = |what: &str| -> Result<(), DeckError> {
        if nurbs {
            Err(DeckError::UnsupportedCombination(format!(
                "Nurbs discretization not possible for {what}"
            )))
        } else {
            Ok(())
        }
    };
    let f = FieldSpec::new;

    let mut fields = match problem {
        P::fsi | P::fsi_redmodels => {
            let (s, fl, a) = if nurbs {
                (Nurbs, Nurbs, Nurbs)
            } else if flags.x_wall {
                (Polynomial, XWall, Polynomial)
            } else {
                (Polynomial, Faces, Polynomial)
            };
            let xfluid = !nurbs && !flags.x_wall && flags.xfluid_fluid;
            let mut v = vec![
                f("structure", s).elements("STRUCTURE ELEMENTS"),
                if xfluid {
                    f("fluid", fl)
                } else {
                    f("fluid", fl).elements("FLUID ELEMENTS")
                },
            ];
            if xfluid {
                v.push(f("xfluid", Xfem).elements("FLUID ELEMENTS"));
            }
            v.push(f("ale", a).elements("ALE ELEMENTS"));
            v
        }
        P::gas_fsi | P::thermo_fsi => {
            reject_nurbs("fs3i")?;
            vec![
                f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
                f("fluid", Faces).elements("FLUID ELEMENTS"),
                f("ale", Polynomial),
                f("scatra1", Polynomial).elements("TRANSPORT ELEMENTS"),
                f("scatra2", Polynomial).elements("TRANSPORT2 ELEMENTS"),
            ]
        }
        P::biofilm_fsi => {
            reject_nurbs("biofilm problems")?;
            vec![
                f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
                f("fluid", Faces).elements("FLUID ELEMENTS"),
                f("ale", Polynomial),
                f("structale", Polynomial),
                f("scatra1", Polynomial),
                f("scatra2", Polynomial),
            ]
        }
        P::fsi_xfem | P::fluid_xfem => {
            let mut v = vec![f("structure", Polynomial).domain("STRUCTURE", "STRUCTURAL DYNAMIC")];
            if flags.xfluid_fluid {
                v.push(f("fluid", Faces));
                v.push(f("xfluid", Xfem).elements_of("FLUID ELEMENTS", &["FLUID"]));
            } else {
                v.push(f("fluid", Xfem).domain("FLUID", "FLUID DYNAMIC"));
            }
            v.push(f("ale", Polynomial).elements("ALE ELEMENTS"));
            v
        }
        P::fpsi_xfem => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("porofluid", Faces),
            f("fluid", Xfem).domain("FLUID", "FLUID DYNAMIC"),
            f("ale", Polynomial).elements("ALE ELEMENTS"),
        ],
        P::ale => vec![f("ale", basic).elements("ALE ELEMENTS")],
        P::fluid | P::fluid_redmodels => {
            let kind = if hdg {
                Hdg
            } else if nurbs {
                Nurbs
            } else if flags.x_wall {
                XWall
            } else {
                Faces
            };
            vec![f("fluid", kind).domain("FLUID", "FLUID DYNAMIC")]
        }
        P::lubrication => vec![f("lubrication", Polynomial).elements("LUBRICATION ELEMENTS")],
        P::cardiac_monodomain | P::scatra => {
            let (fl, sc) = match shape {
                ShapeFunctionType::Nurbs => (Nurbs, Nurbs),
                ShapeFunctionType::Hdg => (Faces, Hdg),
                ShapeFunctionType::Polynomial => (Faces, Polynomial),
            };
            vec![
                f("fluid", fl).elements("FLUID ELEMENTS"),
                f("scatra", sc).elements("TRANSPORT ELEMENTS"),
            ]
        }
        P::sti => {
            if nurbs {
                return Err(DeckError::UnsupportedCombination(
                    "Scatra-thermo interaction does not work for nurbs discretizations".into(),
                ));
            }
            vec![
                f("scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
                f("thermo", Polynomial),
            ]
        }
        P::fluid_ale => {
            let (fl, a) = if hdg {
                (Hdg, Polynomial)
            } else if nurbs {
                (Nurbs, Nurbs)
            } else if flags.x_wall {
                (XWall, Polynomial)
            } else {
                (Faces, Polynomial)
            };
            let xfluid = !hdg && !nurbs && !flags.x_wall && flags.xfluid_fluid;
            let mut v = vec![if xfluid {
                f("fluid", fl)
            } else {
                f("fluid", fl).elements("FLUID ELEMENTS")
            }];
            if xfluid {
                v.push(f("xfluid", Xfem).elements("FLUID ELEMENTS"));
            }
            v.push(f("ale", a).elements("ALE ELEMENTS"));
            v
        }
        P::tsi => vec![
            f("structure", basic).domain("STRUCTURE", "STRUCTURAL DYNAMIC"),
            f("thermo", basic).domain("THERMO", "THERMAL DYNAMIC"),
        ],
        P::thermo => vec![f("thermo", basic).elements("THERMO ELEMENTS")],
        P::structure => vec![f("structure", basic).domain("STRUCTURE", "STRUCTURAL DYNAMIC")],
        P::polymernetwork => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("boundingbox", Polynomial).elements("PERIODIC BOUNDINGBOX ELEMENTS"),
        ],
        P::loma => vec![
            f("fluid", Faces).elements("FLUID ELEMENTS"),
            f("scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
        ],
        P::fluid_xfem_ls => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("fluid", Xfem).domain("FLUID", "FLUID DYNAMIC"),
            f("scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
        ],
        P::elch => {
            let fl = if nurbs { Nurbs } else { Faces };
            vec![
                f("fluid", fl).elements("FLUID ELEMENTS"),
                f("scatra", basic).elements("TRANSPORT ELEMENTS"),
                f("ale", basic).elements("ALE ELEMENTS"),
                f("scatra_micro", basic).elements("TRANSPORT2 ELEMENTS"),
            ]
        }
        P::art_net => {
            reject_nurbs("artery")?;
            vec![
                f("artery", Polynomial).elements("ARTERY ELEMENTS"),
                f("artery_scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
            ]
        }
        P::red_airways => vec![f("red_airway", Polynomial).elements("REDUCED D AIRWAYS ELEMENTS")],
        P::poroelast | P::poromultiphase => {
            let mut v = vec![
                f("structure", basic).elements("STRUCTURE ELEMENTS"),
                f("porofluid", basic).elements("FLUID ELEMENTS"),
            ];
            if flags.artery_coupling {
                v.push(f("artery", Polynomial).elements("ARTERY ELEMENTS"));
            }
            v
        }
        P::poromultiphasescatra => {
            let mut v = vec![
                f("structure", basic).elements("STRUCTURE ELEMENTS"),
                f("porofluid", basic).elements("FLUID ELEMENTS"),
                f("scatra", basic).elements("TRANSPORT ELEMENTS"),
            ];
            if flags.artery_coupling {
                v.push(f("artery", Polynomial).elements("ARTERY ELEMENTS"));
                v.push(f("artery_scatra", Polynomial).elements("TRANSPORT ELEMENTS"));
            }
            v
        }
        P::porofluidmultiphase => {
            let mut v = vec![f("porofluid", basic).elements("FLUID ELEMENTS")];
            if flags.artery_coupling {
                v.push(f("artery", Polynomial).elements("ARTERY ELEMENTS"));
            }
            v
        }
        P::fpsi => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("porofluid", Polynomial),
            f("fluid", Faces).elements("FLUID ELEMENTS"),
            f("ale", Polynomial),
        ],
        P::fbi => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("fluid", Faces).domain("FLUID", "FLUID DYNAMIC"),
        ],
        P::immersed_fsi => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("fluid", Faces).elements("FLUID ELEMENTS"),
        ],
        P::fps3i => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("porofluid", Polynomial),
            f("fluid", Faces).elements("FLUID ELEMENTS"),
            f("ale", Polynomial),
            f("scatra1", Polynomial),
            f("scatra2", Polynomial),
        ],
        P::poroscatra => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("porofluid", Polynomial).elements("FLUID ELEMENTS"),
            f("scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
        ],
        P::ehl => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("lubrication", Polynomial).elements("LUBRICATION ELEMENTS"),
        ],
        P::ssi | P::ssti => {
            let mut v = vec![
                f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
                f("scatra", Polynomial).elements("TRANSPORT ELEMENTS"),
            ];
            if flags.add_manifold {
                v.push(f("scatra_manifold", Polynomial));
            }
            if problem == P::ssti {
                v.push(f("thermo", Polynomial).elements("TRANSPORT ELEMENTS"));
            }
            v
        }
        P::particle | P::pasi => vec![f("structure", Polynomial).elements("STRUCTURE ELEMENTS")],
        P::level_set => vec![f("scatra", Polynomial).elements("TRANSPORT ELEMENTS")],
        P::np_support => Vec::new(),
        P::elemag => vec![f("elemag", Hdg).elements_of(
            "ELECTROMAGNETIC ELEMENTS",
            &["ELECTROMAGNETIC", "ELECTROMAGNETICDIFF"],
        )],
        P::redairways_tissue => vec![
            f("structure", Polynomial).elements("STRUCTURE ELEMENTS"),
            f("red_airway", Polynomial).elements("REDUCED D AIRWAYS ELEMENTS"),
        ],
    };

    // reduced-dimensional models join polynomial fluid problems
    if matches!(problem, P::fsi_redmodels | P::fluid_ale | P::fluid_redmodels)
        && shape == ShapeFunctionType::Polynomial
    {
        fields.push(f("artery", Polynomial).elements("ARTERY ELEMENTS"));
        fields.push(f("red_airway", Polynomial).elements("REDUCED D AIRWAYS ELEMENTS"));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(fields: &[FieldSpec]) -> Vec<&str> {
        fields.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn every_problem_type_has_a_plan() {
        for &p in ProblemType::ALL {
            let plan = plan_fields(p, ShapeFunctionType::Polynomial, FieldFlags::default())
                .expect("polynomial plan");
            assert_eq!(plan.is_empty(), p == ProblemType::np_support, "{p}");
        }
    }

    #[test]
    fn nurbs_fluid_is_one_isogeometric_field() {
        let plan = plan_fields(ProblemType::fluid, ShapeFunctionType::Nurbs, FieldFlags::default())
            .expect("plan");
        assert_eq!(names(&plan), vec!["fluid"]);
        assert_eq!(plan[0].kind, DiscretizationKind::Nurbs);
    }

    #[test]
    fn nurbs_is_rejected_where_unsupported() {
        for p in [
            ProblemType::gas_fsi,
            ProblemType::thermo_fsi,
            ProblemType::biofilm_fsi,
            ProblemType::sti,
            ProblemType::art_net,
        ] {
            assert!(matches!(
                plan_fields(p, ShapeFunctionType::Nurbs, FieldFlags::default()),
                Err(DeckError::UnsupportedCombination(_))
            ));
        }
    }

    #[test]
    fn wall_model_and_xfluid_flags() {
        let xw = FieldFlags {
            x_wall: true,
            ..Default::default()
        };
        let plan = plan_fields(ProblemType::fsi, ShapeFunctionType::Polynomial, xw).expect("plan");
        assert_eq!(plan[1].kind, DiscretizationKind::XWall);

        let xff = FieldFlags {
            xfluid_fluid: true,
            ..Default::default()
        };
        let plan = plan_fields(ProblemType::fluid_ale, ShapeFunctionType::Polynomial, xff)
            .expect("plan");
        assert_eq!(
            names(&plan),
            vec!["fluid", "xfluid", "ale", "artery", "red_airway"]
        );
        assert!(plan[0].readers.is_empty());
        assert_eq!(
            plan[1].readers,
            vec![ReaderSpec::Elements {
                section: "FLUID ELEMENTS".into(),
                element_types: None
            }]
        );
    }

    #[test]
    fn reduced_models_only_for_polynomial_shapes() {
        let poly = plan_fields(
            ProblemType::fsi_redmodels,
            ShapeFunctionType::Polynomial,
            FieldFlags::default(),
        )
        .expect("plan");
        assert_eq!(names(&poly), vec!["structure", "fluid", "ale", "artery", "red_airway"]);
        let iga = plan_fields(ProblemType::fsi_redmodels, ShapeFunctionType::Nurbs, FieldFlags::default())
            .expect("plan");
        assert_eq!(names(&iga), vec!["structure", "fluid", "ale"]);
    }

    #[test]
    fn flags_read_from_parameters() {
        let mut params = ParameterList::new();
        params
            .sublist_at_mut("POROFLUIDMULTIPHASE DYNAMIC")
            .set("ARTERY_COUPLING", "yes");
        let flags = FieldFlags::from_parameters(&params, ProblemType::porofluidmultiphase)
            .expect("flags");
        assert!(flags.artery_coupling);
        let other = FieldFlags::from_parameters(&params, ProblemType::poroelast).expect("flags");
        assert!(!other.artery_coupling);
    }
}
