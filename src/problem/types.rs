//! Problem and spatial-approximation enums.

use crate::deck_error::DeckError;
use std::fmt;
use std::str::FromStr;

macro_rules! problem_types {
    ($($variant:ident => $input:literal),* $(,)?) => {
        /// Problem type named by `PROBLEM TYP/PROBLEMTYP`.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(non_camel_case_types)]
        pub enum ProblemType {
            $($variant,)*
        }

        impl ProblemType {
            /// Every problem type, in declaration order.
            pub const ALL: &'static [ProblemType] = &[$(ProblemType::$variant,)*];

            /// Spelling used in the input deck.
            pub fn input_name(self) -> &'static str {
                match self {
                    $(ProblemType::$variant => $input,)*
                }
            }
        }
    };
}

problem_types! {
    ale => "Ale",
    art_net => "ArterialNetwork",
    biofilm_fsi => "Biofilm_Fluid_Structure_Interaction",
    cardiac_monodomain => "Cardiac_Monodomain",
    ehl => "Elastohydrodynamic_Lubrication",
    elch => "Electrochemistry",
    elemag => "Electromagnetics",
    fbi => "Fluid_Beam_Interaction",
    fluid => "Fluid",
    fluid_ale => "Fluid_Ale",
    fluid_redmodels => "Fluid_RedModels",
    fluid_xfem => "Fluid_XFEM",
    fluid_xfem_ls => "Fluid_XFEM_LevelSet",
    fpsi => "Fluid_Porous_Structure_Interaction",
    fpsi_xfem => "Fluid_Porous_Structure_Interaction_XFEM",
    fps3i => "Fluid_Porous_Structure_Scalar_Scalar_Interaction",
    fsi => "Fluid_Structure_Interaction",
    fsi_redmodels => "Fluid_Structure_Interaction_RedModels",
    fsi_xfem => "Fluid_Structure_Interaction_XFEM",
    gas_fsi => "Gas_Fluid_Structure_Interaction",
    immersed_fsi => "Immersed_FSI",
    level_set => "Level_Set",
    loma => "Low_Mach_Number_Flow",
    lubrication => "Lubrication",
    np_support => "NP_Supporting_Procs",
    particle => "Particle",
    pasi => "Particle_Structure_Interaction",
    polymernetwork => "Polymer_Network",
    porofluidmultiphase => "Multiphase_Porous_Flow",
    poroelast => "Poroelasticity",
    poromultiphase => "Multiphase_Poroelasticity",
    poromultiphasescatra => "Multiphase_Poroelasticity_ScaTra",
    poroscatra => "Poroelastic_scalar_transport",
    red_airways => "ReducedDimensionalAirWays",
    redairways_tissue => "RedAirways_Tissue",
    scatra => "Scalar_Transport",
    ssi => "Structure_Scalar_Interaction",
    ssti => "Structure_Scalar_Thermo_Interaction",
    sti => "Scalar_Thermo_Interaction",
    structure => "Structure",
    thermo => "Thermo",
    thermo_fsi => "Thermo_Fluid_Structure_Interaction",
    tsi => "Thermo_Structure_Interaction",
}

impl ProblemType {
    /// Problem types whose mesh read is followed by the multiscale micro read.
    pub fn reads_micro_fields(self) -> bool {
        matches!(
            self,
            ProblemType::elch
                | ProblemType::fsi
                | ProblemType::fsi_redmodels
                | ProblemType::scatra
                | ProblemType::structure
        )
    }
}

impl FromStr for ProblemType {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ProblemType::ALL
            .iter()
            .copied()
            .find(|p| p.input_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DeckError::UnknownProblemType(s.to_string()))
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.input_name())
    }
}

/// Spatial approximation named by `PROBLEM TYP/SHAPEFCT`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShapeFunctionType {
    #[default]
    Polynomial,
    Nurbs,
    Hdg,
}

impl FromStr for ShapeFunctionType {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polynomial" => Ok(Self::Polynomial),
            "nurbs" => Ok(Self::Nurbs),
            "hdg" => Ok(Self::Hdg),
            _ => Err(DeckError::UnknownShape(s.trim().to_string())),
        }
    }
}

impl fmt::Display for ShapeFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Polynomial => "Polynomial",
            Self::Nurbs => "Nurbs",
            Self::Hdg => "HDG",
        })
    }
}
