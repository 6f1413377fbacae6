//! Parameters of the partitioned coupling algorithm (`--PASI DYNAMIC`).

use super::relaxation::RelaxationScheme;
use crate::config::ParameterList;
use crate::deck_error::DeckError;
use std::str::FromStr;

pub const PASI_SECTION: &str = "PASI DYNAMIC";

/// Two-way coupling variant selected by `COUPLING`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CouplingAlgorithm {
    TwoWay,
    TwoWayDispRelax,
    TwoWayDispRelaxAitken,
}

impl FromStr for CouplingAlgorithm {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "partitioned_twowaycoup" => Ok(Self::TwoWay),
            "partitioned_twowaycoup_disprelax" => Ok(Self::TwoWayDispRelax),
            "partitioned_twowaycoup_disprelaxaitken" => Ok(Self::TwoWayDispRelaxAitken),
            other => Err(DeckError::InvalidParameter {
                key: "COUPLING".into(),
                value: other.into(),
                expected: "two-way coupling algorithm",
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CouplingParams {
    pub algorithm: CouplingAlgorithm,
    /// Outer iterations before the loop gives up.
    pub itmax: usize,
    pub convtol_relative_disp: f64,
    pub convtol_scaled_disp: f64,
    pub convtol_relative_force: f64,
    pub convtol_scaled_force: f64,
    /// Accept a non-converged step after `itmax` iterations.
    pub ignore_conv_check: bool,
    pub start_omega: f64,
    pub max_omega: f64,
    pub min_omega: f64,
    pub dt: f64,
    pub num_steps: usize,
    pub max_time: f64,
    pub results_every: usize,
    pub restart_every: usize,
}

impl Default for CouplingParams {
    fn default() -> Self {
        Self {
            algorithm: CouplingAlgorithm::TwoWay,
            itmax: 10,
            convtol_relative_disp: 1e-6,
            convtol_scaled_disp: 1e-6,
            convtol_relative_force: 1e-6,
            convtol_scaled_force: 1e-6,
            ignore_conv_check: false,
            start_omega: 1.0,
            max_omega: 10.0,
            min_omega: 0.1,
            dt: 0.01,
            num_steps: 100,
            max_time: 1.0,
            results_every: 1,
            restart_every: 1,
        }
    }
}

impl CouplingParams {
    /// Read the `PASI DYNAMIC` sublist of `params`; missing keys keep their
    /// defaults.
    pub fn from_parameters(params: &ParameterList) -> Result<Self, DeckError> {
        let d = Self::default();
        let Some(list) = params.sublist(PASI_SECTION) else {
            return Ok(d);
        };
        let algorithm = match list.get::<String>("COUPLING")? {
            Some(s) => s.parse()?,
            None => d.algorithm,
        };
        Ok(Self {
            algorithm,
            itmax: list.get_or("ITEMAX", d.itmax)?,
            convtol_relative_disp: list.get_or("CONVTOLRELATIVEDISP", d.convtol_relative_disp)?,
            convtol_scaled_disp: list.get_or("CONVTOLSCALEDDISP", d.convtol_scaled_disp)?,
            convtol_relative_force: list.get_or("CONVTOLRELATIVEFORCE", d.convtol_relative_force)?,
            convtol_scaled_force: list.get_or("CONVTOLSCALEDFORCE", d.convtol_scaled_force)?,
            ignore_conv_check: list.get_or("IGNORECONVCHECK", d.ignore_conv_check)?,
            start_omega: list.get_or("STARTOMEGA", d.start_omega)?,
            max_omega: list.get_or("MAXOMEGA", d.max_omega)?,
            min_omega: list.get_or("MINOMEGA", d.min_omega)?,
            dt: list.get_or("TIMESTEP", d.dt)?,
            num_steps: list.get_or("NUMSTEP", d.num_steps)?,
            max_time: list.get_or("MAXTIME", d.max_time)?,
            results_every: list.get_or("RESULTSEVRY", d.results_every)?,
            restart_every: list.get_or("RESTARTEVRY", d.restart_every)?,
        })
    }

    pub fn relaxation(&self) -> RelaxationScheme {
        match self.algorithm {
            CouplingAlgorithm::TwoWay => RelaxationScheme::None,
            CouplingAlgorithm::TwoWayDispRelax => RelaxationScheme::Constant {
                omega: self.start_omega,
            },
            CouplingAlgorithm::TwoWayDispRelaxAitken => RelaxationScheme::Aitken {
                start_omega: self.start_omega,
                min_omega: self.min_omega,
                max_omega: self.max_omega,
            },
        }
    }
}
