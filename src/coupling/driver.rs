//! Partitioned two-way coupling of a structure and a particle field.
//!
//! Dirichlet-Neumann scheme: the structure is the Neumann partition and
//! receives the interface force, the particle field is the Dirichlet
//! partition and receives the (relaxed) interface displacement of the
//! structure as the state of its walls. One outer iteration:
//!
//! 1. reset the particles to the start of the step,
//! 2. apply the interface force and solve the structure,
//! 3. relax the interface state (relaxing schemes only),
//! 4. hand it to the particle walls and solve the particles,
//! 5. assemble the wall forces onto the interface dofs,
//! 6. build the increments and check convergence.

use super::interface::{InterfaceForceAssembler, InterfaceVector};
use super::params::CouplingParams;
use super::relaxation::Relaxation;
use super::restart::CouplingRestart;
use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use crate::io::writer::OutputControl;
use std::sync::Arc;

/// Reference norms below this are replaced by one.
const MIN_REFERENCE_NORM: f64 = 1e-6;
/// Relative slack on `MAXTIME`, in time steps.
const TIME_TOL: f64 = 1e-8;

/// Displacement, velocity and acceleration of the interface dofs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterfaceState {
    pub disp: InterfaceVector,
    pub vel: InterfaceVector,
    pub acc: InterfaceVector,
}

impl InterfaceState {
    /// Move towards `target` by `omega`: the displacement along the raw
    /// increment `disp_inc`, velocity and acceleration by blending.
    fn relax_towards(
        &mut self,
        target: &InterfaceState,
        disp_inc: &InterfaceVector,
        omega: f64,
    ) -> Result<(), DeckError> {
        self.disp.update(omega, disp_inc, 1.0)?;
        self.vel.update(omega, &target.vel, 1.0 - omega)?;
        self.acc.update(omega, &target.acc, 1.0 - omega)
    }
}

/// Neumann partition of the coupling.
pub trait StructureField {
    fn prepare_time_step(&mut self) -> Result<(), DeckError>;
    fn set_interface_force(&mut self, force: &InterfaceVector) -> Result<(), DeckError>;
    /// One nonlinear solve of the current step.
    fn solve(&mut self) -> Result<(), DeckError>;
    /// State of the owned interface dofs.
    fn interface_state(&self) -> InterfaceState;
    fn update(&mut self) -> Result<(), DeckError>;
    fn output(&mut self, step: usize, time: f64) -> Result<(), DeckError>;
    fn read_restart(&mut self, step: usize) -> Result<(), DeckError>;
}

/// Dirichlet partition of the coupling.
pub trait ParticleField {
    /// Advance to the next step and remember its start state.
    fn prepare_time_step(&mut self) -> Result<(), DeckError>;
    /// Go back to the state remembered by `prepare_time_step`.
    fn reset_to_step_start(&mut self) -> Result<(), DeckError>;
    fn set_wall_state(&mut self, state: &InterfaceState) -> Result<(), DeckError>;
    fn solve(&mut self) -> Result<(), DeckError>;
    /// Wall force contributions of this rank, keyed by interface dof gid.
    fn wall_forces(&self) -> Vec<(usize, f64)>;
    fn update(&mut self) -> Result<(), DeckError>;
    fn output(&mut self, step: usize, time: f64) -> Result<(), DeckError>;
    fn read_restart(&mut self, step: usize) -> Result<(), DeckError>;
}

/// The four measures of the outer-loop convergence check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceNorms {
    pub relative_disp: f64,
    pub scaled_disp: f64,
    pub relative_force: f64,
    pub scaled_force: f64,
}

impl ConvergenceNorms {
    /// `|dd|/|d|`, `|dd|/(dt sqrt(n))` and the same for the force. Collective.
    pub fn compute<C: Communicator>(
        comm: &C,
        disp_inc: &InterfaceVector,
        disp: &InterfaceVector,
        force_inc: &InterfaceVector,
        force: &InterfaceVector,
        dt: f64,
    ) -> Result<Self, DeckError> {
        let reference = |n: f64| if n < MIN_REFERENCE_NORM { 1.0 } else { n };
        let disp_inc_norm = disp_inc.norm2(comm)?;
        let disp_norm = reference(disp.norm2(comm)?);
        let force_inc_norm = force_inc.norm2(comm)?;
        let force_norm = reference(force.norm2(comm)?);
        let scale_disp = dt * (disp_inc.global_len(comm)?.max(1) as f64).sqrt();
        let scale_force = dt * (force_inc.global_len(comm)?.max(1) as f64).sqrt();
        Ok(Self {
            relative_disp: disp_inc_norm / disp_norm,
            scaled_disp: disp_inc_norm / scale_disp,
            relative_force: force_inc_norm / force_norm,
            scaled_force: force_inc_norm / scale_force,
        })
    }

    /// All four measures within their tolerances. NaN never is.
    pub fn within(&self, p: &CouplingParams) -> bool {
        self.relative_disp <= p.convtol_relative_disp
            && self.scaled_disp <= p.convtol_scaled_disp
            && self.relative_force <= p.convtol_relative_force
            && self.scaled_force <= p.convtol_scaled_force
    }
}

/// Outcome of outer iteration `itnum` of step `step`: `Ok(true)` to stop
/// iterating, `Ok(false)` to go on, an error once `itmax` is exceeded
/// without `IGNORECONVCHECK`.
pub fn check_convergence(
    norms: &ConvergenceNorms,
    params: &CouplingParams,
    itnum: usize,
    step: usize,
) -> Result<bool, DeckError> {
    if norms.within(params) {
        return Ok(true);
    }
    if itnum >= params.itmax && params.ignore_conv_check {
        log::warn!(
            "outer loop of step {step} not converged in itmax = {} iterations, continuing",
            params.itmax
        );
        return Ok(true);
    }
    if itnum > params.itmax {
        return Err(DeckError::NonConvergence {
            itmax: params.itmax,
            step,
        });
    }
    Ok(false)
}

pub struct PartitionedCoupling<C, S, P> {
    comm: C,
    params: CouplingParams,
    structure: S,
    particles: P,
    assembler: InterfaceForceAssembler,
    relaxation: Relaxation,
    output: Arc<OutputControl>,
    step: usize,
    time: f64,
    /// Interface displacement last handed to the particle walls.
    disp: InterfaceVector,
    force: InterfaceVector,
    disp_inc: InterfaceVector,
    force_inc: InterfaceVector,
    /// Relaxed interface state, present only while a relaxing scheme runs a
    /// step.
    relaxed: Option<InterfaceState>,
}

impl<C, S, P> PartitionedCoupling<C, S, P>
where
    C: Communicator,
    S: StructureField,
    P: ParticleField,
{
    pub fn new(
        comm: C,
        params: CouplingParams,
        structure: S,
        particles: P,
        assembler: InterfaceForceAssembler,
        output: Arc<OutputControl>,
    ) -> Self {
        let disp = structure.interface_state().disp;
        let zeros = InterfaceVector::zeros(disp.gids().iter().copied());
        let relaxation = Relaxation::new(params.relaxation());
        Self {
            comm,
            params,
            structure,
            particles,
            assembler,
            relaxation,
            output,
            step: 0,
            time: 0.0,
            disp,
            force: zeros.clone(),
            disp_inc: zeros.clone(),
            force_inc: zeros,
            relaxed: None,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn omega(&self) -> f64 {
        self.relaxation.omega()
    }

    pub fn params(&self) -> &CouplingParams {
        &self.params
    }

    pub fn structure(&self) -> &S {
        &self.structure
    }

    pub fn particles(&self) -> &P {
        &self.particles
    }

    pub fn interface_force(&self) -> &InterfaceVector {
        &self.force
    }

    fn not_finished(&self) -> bool {
        self.step < self.params.num_steps
            && self.time < self.params.max_time - TIME_TOL * self.params.dt
    }

    /// Run time steps until `NUMSTEP` or `MAXTIME` is reached.
    pub fn timeloop(&mut self) -> Result<(), DeckError> {
        while self.not_finished() {
            self.prepare_time_step()?;
            self.outerloop()?;
            self.structure.update()?;
            self.particles.update()?;
            self.output()?;
        }
        Ok(())
    }

    pub fn prepare_time_step(&mut self) -> Result<(), DeckError> {
        self.step += 1;
        self.time += self.params.dt;
        if self.comm.is_root() {
            log::info!("coupling step {} at time {:.6e}", self.step, self.time);
        }
        self.structure.prepare_time_step()?;
        self.particles.prepare_time_step()?;
        self.disp_inc.put_scalar(0.0);
        self.force_inc.put_scalar(0.0);
        Ok(())
    }

    /// Iterate between the fields until converged. Returns the number of
    /// outer iterations.
    pub fn outerloop(&mut self) -> Result<usize, DeckError> {
        self.relaxed = if self.relaxation.is_relaxing() {
            Some(self.structure.interface_state())
        } else {
            None
        };
        let mut itnum = 0;
        loop {
            itnum += 1;
            let disp_old = match &self.relaxed {
                Some(relaxed) => relaxed.disp.clone(),
                None => self.structure.interface_state().disp,
            };
            let force_old = self.force.clone();

            self.particles.reset_to_step_start()?;
            self.structure.set_interface_force(&self.force)?;
            self.structure.solve()?;
            let state = self.structure.interface_state();
            self.disp_inc = state.disp.difference(&disp_old)?;

            let wall = match self.relaxed.as_mut() {
                Some(relaxed) => {
                    let omega = self
                        .relaxation
                        .update_omega(&self.comm, itnum, &self.disp_inc)?;
                    relaxed.relax_towards(&state, &self.disp_inc, omega)?;
                    relaxed.clone()
                }
                None => state,
            };
            self.particles.set_wall_state(&wall)?;
            self.particles.solve()?;
            self.disp = wall.disp;

            let contributions = self.particles.wall_forces();
            self.assembler
                .assemble(&self.comm, &contributions, &mut self.force)?;
            self.force_inc = self.force.difference(&force_old)?;

            if self.convergence_check(itnum)? {
                return Ok(itnum);
            }
        }
    }

    /// Convergence of outer iteration `itnum` (1-based) of the current step.
    pub fn convergence_check(&self, itnum: usize) -> Result<bool, DeckError> {
        let norms = ConvergenceNorms::compute(
            &self.comm,
            &self.disp_inc,
            &self.disp,
            &self.force_inc,
            &self.force,
            self.params.dt,
        )?;
        if self.comm.is_root() {
            log::info!(
                "step {} outer iteration {itnum}/{}: disp rel {:.3e} scaled {:.3e}, force rel {:.3e} scaled {:.3e}",
                self.step,
                self.params.itmax,
                norms.relative_disp,
                norms.scaled_disp,
                norms.relative_force,
                norms.scaled_force
            );
        }
        check_convergence(&norms, &self.params, itnum, self.step)
    }

    /// Field output every `RESULTSEVRY` steps, restart every `RESTARTEVRY`.
    pub fn output(&mut self) -> Result<(), DeckError> {
        if self.params.results_every > 0 && self.step % self.params.results_every == 0 {
            self.structure.output(self.step, self.time)?;
            self.particles.output(self.step, self.time)?;
        }
        if self.params.restart_every > 0 && self.step % self.params.restart_every == 0 {
            CouplingRestart {
                step: self.step,
                time: self.time,
                omega: self.relaxation.omega(),
            }
            .write_shared(&self.output.restart_path(self.step), &self.comm)?;
        }
        Ok(())
    }

    /// Continue from the restart written at `step`.
    pub fn read_restart(&mut self, step: usize) -> Result<(), DeckError> {
        let record = CouplingRestart::read_shared(&self.output.restart_path(step), &self.comm)?;
        self.step = record.step;
        self.time = record.time;
        if matches!(self.params.relaxation(), super::RelaxationScheme::Aitken { .. }) {
            self.relaxation.set_omega(record.omega);
        }
        self.structure.read_restart(step)?;
        self.particles.read_restart(step)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(itmax: usize, ignore: bool) -> CouplingParams {
        CouplingParams {
            itmax,
            ignore_conv_check: ignore,
            ..CouplingParams::default()
        }
    }

    fn norms(v: f64) -> ConvergenceNorms {
        ConvergenceNorms {
            relative_disp: v,
            scaled_disp: v,
            relative_force: v,
            scaled_force: v,
        }
    }

    #[test]
    fn converged_on_first_call_below_all_tolerances() {
        assert!(check_convergence(&norms(1e-8), &params(2, false), 1, 1).expect("check"));
    }

    #[test]
    fn exceeding_itmax_aborts_at_the_third_iteration() {
        let p = params(2, false);
        let big = norms(1e-5);
        assert!(!check_convergence(&big, &p, 1, 4).expect("first"));
        assert!(!check_convergence(&big, &p, 2, 4).expect("second"));
        assert!(matches!(
            check_convergence(&big, &p, 3, 4),
            Err(DeckError::NonConvergence { itmax: 2, step: 4 })
        ));
    }

    #[test]
    fn ignore_flag_accepts_at_itmax_and_nan_never_converges() {
        let p = params(2, true);
        assert!(!check_convergence(&norms(f64::NAN), &p, 1, 1).expect("nan"));
        assert!(check_convergence(&norms(f64::NAN), &p, 2, 1).expect("ignored"));
        let mut one_off = norms(1e-8);
        one_off.scaled_force = 1.0;
        assert!(!one_off.within(&p));
    }
}
