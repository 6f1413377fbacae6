mod util;

use mesh_deck::algs::communicator::{Communicator, NoComm};
use mesh_deck::coupling::{
    CouplingAlgorithm, CouplingParams, InterfaceForceAssembler, InterfaceState, InterfaceVector,
    ParticleField, PartitionedCoupling, StructureField,
};
use mesh_deck::io::writer::OutputControl;
use mesh_deck::DeckError;
use std::sync::Arc;
use util::{assert_close, on_ranks, scratch_dir};

/// Interface displacement `load + compliance * force` on every owned dof.
struct LinearStructure {
    gids: Vec<usize>,
    load: f64,
    compliance: f64,
    force: InterfaceVector,
    disp: InterfaceVector,
    solves: usize,
    outputs: Vec<usize>,
    restarted_from: Option<usize>,
}

impl LinearStructure {
    fn new(gids: Vec<usize>, load: f64, compliance: f64) -> Self {
        let zeros = InterfaceVector::zeros(gids.iter().copied());
        Self {
            gids,
            load,
            compliance,
            force: zeros.clone(),
            disp: zeros,
            solves: 0,
            outputs: Vec::new(),
            restarted_from: None,
        }
    }
}

impl StructureField for LinearStructure {
    fn prepare_time_step(&mut self) -> Result<(), DeckError> {
        Ok(())
    }

    fn set_interface_force(&mut self, force: &InterfaceVector) -> Result<(), DeckError> {
        self.force = force.clone();
        Ok(())
    }

    fn solve(&mut self) -> Result<(), DeckError> {
        self.solves += 1;
        self.disp = InterfaceVector::from_pairs(self.gids.iter().map(|&g| {
            (g, self.load + self.compliance * self.force.get(g).unwrap_or(0.0))
        }));
        Ok(())
    }

    fn interface_state(&self) -> InterfaceState {
        let zeros = InterfaceVector::zeros(self.gids.iter().copied());
        InterfaceState {
            disp: self.disp.clone(),
            vel: zeros.clone(),
            acc: zeros,
        }
    }

    fn update(&mut self) -> Result<(), DeckError> {
        Ok(())
    }

    fn output(&mut self, step: usize, _time: f64) -> Result<(), DeckError> {
        self.outputs.push(step);
        Ok(())
    }

    fn read_restart(&mut self, step: usize) -> Result<(), DeckError> {
        self.restarted_from = Some(step);
        Ok(())
    }
}

/// Walls pushing back with `-stiffness * disp`, applied on `force_gid(wall)`.
struct SpringWall {
    stiffness: f64,
    force_gid: fn(usize) -> usize,
    wall: InterfaceVector,
    resets: usize,
    updates: usize,
}

impl SpringWall {
    fn new(stiffness: f64) -> Self {
        Self::redirected(stiffness, |g| g)
    }

    fn redirected(stiffness: f64, force_gid: fn(usize) -> usize) -> Self {
        Self {
            stiffness,
            force_gid,
            wall: InterfaceVector::default(),
            resets: 0,
            updates: 0,
        }
    }
}

impl ParticleField for SpringWall {
    fn prepare_time_step(&mut self) -> Result<(), DeckError> {
        Ok(())
    }

    fn reset_to_step_start(&mut self) -> Result<(), DeckError> {
        self.resets += 1;
        Ok(())
    }

    fn set_wall_state(&mut self, state: &InterfaceState) -> Result<(), DeckError> {
        self.wall = state.disp.clone();
        Ok(())
    }

    fn solve(&mut self) -> Result<(), DeckError> {
        Ok(())
    }

    fn wall_forces(&self) -> Vec<(usize, f64)> {
        self.wall
            .gids()
            .iter()
            .zip(self.wall.values())
            .map(|(&g, &d)| ((self.force_gid)(g), -self.stiffness * d))
            .collect()
    }

    fn update(&mut self) -> Result<(), DeckError> {
        self.updates += 1;
        Ok(())
    }

    fn output(&mut self, _step: usize, _time: f64) -> Result<(), DeckError> {
        Ok(())
    }

    fn read_restart(&mut self, _step: usize) -> Result<(), DeckError> {
        Ok(())
    }
}

fn params(algorithm: CouplingAlgorithm, itmax: usize, num_steps: usize) -> CouplingParams {
    CouplingParams {
        algorithm,
        itmax,
        convtol_relative_disp: 1e-8,
        convtol_scaled_disp: 1e-8,
        convtol_relative_force: 1e-8,
        convtol_scaled_force: 1e-8,
        start_omega: 1.0,
        dt: 1.0,
        num_steps,
        max_time: 1e3,
        restart_every: 0,
        ..CouplingParams::default()
    }
}

fn output(tag: &str) -> Arc<OutputControl> {
    Arc::new(OutputControl::new(scratch_dir(tag), "pasi"))
}

fn first_step_iterations(algorithm: CouplingAlgorithm, start_omega: f64) -> usize {
    let mut p = params(algorithm, 100, 1);
    p.start_omega = start_omega;
    let mut coupling = PartitionedCoupling::new(
        NoComm,
        p,
        LinearStructure::new(vec![1, 2], 1.0, 0.5),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        output(&format!("iterations_{start_omega}")),
    );
    coupling.prepare_time_step().expect("prepare");
    let itnum = coupling.outerloop().expect("converges");
    // fixed point of d = 1 - 0.5 d
    for &g in &[1, 2] {
        assert_close(coupling.interface_force().get(g).expect("dof"), -2.0 / 3.0, 1e-6);
    }
    itnum
}

#[test]
fn two_way_coupling_reaches_the_fixed_point() {
    let mut coupling = PartitionedCoupling::new(
        NoComm,
        params(CouplingAlgorithm::TwoWay, 100, 3),
        LinearStructure::new(vec![1, 2], 1.0, 0.5),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        output("fixed_point"),
    );
    coupling.timeloop().expect("timeloop");
    assert_eq!(coupling.step(), 3);
    assert_close(coupling.time(), 3.0, 1e-12);
    for v in coupling.structure().disp.values() {
        assert_close(*v, 2.0 / 3.0, 1e-6);
    }
    assert_eq!(coupling.structure().outputs, vec![1, 2, 3]);
    assert_eq!(coupling.particles().updates, 3);
    assert_eq!(coupling.particles().resets, coupling.structure().solves);
}

#[test]
fn relaxation_shortens_the_outer_loop() {
    let plain = first_step_iterations(CouplingAlgorithm::TwoWay, 1.0);
    let constant = first_step_iterations(CouplingAlgorithm::TwoWayDispRelax, 0.5);
    let aitken = first_step_iterations(CouplingAlgorithm::TwoWayDispRelaxAitken, 1.0);
    assert!(aitken < constant, "aitken {aitken} vs constant {constant}");
    assert!(constant < plain, "constant {constant} vs plain {plain}");
    assert!(aitken <= 4);
}

#[test]
fn diverging_outer_loop_aborts_after_itmax() {
    let mut coupling = PartitionedCoupling::new(
        NoComm,
        params(CouplingAlgorithm::TwoWay, 2, 5),
        LinearStructure::new(vec![7], 1.0, 2.0),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        output("diverging"),
    );
    let err = coupling.timeloop().unwrap_err();
    assert!(matches!(err, DeckError::NonConvergence { itmax: 2, step: 1 }));
    assert_eq!(coupling.structure().solves, 3);
    assert!(coupling.structure().outputs.is_empty());
}

#[test]
fn ignored_convergence_check_moves_on_at_itmax() {
    let mut p = params(CouplingAlgorithm::TwoWay, 2, 2);
    p.ignore_conv_check = true;
    let mut coupling = PartitionedCoupling::new(
        NoComm,
        p,
        LinearStructure::new(vec![7], 1.0, 2.0),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        output("ignored"),
    );
    coupling.timeloop().expect("timeloop");
    assert_eq!(coupling.step(), 2);
    assert_eq!(coupling.structure().solves, 4);
}

#[test]
fn restart_continues_with_step_time_and_omega() {
    let control = output("restart");
    let mut p = params(CouplingAlgorithm::TwoWayDispRelaxAitken, 100, 2);
    p.restart_every = 1;
    let mut first = PartitionedCoupling::new(
        NoComm,
        p.clone(),
        LinearStructure::new(vec![1, 2], 1.0, 0.5),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        control.clone(),
    );
    first.timeloop().expect("first run");
    assert!(control.restart_path(1).exists());
    assert!(control.restart_path(2).exists());
    assert_ne!(first.omega(), 1.0);

    p.num_steps = 3;
    let mut second = PartitionedCoupling::new(
        NoComm,
        p,
        LinearStructure::new(vec![1, 2], 1.0, 0.5),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        control.clone(),
    );
    second.read_restart(2).expect("restart");
    assert_eq!(second.step(), 2);
    assert_close(second.time(), 2.0, 1e-12);
    assert_close(second.omega(), first.omega(), 1e-12);
    assert_eq!(second.structure().restarted_from, Some(2));

    second.timeloop().expect("continued run");
    assert_eq!(second.step(), 3);
    assert_eq!(second.structure().outputs, vec![3]);
}

#[test]
fn missing_restart_file_is_an_error() {
    let mut coupling = PartitionedCoupling::new(
        NoComm,
        params(CouplingAlgorithm::TwoWay, 10, 1),
        LinearStructure::new(vec![1], 1.0, 0.5),
        SpringWall::new(1.0),
        InterfaceForceAssembler::Local,
        output("no_restart"),
    );
    assert!(coupling.read_restart(4).is_err());
    assert_eq!(coupling.step(), 0);
}

#[test]
fn wall_forces_on_remote_dofs_are_exported() {
    // rank r owns dof 10 + r, its walls push on the other rank's dof
    let results = on_ranks(2, |comm| {
        let gid = 10 + comm.rank();
        let structure = LinearStructure::new(vec![gid], 1.0, 0.5);
        let owned = structure.interface_state().disp;
        let assembler = InterfaceForceAssembler::export(&comm, &owned).expect("export map");
        let mut coupling = PartitionedCoupling::new(
            comm.clone(),
            params(CouplingAlgorithm::TwoWay, 100, 1),
            structure,
            SpringWall::redirected(1.0, |g| if g == 10 { 11 } else { 10 }),
            assembler,
            output(&format!("export_{}", comm.rank())),
        );
        coupling.prepare_time_step().expect("prepare");
        let itnum = coupling.outerloop().expect("outer loop");
        (itnum, coupling.interface_force().get(gid).expect("owned dof"))
    });
    assert_eq!(results[0].0, results[1].0);
    for (_, force) in results {
        assert_close(force, -2.0 / 3.0, 1e-6);
    }
}

#[test]
fn a_failed_restart_write_on_rank_0_stops_every_rank() {
    // the restart directory does not exist, so only rank 0 sees the failure
    let control = Arc::new(OutputControl::new(scratch_dir("restart_unwritable").join("missing"), "pasi"));
    let results = on_ranks(2, |comm| {
        let mut p = params(CouplingAlgorithm::TwoWay, 100, 3);
        p.restart_every = 1;
        let gid = 10 + comm.rank();
        let mut coupling = PartitionedCoupling::new(
            comm.clone(),
            p,
            LinearStructure::new(vec![gid], 1.0, 0.5),
            SpringWall::new(1.0),
            InterfaceForceAssembler::Local,
            control.clone(),
        );
        (coupling.timeloop().is_err(), coupling.step())
    });
    assert_eq!(results, vec![(true, 1), (true, 1)]);
}
