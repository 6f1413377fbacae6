//! Problem registry.
//!
//! A [`ProblemSet`] holds one [`Problem`] per slot: slot 0 is the macro
//! problem, further slots are created on demand for micro-scale problems.
//! Material lookups go through the slot returned by
//! [`ProblemSet::read_from_problem`], which a [`ReadFromGuard`] redirects
//! for the duration of a micro read.

pub mod particles;
pub mod read;
pub mod result;
pub mod types;

use crate::algs::communicator::Communicator;
use crate::config::ParameterList;
use crate::deck_error::DeckError;
use crate::discretization::{Discretization, DofRegistry};
use crate::io::design::DesignTopology;
use crate::io::writer::OutputControl;
use crate::material::MaterialMap;
use particles::Particle;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use result::ResultTestManager;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
pub use types::{ProblemType, ShapeFunctionType};

/// How the ranks of a run are grouped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NestedParallelism {
    #[default]
    NoNested,
    EveryGroupReadInputFile,
    SeparateInputFiles,
    CopyDatFile,
}

/// Communicators of one problem.
#[derive(Clone, Debug)]
pub struct CommunicatorBundle<C: Communicator> {
    global: C,
    local: C,
    sub: Option<C>,
    nested: NestedParallelism,
}

impl<C: Communicator> CommunicatorBundle<C> {
    /// One group spanning every rank.
    pub fn new(global: C) -> Self {
        Self {
            local: global.clone(),
            global,
            sub: None,
            nested: NestedParallelism::NoNested,
        }
    }

    pub fn with_groups(global: C, local: C, nested: NestedParallelism) -> Self {
        Self {
            global,
            local,
            sub: None,
            nested,
        }
    }

    pub fn global(&self) -> &C {
        &self.global
    }

    pub fn local(&self) -> &C {
        &self.local
    }

    /// Communicator of the current micro-scale group, if any.
    pub fn sub(&self) -> Option<&C> {
        self.sub.as_ref()
    }

    /// Replace the sub communicator.
    pub fn set_sub_comm(&mut self, sub: C) {
        self.sub = Some(sub);
    }

    pub fn nested(&self) -> NestedParallelism {
        self.nested
    }
}

/// Function definitions are kept as raw lines of their `FUNCT<n>` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionInput {
    pub id: usize,
    pub lines: Vec<String>,
}

/// `(source field, target field)` to `(source material, target material)`.
pub type CloningMaterialMap = BTreeMap<(String, String), BTreeSet<(i32, i32)>>;

/// Everything read for one problem slot.
#[derive(Debug)]
pub struct Problem<C: Communicator> {
    slot: usize,
    comms: CommunicatorBundle<C>,
    parameters: ParameterList,
    problem_type: ProblemType,
    shape: ShapeFunctionType,
    n_dim: usize,
    restart: i32,
    random: SmallRng,
    rand_seed: u64,
    output: Arc<OutputControl>,
    dofs: Arc<DofRegistry>,
    discretizations: BTreeMap<String, Discretization<C>>,
    dis_order: Vec<String>,
    materials: MaterialMap,
    design: DesignTopology,
    result_tests: ResultTestManager,
    particles: Vec<Particle>,
    cloning_material_map: CloningMaterialMap,
    functions: Vec<FunctionInput>,
}

impl<C: Communicator> Problem<C> {
    pub fn new(slot: usize, comms: CommunicatorBundle<C>) -> Self {
        Self {
            slot,
            comms,
            parameters: ParameterList::new(),
            problem_type: ProblemType::structure,
            shape: ShapeFunctionType::Polynomial,
            n_dim: 3,
            restart: 0,
            random: SmallRng::seed_from_u64(0),
            rand_seed: 0,
            output: Arc::new(OutputControl::new(".", "output")),
            dofs: DofRegistry::new(),
            discretizations: BTreeMap::new(),
            dis_order: Vec::new(),
            materials: MaterialMap::new(),
            design: DesignTopology::default(),
            result_tests: ResultTestManager::default(),
            particles: Vec::new(),
            cloning_material_map: CloningMaterialMap::new(),
            functions: Vec::new(),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Register a discretization. Names are unique within a problem.
    pub fn add_dis(&mut self, dis: Discretization<C>) -> Result<(), DeckError> {
        let name = dis.name().to_string();
        if self.discretizations.contains_key(&name) {
            return Err(DeckError::InvalidDiscretization {
                dis: name,
                reason: "already registered".into(),
            });
        }
        self.dis_order.push(name.clone());
        self.discretizations.insert(name, dis);
        Ok(())
    }

    pub fn has_dis(&self, name: &str) -> bool {
        self.discretizations.contains_key(name)
    }

    pub fn get_dis(&self, name: &str) -> Result<&Discretization<C>, DeckError> {
        self.discretizations
            .get(name)
            .ok_or_else(|| DeckError::UnknownDiscretization(name.to_string()))
    }

    pub fn get_dis_mut(&mut self, name: &str) -> Result<&mut Discretization<C>, DeckError> {
        self.discretizations
            .get_mut(name)
            .ok_or_else(|| DeckError::UnknownDiscretization(name.to_string()))
    }

    /// Discretizations in registration order.
    pub fn discretizations(&self) -> impl Iterator<Item = &Discretization<C>> {
        self.dis_order
            .iter()
            .filter_map(|n| self.discretizations.get(n))
    }

    pub fn dis_names(&self) -> &[String] {
        &self.dis_order
    }

    pub(crate) fn dis_map_mut(&mut self) -> &mut BTreeMap<String, Discretization<C>> {
        &mut self.discretizations
    }

    pub fn materials(&self) -> &MaterialMap {
        &self.materials
    }

    pub(crate) fn set_materials(&mut self, materials: MaterialMap) {
        self.materials = materials;
    }

    pub fn parameters(&self) -> &ParameterList {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterList {
        &mut self.parameters
    }

    pub fn problem_type(&self) -> ProblemType {
        self.problem_type
    }

    pub fn set_problem_type(&mut self, problem_type: ProblemType) {
        self.problem_type = problem_type;
    }

    pub fn shape_function_type(&self) -> ShapeFunctionType {
        self.shape
    }

    pub fn set_shape_function_type(&mut self, shape: ShapeFunctionType) {
        self.shape = shape;
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub(crate) fn set_n_dim(&mut self, n_dim: usize) {
        self.n_dim = n_dim;
    }

    pub fn restart(&self) -> i32 {
        self.restart
    }

    pub fn set_restart_step(&mut self, step: i32) {
        self.restart = step;
    }

    pub fn communicators(&self) -> &CommunicatorBundle<C> {
        &self.comms
    }

    pub fn communicators_mut(&mut self) -> &mut CommunicatorBundle<C> {
        &mut self.comms
    }

    pub fn random(&mut self) -> &mut SmallRng {
        &mut self.random
    }

    pub fn rand_seed(&self) -> u64 {
        self.rand_seed
    }

    pub(crate) fn set_rand_seed(&mut self, seed: u64) {
        self.rand_seed = seed;
        self.random = SmallRng::seed_from_u64(seed);
    }

    pub fn output_control(&self) -> Arc<OutputControl> {
        Arc::clone(&self.output)
    }

    pub(crate) fn set_output_control(&mut self, output: OutputControl) {
        self.output = Arc::new(output);
    }

    /// Dof counter shared by the standard dofsets of this problem.
    pub fn dof_registry(&self) -> Arc<DofRegistry> {
        Arc::clone(&self.dofs)
    }

    pub fn design(&self) -> &DesignTopology {
        &self.design
    }

    pub(crate) fn set_design(&mut self, design: DesignTopology) {
        self.design = design;
    }

    pub fn result_tests(&self) -> &ResultTestManager {
        &self.result_tests
    }

    pub(crate) fn result_tests_mut(&mut self) -> &mut ResultTestManager {
        &mut self.result_tests
    }

    /// Particles of this rank.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub(crate) fn set_particles(&mut self, particles: Vec<Particle>) {
        self.particles = particles;
    }

    pub fn cloning_material_map(&self) -> &CloningMaterialMap {
        &self.cloning_material_map
    }

    pub(crate) fn cloning_material_map_mut(&mut self) -> &mut CloningMaterialMap {
        &mut self.cloning_material_map
    }

    pub fn functions(&self) -> &[FunctionInput] {
        &self.functions
    }

    pub(crate) fn set_functions(&mut self, functions: Vec<FunctionInput>) {
        self.functions = functions;
    }
}

/// All problem slots of a run.
#[derive(Debug)]
pub struct ProblemSet<C: Communicator> {
    problems: BTreeMap<usize, Problem<C>>,
    base: CommunicatorBundle<C>,
    read_from: usize,
}

impl<C: Communicator> ProblemSet<C> {
    /// A set holding the macro problem in slot 0.
    pub fn new(comms: CommunicatorBundle<C>) -> Self {
        let mut problems = BTreeMap::new();
        problems.insert(0, Problem::new(0, comms.clone()));
        Self {
            problems,
            base: comms,
            read_from: 0,
        }
    }

    pub fn problem(&self, slot: usize) -> Result<&Problem<C>, DeckError> {
        self.problems
            .get(&slot)
            .ok_or(DeckError::UnknownProblemSlot(slot))
    }

    pub fn problem_mut(&mut self, slot: usize) -> Result<&mut Problem<C>, DeckError> {
        self.problems
            .get_mut(&slot)
            .ok_or(DeckError::UnknownProblemSlot(slot))
    }

    /// Slot `slot`, created with the global and local communicators of
    /// slot 0 if it does not exist yet.
    pub fn get_or_create(&mut self, slot: usize) -> &mut Problem<C> {
        let base = &self.base;
        self.problems.entry(slot).or_insert_with(|| {
            let comms = CommunicatorBundle::with_groups(base.global().clone(), base.local().clone(), base.nested());
            Problem::new(slot, comms)
        })
    }

    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.problems.keys().copied()
    }

    /// Slot consulted by material lookups.
    pub fn read_from_problem(&self) -> usize {
        self.read_from
    }

    /// Materials of the slot returned by [`Self::read_from_problem`].
    pub fn active_materials(&self) -> Result<&MaterialMap, DeckError> {
        Ok(self.problem(self.read_from)?.materials())
    }

    /// Redirect material lookups to `slot` until the guard is dropped.
    pub fn redirect_materials(&mut self, slot: usize) -> ReadFromGuard<'_, C> {
        let previous = std::mem::replace(&mut self.read_from, slot);
        ReadFromGuard {
            set: self,
            previous,
        }
    }
}

/// Scoped material redirect; restores the previous slot on drop.
pub struct ReadFromGuard<'a, C: Communicator> {
    set: &'a mut ProblemSet<C>,
    previous: usize,
}

impl<C: Communicator> Deref for ReadFromGuard<'_, C> {
    type Target = ProblemSet<C>;

    fn deref(&self) -> &Self::Target {
        self.set
    }
}

impl<C: Communicator> DerefMut for ReadFromGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.set
    }
}

impl<C: Communicator> Drop for ReadFromGuard<'_, C> {
    fn drop(&mut self) {
        self.set.read_from = self.previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    #[test]
    fn guard_restores_previous_slot() {
        let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
        ps.get_or_create(2);
        assert_eq!(ps.read_from_problem(), 0);
        {
            let mut g = ps.redirect_materials(2);
            assert_eq!(g.read_from_problem(), 2);
            {
                let g2 = g.redirect_materials(5);
                assert_eq!(g2.read_from_problem(), 5);
                assert!(g2.active_materials().is_err());
            }
            assert_eq!(g.read_from_problem(), 2);
        }
        assert_eq!(ps.read_from_problem(), 0);
        assert_eq!(ps.slots().collect::<Vec<_>>(), vec![0, 2]);
        assert!(matches!(ps.problem(7), Err(DeckError::UnknownProblemSlot(7))));
    }

    #[test]
    fn sub_communicator_is_replaced() {
        let mut b = CommunicatorBundle::new(NoComm);
        assert!(b.sub().is_none());
        b.set_sub_comm(NoComm);
        b.set_sub_comm(NoComm);
        assert!(b.sub().is_some());
        assert_eq!(b.nested(), NestedParallelism::NoNested);
    }
}
