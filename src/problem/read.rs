//! Load phases that fill one problem slot from a deck.
//!
//! Every phase is collective over the reader's communicator and leaves all
//! ranks with the same parameters, materials and conditions. The usual order
//! is the one of [`read_input`].

use super::particles::{PARTICLE_SECTION, parse_particle};
use super::result::{RESULT_SECTION, parse_result_line};
use super::{FunctionInput, Problem, ProblemSet, ProblemType, ShapeFunctionType};
use crate::algs::collective::{all_reduce_min_i64, all_reduce_sum_i64};
use crate::algs::communicator::Communicator;
use crate::condition::CONDITION_DEFINITIONS;
use crate::config::ParameterList;
use crate::deck_error::DeckError;
use crate::discretization::{
    Discretization, DiscretizationKind, DofSet, FieldFlags, ReaderSpec, plan_fields,
};
use crate::io::design::read_design_topology;
use crate::io::key_value::read_parameters_in_section;
use crate::io::knots::read_knots as read_knot_section;
use crate::io::line_definition::LineDefinition;
use crate::io::mesh_reader::{DomainReader, ElementReader, MeshPartitioningConfig, MeshReader, block_range};
use crate::io::reader::DeckReader;
use crate::io::writer::{DiscretizationWriter, OutputControl};
use crate::material::{MaterialMap, MaterialRecipe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const MATERIALS_SECTION: &str = "MATERIALS";
pub const CLONING_SECTION: &str = "CLONING MATERIAL MAP";
/// Highest `SOLVER <n>` and `FUNCT<n>` section read.
pub const MAX_NUMBERED_SECTIONS: usize = 9;

/// Parameter sections read into the problem's parameter list.
pub const PARAMETER_SECTIONS: &[&str] = &[
    "DISCRETISATION",
    "PROBLEM SIZE",
    "PROBLEM TYP",
    "BINNING STRATEGY",
    "BOUNDINGVOLUME STRATEGY",
    "IO",
    "IO/EVERY ITERATION",
    "IO/MONITOR STRUCTURE DBC",
    "IO/RUNTIME VTK OUTPUT",
    "IO/RUNTIME VTK OUTPUT/FLUID",
    "IO/RUNTIME VTK OUTPUT/STRUCTURE",
    "IO/RUNTIME VTK OUTPUT/BEAMS",
    "IO/RUNTIME VTP OUTPUT STRUCTURE",
    "STRUCTURAL DYNAMIC",
    "STRUCTURAL DYNAMIC/TIMEADAPTIVITY",
    "STRUCTURAL DYNAMIC/GENALPHA",
    "STRUCTURAL DYNAMIC/ONESTEPTHETA",
    "MORTAR COUPLING",
    "MORTAR COUPLING/PARALLEL REDISTRIBUTION",
    "CONTACT DYNAMIC",
    "CARDIOVASCULAR 0D-STRUCTURE COUPLING",
    "BROWNIAN DYNAMICS",
    "BEAM INTERACTION",
    "BEAM INTERACTION/SPHERE BEAM LINK",
    "BEAM INTERACTION/BEAM TO BEAM CONTACT",
    "BEAM INTERACTION/BEAM TO SPHERE CONTACT",
    "BEAM INTERACTION/BEAM TO SOLID SURFACE",
    "BEAM INTERACTION/CROSSLINKING",
    "THERMAL DYNAMIC",
    "THERMAL DYNAMIC/GENALPHA",
    "THERMAL DYNAMIC/ONESTEPTHETA",
    "TSI DYNAMIC",
    "TSI DYNAMIC/MONOLITHIC",
    "TSI DYNAMIC/PARTITIONED",
    "TSI CONTACT",
    "POROELASTICITY DYNAMIC",
    "POROSCATRA CONTROL",
    "POROFLUIDMULTIPHASE DYNAMIC",
    "POROMULTIPHASE DYNAMIC",
    "POROMULTIPHASE DYNAMIC/PARTITIONED",
    "POROMULTIPHASE DYNAMIC/MONOLITHIC",
    "POROMULTIPHASESCATRA DYNAMIC",
    "POROMULTIPHASESCATRA DYNAMIC/PARTITIONED",
    "POROMULTIPHASESCATRA DYNAMIC/MONOLITHIC",
    "ELASTO HYDRO DYNAMIC",
    "ELASTO HYDRO DYNAMIC/PARTITIONED",
    "ELASTO HYDRO DYNAMIC/MONOLITHIC",
    "EMBEDDED MESH COUPLING",
    "SSI CONTROL",
    "SSI CONTROL/ELCH",
    "SSI CONTROL/MANIFOLD",
    "SSI CONTROL/MONOLITHIC",
    "SSI CONTROL/PARTITIONED",
    "SSTI CONTROL",
    "SSTI CONTROL/MONOLITHIC",
    "SSTI CONTROL/THERMO",
    "FLUID DYNAMIC",
    "FLUID DYNAMIC/EDGE-BASED STABILIZATION",
    "FLUID DYNAMIC/POROUS-FLOW STABILIZATION",
    "FLUID DYNAMIC/TURBULENCE MODEL",
    "FLUID DYNAMIC/SUBGRID VISCOSITY",
    "FLUID DYNAMIC/WALL MODEL",
    "FLUID DYNAMIC/TIMEADAPTIVITY",
    "FLUID DYNAMIC/TURBULENT INFLOW",
    "LUBRICATION DYNAMIC",
    "SCALAR TRANSPORT DYNAMIC",
    "SCALAR TRANSPORT DYNAMIC/NONLINEAR",
    "SCALAR TRANSPORT DYNAMIC/STABILIZATION",
    "SCALAR TRANSPORT DYNAMIC/S2I COUPLING",
    "SCALAR TRANSPORT DYNAMIC/ARTERY COUPLING",
    "SCALAR TRANSPORT DYNAMIC/EXTERNAL FORCE",
    "STI DYNAMIC",
    "STI DYNAMIC/MONOLITHIC",
    "STI DYNAMIC/PARTITIONED",
    "FS3I DYNAMIC",
    "FS3I DYNAMIC/PARTITIONED",
    "ALE DYNAMIC",
    "FSI DYNAMIC",
    "FSI DYNAMIC/CONSTRAINT",
    "FSI DYNAMIC/MONOLITHIC SOLVER",
    "FSI DYNAMIC/PARTITIONED SOLVER",
    "FSI DYNAMIC/TIMEADAPTIVITY",
    "FLUID BEAM INTERACTION",
    "IMMERSED METHOD",
    "IMMERSED METHOD/PARTITIONED SOLVER",
    "FPSI DYNAMIC",
    "ARTERIAL DYNAMIC",
    "REDUCED DIMENSIONAL AIRWAYS DYNAMIC",
    "SEARCH TREE",
    "XFEM GENERAL",
    "CUT GENERAL",
    "XFLUID DYNAMIC",
    "XFLUID DYNAMIC/GENERAL",
    "XFLUID DYNAMIC/STABILIZATION",
    "XFLUID DYNAMIC/XFPSI MONOLITHIC",
    "LOMA CONTROL",
    "ELCH CONTROL",
    "ELCH CONTROL/DIFFCOND",
    "ELCH CONTROL/SCL",
    "BIOFILM CONTROL",
    "PARTICLE DYNAMIC",
    "PARTICLE DYNAMIC/SPH",
    "PARTICLE DYNAMIC/DEM",
    "PASI DYNAMIC",
    "LEVEL-SET CONTROL",
    "LEVEL-SET CONTROL/REINITIALIZATION",
    "WEAR",
    "BEAM CONTACT",
    "BEAM CONTACT/RUNTIME VTK OUTPUT",
    "BEAM POTENTIAL",
    "BEAM POTENTIAL/RUNTIME VTK OUTPUT",
    "SEMI-SMOOTH PLASTICITY",
    "ELECTROMAGNETIC DYNAMIC",
    "VOLMORTAR COUPLING",
    "CARDIAC MONODOMAIN CONTROL",
    "MOR",
    "MESH PARTITIONING",
    "MULTI POINT CONSTRAINTS",
    "NURBS",
    "STRUCT NOX",
    "STRUCT NOX/DIRECTION",
    "STRUCT NOX/DIRECTION/NEWTON",
    "STRUCT NOX/DIRECTION/NEWTON/MODIFIED",
    "STRUCT NOX/DIRECTION/NEWTON/LINEAR SOLVER",
    "STRUCT NOX/DIRECTION/STEEPEST DESCENT",
    "STRUCT NOX/LINE SEARCH",
    "STRUCT NOX/LINE SEARCH/FULL STEP",
    "STRUCT NOX/LINE SEARCH/BACKTRACK",
    "STRUCT NOX/LINE SEARCH/POLYNOMIAL",
    "STRUCT NOX/LINE SEARCH/MORE'-THUENTE",
    "STRUCT NOX/PSEUDO TRANSIENT",
    "STRUCT NOX/TRUST REGION",
    "STRUCT NOX/PRINTING",
    "STRUCT NOX/STATUS TEST",
    "STRUCT NOX/SOLVER OPTIONS",
];

/// Solver parameters naming files relative to the deck.
const SOLVER_FILE_PARAMETERS: &[&str] = &[
    "AMGNXN_XML_FILE",
    "MUELU_XML_FILE",
    "TEKO_XML_FILE",
    "SOLVER_XML_FILE",
];

fn make_relative_to(list: &mut ParameterList, key: &str, dir: &Path) {
    let Some(value) = list.get_str(key) else {
        return;
    };
    if value == "none" || Path::new(value).is_absolute() {
        return;
    }
    let joined = dir.join(value).to_string_lossy().into_owned();
    list.set(key, joined);
}

/// Read the parameter sections and derive problem type, shape, dimension,
/// restart step and random seed.
pub fn read_parameter<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let global_rank = ps.problem(0)?.communicators().global().rank();
    let mut list = ParameterList::new();
    for name in PARAMETER_SECTIONS {
        read_parameters_in_section(reader, name, &mut list)?;
    }
    let dir = reader.input_dir();
    for i in 1..=MAX_NUMBERED_SECTIONS {
        let name = format!("SOLVER {i}");
        read_parameters_in_section(reader, &name, &mut list)?;
        if list.sublist(&name).is_some() {
            let sub = list.sublist_mut(&name);
            for key in SOLVER_FILE_PARAMETERS {
                make_relative_to(sub, key, &dir);
            }
        }
    }
    if list.sublist_at("STRUCT NOX/STATUS TEST").is_some() {
        make_relative_to(list.sublist_at_mut("STRUCT NOX/STATUS TEST"), "XML File", &dir);
    }

    let problem_type: ProblemType = list
        .get_at_or("PROBLEM TYP", "PROBLEMTYP", "Structure".to_string())?
        .parse()?;
    let shape: ShapeFunctionType = list
        .get_at_or("PROBLEM TYP", "SHAPEFCT", "Polynomial".to_string())?
        .parse()?;
    let n_dim: usize = list.get_at_or("PROBLEM SIZE", "DIM", 3)?;
    let restart_in_file: i32 = list.get_at_or("PROBLEM TYP", "RESTART", 0)?;
    let rand_seed: i64 = list.get_at_or("PROBLEM TYP", "RANDSEED", -1)?;

    let problem = ps.problem_mut(slot)?;
    problem.set_problem_type(problem_type);
    problem.set_shape_function_type(shape);
    problem.set_n_dim(n_dim);
    if problem.restart() == 0 {
        problem.set_restart_step(restart_in_file);
    } else if restart_in_file > 0 && restart_in_file != problem.restart() {
        return Err(DeckError::RestartConflict {
            in_file: restart_in_file,
            given: problem.restart(),
        });
    }
    let seed = if rand_seed < 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        now + 42 * global_rank as u64
    } else {
        rand_seed as u64
    };
    problem.set_rand_seed(seed);
    problem.set_output_control(OutputControl::for_input(reader.input_file(), problem.restart()));
    *problem.parameters_mut() = list;
    log::debug!(
        "slot {slot}: problem type {problem_type}, shape {shape}, dim {n_dim}, restart {}",
        problem.restart()
    );
    Ok(())
}

/// Register every `MAT` line of `--MATERIALS`, then build all materials.
pub fn read_materials<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let mut map = MaterialMap::new();
    for line in reader.lines_in_section(MATERIALS_SECTION) {
        map.register(MaterialRecipe::from_line(&line?)?)?;
    }
    map.build_all()?;
    log::debug!("slot {slot}: {} materials", map.len());
    ps.problem_mut(slot)?.set_materials(map);
    Ok(())
}

/// Read `--CLONING MATERIAL MAP`.
pub fn read_cloning_material_map<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let def = LineDefinition::builder()
        .add_named_string("SRC_FIELD")
        .add_named_int("SRC_MAT")
        .add_named_string("TAR_FIELD")
        .add_named_int("TAR_MAT")
        .build();
    let map = ps.problem_mut(slot)?.cloning_material_map_mut();
    for line in reader.lines_in_section(CLONING_SECTION) {
        let c = def.read(&line?)?;
        let fields = (c.get::<String>("SRC_FIELD")?, c.get::<String>("TAR_FIELD")?);
        let mats = (c.get::<i32>("SRC_MAT")?, c.get::<i32>("TAR_MAT")?);
        map.entry(fields).or_default().insert(mats);
    }
    Ok(())
}

/// Keep the raw lines of the `FUNCT<n>` sections.
pub fn read_functions<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let mut functions = Vec::new();
    for id in 1..=MAX_NUMBERED_SECTIONS {
        let lines = reader.collect_section(&format!("FUNCT{id}"))?;
        if !lines.is_empty() {
            functions.push(FunctionInput { id, lines });
        }
    }
    ps.problem_mut(slot)?.set_functions(functions);
    Ok(())
}

/// Read the design topology and every condition section, and attach each
/// condition to the discretizations that hold any of its nodes.
pub fn read_conditions<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let start = Instant::now();
    let design = read_design_topology(reader)?;
    let problem = ps.problem_mut(slot)?;
    for def in CONDITION_DEFINITIONS.iter() {
        for mut cond in def.read(reader)? {
            let nodes = design.nodes(cond.kind, cond.id)?;
            if nodes.is_empty() {
                return Err(DeckError::EmptyCondition {
                    condition: def.description.clone(),
                    id: cond.id,
                });
            }
            cond.nodes = Arc::new(nodes.iter().copied().collect());
            for dis in problem.dis_map_mut().values_mut() {
                let local = cond.nodes.iter().any(|&n| dis.have_global_node(n));
                if all_reduce_sum_i64(dis.comm(), i64::from(local))? > 0 {
                    dis.add_condition(def.name.clone(), cond.copy_without_geometry());
                }
            }
        }
    }
    problem.set_design(design);
    if reader.comm().rank() == 0 {
        log::info!(
            "read/generate conditions in {:.3} secs",
            start.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

/// Attach knot vectors to the discretizations of a NURBS problem.
pub fn read_knots<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let problem = ps.problem_mut(slot)?;
    if problem.shape_function_type() != ShapeFunctionType::Nurbs {
        return Ok(());
    }
    for name in problem.dis_names().to_vec() {
        let dis = problem.get_dis_mut(&name)?;
        if !dis.kind().has_knot_vector() {
            return Err(DeckError::InvalidDiscretization {
                dis: name,
                reason: "a NURBS problem needs NURBS discretizations".into(),
            });
        }
        let mut knots = read_knot_section(reader, &name)?;
        if !dis.is_filled() {
            dis.fill_complete(false, false)?;
        }
        knots.finish_knots(dis.min_all_element_gid()?)?;
        dis.set_knots(knots)?;
    }
    Ok(())
}

/// Parse `--RESULT DESCRIPTION` against the design topology.
pub fn read_result<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let design = read_design_topology(reader)?;
    let problem = ps.problem_mut(slot)?;
    for line in reader.lines_in_section(RESULT_SECTION) {
        let test = parse_result_line(&line?, &design)?;
        problem.result_tests_mut().add(test);
    }
    Ok(())
}

/// Read `--PARTICLES`; each rank keeps a contiguous block. Skipped on
/// restart, where particles come from the restart files.
pub fn read_particles<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let problem = ps.problem_mut(slot)?;
    if problem.restart() != 0 {
        return Ok(());
    }
    let lines = reader.collect_section(PARTICLE_SECTION)?;
    let comm = reader.comm();
    let particles = block_range(lines.len(), comm.rank(), comm.size())
        .map(|i| parse_particle(i, &lines[i]))
        .collect::<Result<Vec<_>, _>>()?;
    problem.set_particles(particles);
    Ok(())
}

/// Create an empty discretization with its writer attached.
pub(crate) fn new_discretization<C: Communicator>(
    problem: &Problem<C>,
    name: &str,
    kind: DiscretizationKind,
    comm: &C,
    dofset: DofSet,
) -> Discretization<C> {
    let writer = DiscretizationWriter::new(problem.output_control(), name, comm.rank(), comm.size());
    Discretization::with_writer(name, kind, comm.clone(), problem.n_dim(), writer, dofset)
}

pub(crate) fn mesh_config(params: &ParameterList) -> Result<MeshPartitioningConfig, DeckError> {
    let mut cfg = MeshPartitioningConfig::default();
    cfg.imbalance_tol = params.get_at_or("MESH PARTITIONING", "IMBALANCE_TOL", 1.0 + cfg.imbalance_tol)? - 1.0;
    Ok(cfg)
}

/// Every element material must exist in the active material map. Collective
/// over each discretization's communicator; the smallest missing id is
/// reported on all ranks.
pub(crate) fn check_element_materials<C: Communicator>(
    ps: &ProblemSet<C>,
    slot: usize,
) -> Result<(), DeckError> {
    let materials = ps.active_materials()?;
    for dis in ps.problem(slot)?.discretizations() {
        let missing = dis
            .elements()
            .filter_map(|e| e.material)
            .filter(|&id| materials.get(id).is_none())
            .min()
            .map_or(i64::MAX, i64::from);
        let missing = all_reduce_min_i64(dis.comm(), missing)?;
        if missing != i64::MAX {
            let id = i32::try_from(missing)
                .map_err(|_| DeckError::Malformed(format!("material id {missing} out of range")))?;
            materials.require(id)?;
        }
    }
    Ok(())
}

/// Create the planned discretizations of the slot, read and distribute
/// their meshes, then read micro-scale problems where the problem type
/// asks for it.
pub fn read_fields<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
    read_mesh: bool,
) -> Result<(), DeckError> {
    let comm = reader.comm().clone();
    let problem = ps.problem_mut(slot)?;
    let problem_type = problem.problem_type();
    let flags = FieldFlags::from_parameters(problem.parameters(), problem_type)?;
    let plan = plan_fields(problem_type, problem.shape_function_type(), flags)?;
    let mut mesh = MeshReader::with_config(reader, mesh_config(problem.parameters())?);

    for field in &plan {
        let dofset = DofSet::standard(problem.dof_registry());
        let dis = new_discretization(problem, &field.name, field.kind, &comm, dofset);
        problem.add_dis(dis)?;
        for spec in &field.readers {
            match spec {
                ReaderSpec::Elements {
                    section,
                    element_types,
                } => {
                    let mut er = ElementReader::new(&field.name, section);
                    if let Some(types) = element_types {
                        er = er.with_types(types.iter().cloned());
                    }
                    mesh.add_element_reader(er);
                }
                ReaderSpec::Domain {
                    field_key,
                    geometry_section,
                } => {
                    let geometry: String =
                        problem
                            .parameters()
                            .get_at_or(geometry_section, "GEOMETRY", "input_file".to_string())?;
                    match geometry.to_ascii_lowercase().as_str() {
                        "input_file" => mesh.add_element_reader(ElementReader::new(
                            &field.name,
                            format!("{field_key} ELEMENTS"),
                        )),
                        "box" => mesh.add_domain_reader(DomainReader::new(
                            &field.name,
                            format!("{field_key} DOMAIN"),
                        )),
                        _ => {
                            return Err(DeckError::InvalidParameter {
                                key: format!("{geometry_section}/GEOMETRY"),
                                value: geometry,
                                expected: "input_file or box",
                            });
                        }
                    }
                }
            }
        }
    }

    if read_mesh && !mesh.is_empty() {
        mesh.read_and_partition(problem.dis_map_mut())?;
        check_element_materials(ps, slot)?;
    }

    if problem_type.reads_micro_fields() {
        crate::multiscale::read_micro_fields(ps, slot, reader)?;
    } else if problem_type == ProblemType::np_support {
        crate::multiscale::read_micro_fields_np_support(ps, slot, reader)?;
    }
    Ok(())
}

/// Run all load phases for slot 0 in their usual order.
pub fn read_input<C: Communicator>(
    ps: &mut ProblemSet<C>,
    reader: &DeckReader<C>,
    read_mesh: bool,
) -> Result<(), DeckError> {
    read_parameter(ps, 0, reader)?;
    read_materials(ps, 0, reader)?;
    read_cloning_material_map(ps, 0, reader)?;
    read_fields(ps, 0, reader, read_mesh)?;
    read_conditions(ps, 0, reader)?;
    read_knots(ps, 0, reader)?;
    read_result(ps, 0, reader)?;
    read_particles(ps, 0, reader)?;
    read_functions(ps, 0, reader)?;
    Ok(())
}
