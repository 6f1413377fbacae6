//! Micro-scale problems of multiscale materials.
//!
//! Macro ranks that evaluate multiscale material elect colors, split the
//! global communicator together with the supporting ranks, and read one
//! micro problem per multiscale material into its own problem slot. The
//! collective sequence seen by a group is identical on the macro rank and
//! its supporting ranks:
//!
//! 1. `broadcast(nummicromat)` on the global communicator,
//! 2. the split,
//! 3. `broadcast(microcount)`, then per micro problem `broadcast(microdisnum)`,
//!    `broadcast(input path)`, the micro read, `broadcast(restart)`.

pub mod color;

pub use color::{macro_color, support_color, support_layout};

use crate::algs::collective::{all_gather, all_reduce_sum_i64, broadcast_i64, broadcast_string};
use crate::algs::communicator::Communicator;
use crate::algs::wire::WireI64;
use crate::deck_error::DeckError;
use crate::discretization::{DiscretizationKind, DofSet};
use crate::io::mesh_reader::{ElementReader, MeshReader};
use crate::io::reader::DeckReader;
use crate::io::writer::OutputControl;
use crate::material::{MaterialKind, MicroScale};
use crate::problem::read::{
    check_element_materials, mesh_config, new_discretization, read_conditions, read_functions,
    read_materials, read_parameter, read_result,
};
use crate::problem::{NestedParallelism, ProblemSet};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Outcome of the macro-side election.
#[derive(Debug)]
pub struct MacroElection<C> {
    /// Macro ranks that found multiscale material.
    pub nummicromat: usize,
    pub color: Option<usize>,
    /// Group communicator; `None` for ranks without a color.
    pub sub: Option<C>,
}

/// Elect colors among the macro ranks and split `global`. Every macro rank
/// calls this, with or without multiscale material.
pub fn elect_and_split<C: Communicator>(
    local: &C,
    global: &C,
    found: bool,
) -> Result<MacroElection<C>, DeckError> {
    let mut nummicromat = all_reduce_sum_i64(local, i64::from(found))?;
    broadcast_i64(global, 0, &mut nummicromat)?;
    let mine = if found { local.rank() as i64 } else { -1 };
    let found_ranks: Vec<i64> = all_gather(local, WireI64::of(mine))?
        .into_iter()
        .map(|w| w.get())
        .collect();
    let color = macro_color(&found_ranks, local.rank());
    // the macro rank is rank 0 of its group
    let sub = global.split(color, 0)?;
    Ok(MacroElection {
        nummicromat: usize::try_from(nummicromat).unwrap_or_default(),
        color,
        sub,
    })
}

/// Join the group of a macro rank as a supporting rank.
/// A negative count from rank 0 means the macro ranks failed before the
/// split; the split is skipped and the failure reported here as well.
pub fn support_split<C: Communicator>(local: &C, global: &C) -> Result<Option<C>, DeckError> {
    let mut nummicromat = 0;
    broadcast_i64(global, 0, &mut nummicromat)?;
    if nummicromat < 0 {
        return Err(DeckError::comm(0, "macro ranks failed to resolve their multiscale materials"));
    }
    let layout = support_layout(local.size(), usize::try_from(nummicromat).unwrap_or_default());
    let color = support_color(&layout, local.rank());
    global.split(color, global.rank())
}

/// Macro discretization and micro field layout of the active multiscale kind.
struct MicroPlan {
    macro_dis: &'static str,
    elch: bool,
    structural: bool,
}

fn micro_plan<C: Communicator>(ps: &ProblemSet<C>, slot: usize) -> Result<Option<MicroPlan>, DeckError> {
    let materials = ps.problem(slot)?.materials();
    let id_struct = materials.first_id_by_type(MaterialKind::StructMultiscale);
    let id_scatra = materials.first_id_by_type(MaterialKind::ScatraMultiscale);
    let id_elch = materials.first_id_by_type(MaterialKind::NewmanMultiscale);
    let active = [id_struct, id_scatra, id_elch].iter().flatten().count();
    match active {
        0 => Ok(None),
        1 => Ok(Some(MicroPlan {
            macro_dis: if id_struct.is_some() { "structure" } else { "scatra" },
            elch: id_elch.is_some(),
            structural: id_struct.is_some(),
        })),
        _ => Err(DeckError::MultipleMultiscaleKinds),
    }
}

/// Micro inputs of the multiscale materials referenced by the column
/// elements of the macro discretization, by material id.
fn scan_micro_inputs<C: Communicator>(
    ps: &ProblemSet<C>,
    slot: usize,
    plan: &MicroPlan,
) -> Result<Vec<MicroScale>, DeckError> {
    let problem = ps.problem(slot)?;
    let materials = problem.materials();
    let mut ids = BTreeSet::new();
    for e in problem.get_dis(plan.macro_dis)?.elements() {
        let Some(id) = e.material else { continue };
        let mat = if plan.elch {
            materials.effective(id)?
        } else {
            materials.require(id)?
        };
        if mat.kind.is_multiscale() {
            ids.insert(mat.id);
        }
    }
    ids.into_iter()
        .map(|id| {
            materials
                .require(id)?
                .micro_scale()
                .cloned()
                .ok_or_else(|| DeckError::UnknownMaterial {
                    id,
                    name: "multiscale material without micro input".into(),
                })
        })
        .collect()
}

fn resolve_micro_path(file: &Path, input_dir: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        input_dir.join(file)
    }
}

/// Read the micro problems of the multiscale materials evaluated on this
/// rank. Collective over the global communicator of `slot`.
///
/// When supporting ranks exist every macro rank takes part in the election,
/// with or without multiscale material. A scan failure on any macro rank
/// fails every macro rank, and the supporting ranks are released with a
/// negative material count before the split.
pub fn read_micro_fields<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let (local, global) = {
        let comms = ps.problem(slot)?.communicators();
        (comms.local().clone(), comms.global().clone())
    };
    let supported = global.size() != local.size();
    let scanned = micro_plan(ps, slot).and_then(|plan| match plan {
        Some(plan) => Ok(Some((scan_micro_inputs(ps, slot, &plan)?, plan))),
        None => Ok(None),
    });
    let failures = all_reduce_sum_i64(&local, i64::from(scanned.is_err()))?;
    if failures > 0 {
        if supported {
            let mut abort = -1;
            broadcast_i64(&global, 0, &mut abort)?;
        }
        scanned?;
        return Err(DeckError::Malformed(format!(
            "multiscale materials could not be resolved on {failures} macro rank(s)"
        )));
    }
    let Some((micro, plan)) = scanned? else {
        if supported {
            elect_and_split(&local, &global, false)?;
        }
        return Ok(());
    };
    let election = elect_and_split(&local, &global, !micro.is_empty())?;
    let Some(sub) = election.sub else {
        return Ok(());
    };
    ps.problem_mut(slot)?.communicators_mut().set_sub_comm(sub.clone());
    log::debug!(
        "macro rank {} reads {} micro problem(s) as color {:?} of {}",
        local.rank(),
        micro.len(),
        election.color,
        election.nummicromat
    );

    let mut microcount = micro.len() as i64;
    broadcast_i64(&sub, 0, &mut microcount)?;
    let input_dir = reader.input_dir();
    for scale in micro {
        let mut microdisnum = scale.microdis_num as i64;
        broadcast_i64(&sub, 0, &mut microdisnum)?;
        let (dis_name, section) = if plan.structural {
            ("structure".to_string(), "STRUCTURE ELEMENTS")
        } else {
            (format!("scatra_multiscale_{microdisnum}"), "TRANSPORT ELEMENTS")
        };
        let mut path = resolve_micro_path(&scale.micro_file, &input_dir)
            .to_string_lossy()
            .into_owned();
        broadcast_string(&sub, 0, &mut path)?;
        read_micro_problem(ps, slot, &sub, microdisnum, Path::new(&path), &dis_name, section)?;
    }
    Ok(())
}

/// Supporting-rank variant of [`read_micro_fields`]: no elements are
/// scanned, every value comes from the group's macro rank.
pub fn read_micro_fields_np_support<C: Communicator>(
    ps: &mut ProblemSet<C>,
    slot: usize,
    _reader: &DeckReader<C>,
) -> Result<(), DeckError> {
    let (local, global) = {
        let comms = ps.problem(slot)?.communicators();
        (comms.local().clone(), comms.global().clone())
    };
    let Some(sub) = support_split(&local, &global)? else {
        return Ok(());
    };
    ps.problem_mut(slot)?.communicators_mut().set_sub_comm(sub.clone());

    let mut microcount = 0;
    broadcast_i64(&sub, 0, &mut microcount)?;
    for _ in 0..microcount {
        let mut microdisnum = -1;
        broadcast_i64(&sub, 0, &mut microdisnum)?;
        let mut path = String::new();
        broadcast_string(&sub, 0, &mut path)?;
        read_micro_problem(
            ps,
            slot,
            &sub,
            microdisnum,
            Path::new(&path),
            "structure",
            "STRUCTURE ELEMENTS",
        )?;
    }
    Ok(())
}

/// Read one micro problem into slot `microdisnum`, collective over `sub`.
fn read_micro_problem<C: Communicator>(
    ps: &mut ProblemSet<C>,
    macro_slot: usize,
    sub: &C,
    microdisnum: i64,
    path: &Path,
    dis_name: &str,
    element_section: &str,
) -> Result<(), DeckError> {
    let micro_slot = usize::try_from(microdisnum).map_err(|_| DeckError::InvalidParameter {
        key: "MICRODIS_NUM".into(),
        value: microdisnum.to_string(),
        expected: "non-negative problem slot",
    })?;
    let micro_reader = DeckReader::new(path, sub.clone(), true)?;
    let nested = ps.problem(macro_slot)?.communicators().nested();
    let n_dim = ps.problem(macro_slot)?.n_dim();

    let micro = ps.get_or_create(micro_slot);
    micro.communicators_mut().set_sub_comm(sub.clone());
    micro.set_output_control(OutputControl::for_input(path, 0));
    micro.set_n_dim(n_dim);
    let dofset = if nested == NestedParallelism::NoNested {
        DofSet::independent()
    } else {
        DofSet::standard(micro.dof_registry())
    };
    let dis = new_discretization(micro, dis_name, DiscretizationKind::Polynomial, sub, dofset);
    micro.add_dis(dis)?;

    read_parameter(ps, micro_slot, &micro_reader)?;
    let mesh_cfg = mesh_config(ps.problem(micro_slot)?.parameters())?;

    let mut guard = ps.redirect_materials(micro_slot);
    read_materials(&mut guard, micro_slot, &micro_reader)?;
    let mut mesh = MeshReader::with_config(&micro_reader, mesh_cfg);
    mesh.add_element_reader(ElementReader::new(dis_name, element_section));
    mesh.read_and_partition(guard.problem_mut(micro_slot)?.dis_map_mut())?;
    check_element_materials(&guard, micro_slot)?;
    read_functions(&mut guard, micro_slot, &micro_reader)?;
    read_result(&mut guard, micro_slot, &micro_reader)?;
    read_conditions(&mut guard, micro_slot, &micro_reader)?;
    guard
        .problem_mut(micro_slot)?
        .get_dis_mut(dis_name)?
        .fill_complete(true, false)?;

    let mut restart = i64::from(guard.problem(macro_slot)?.restart());
    broadcast_i64(sub, 0, &mut restart)?;
    let restart = i32::try_from(restart).map_err(|_| DeckError::comm(0, "restart step out of range"))?;
    guard.problem_mut(macro_slot)?.set_restart_step(restart);
    guard.problem_mut(micro_slot)?.set_restart_step(restart);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::ThreadComm;

    #[test]
    fn macro_and_support_ranks_share_one_group() {
        // global ranks 0,1 run the macro problem, 2,3 support it; only rank 0
        // owns multiscale elements
        let world = ThreadComm::world(4);
        let sizes: Vec<Option<(usize, usize)>> = std::thread::scope(|s| {
            let handles: Vec<_> = world
                .iter()
                .cloned()
                .map(|global| {
                    s.spawn(move || {
                        let macro_side = global.rank() < 2;
                        let local = global
                            .split(Some(usize::from(!macro_side)), global.rank())
                            .expect("split")
                            .expect("member");
                        let sub = if macro_side {
                            let e = elect_and_split(&local, &global, global.rank() == 0).expect("elect");
                            assert_eq!(e.nummicromat, 1);
                            e.sub
                        } else {
                            support_split(&local, &global).expect("support")
                        };
                        sub.map(|c| (c.rank(), c.size()))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("rank panicked"))
                .collect()
        });
        assert_eq!(sizes, vec![Some((0, 3)), None, Some((1, 3)), Some((2, 3))]);
    }

    #[test]
    fn relative_micro_inputs_resolve_against_the_deck() {
        let dir = Path::new("/data/run");
        assert_eq!(
            resolve_micro_path(Path::new("micro.dat"), dir),
            PathBuf::from("/data/run/micro.dat")
        );
        assert_eq!(
            resolve_micro_path(Path::new("/abs/micro.dat"), dir),
            PathBuf::from("/abs/micro.dat")
        );
    }
}
