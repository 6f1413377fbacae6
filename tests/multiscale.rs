mod util;

use mesh_deck::algs::communicator::{Communicator, NoComm};
use mesh_deck::io::reader::DeckReader;
use mesh_deck::material::MaterialKind;
use mesh_deck::problem::read::read_input;
use mesh_deck::problem::{CommunicatorBundle, NestedParallelism, ProblemSet, ProblemType};
use std::path::{Path, PathBuf};
use util::{hex_block, on_ranks, scratch_dir, write_deck};

fn macro_deck(nx: usize, ny: usize) -> String {
    format!(
        "\
--PROBLEM TYP
PROBLEMTYP Structure
RANDSEED 11
--MATERIALS
MAT 1 MAT_Struct_Multiscale MICROFILE micro.dat MICRODIS_NUM 1
{}",
        hex_block(nx, ny, 1, 1)
    )
}

fn micro_deck() -> String {
    format!(
        "\
--PROBLEM TYP
PROBLEMTYP Structure
RANDSEED 12
--MATERIALS
MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 10.0 NUE 0.2 DENS 1.0
{}",
        hex_block(1, 1, 1, 1)
    )
}

fn decks(tag: &str, nx: usize, ny: usize) -> (PathBuf, PathBuf) {
    let dir = scratch_dir(tag);
    write_deck(&dir, "micro.dat", &micro_deck());
    let main = write_deck(&dir, "macro.dat", &macro_deck(nx, ny));
    let support = write_deck(&dir, "support.dat", "--PROBLEM TYP\nPROBLEMTYP NP_Supporting_Procs\n");
    (main, support)
}

/// (sub size, micro elements, micro material kind) seen by one rank.
fn micro_view<C: Communicator>(ps: &ProblemSet<C>) -> (usize, usize, MaterialKind) {
    let micro = ps.problem(1).expect("micro slot");
    let dis = micro.get_dis("structure").expect("micro structure");
    assert!(dis.is_filled());
    let sub = micro.communicators().sub().expect("sub communicator");
    (
        sub.size(),
        dis.num_global_elements().expect("elements"),
        micro.materials().require(1).expect("micro mat").kind,
    )
}

fn read<C: Communicator>(path: &Path, comms: CommunicatorBundle<C>) -> ProblemSet<C> {
    let reader = DeckReader::new(path, comms.local().clone(), false).expect("reader");
    let mut ps = ProblemSet::new(comms);
    read_input(&mut ps, &reader, true).expect("read input");
    ps
}

#[test]
fn serial_macro_problem_reads_its_micro_problem() {
    let (main, _) = decks("ms_serial", 2, 1);
    let ps = read(&main, CommunicatorBundle::new(NoComm));
    assert_eq!(ps.slots().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(ps.read_from_problem(), 0);
    let macro_problem = ps.problem(0).expect("macro");
    let mat = macro_problem.materials().require(1).expect("macro mat");
    assert_eq!(mat.kind, MaterialKind::StructMultiscale);
    assert!(mat.micro_scale().expect("micro scale").micro_file.ends_with("micro.dat"));
    assert_eq!(micro_view(&ps), (1, 1, MaterialKind::StVenantKirchhoff));
    assert_eq!(ps.problem(1).expect("micro").rand_seed(), 12);
    assert!(ps.problem(1).expect("micro").output_control().input_file.ends_with("micro.dat"));
}

#[test]
fn every_macro_rank_with_multiscale_elements_gets_its_own_group() {
    let (main, _) = decks("ms_two_macro", 2, 2);
    let views = on_ranks(2, |comm| {
        let ps = read(&main, CommunicatorBundle::new(comm));
        micro_view(&ps)
    });
    assert_eq!(views, vec![(1, 1, MaterialKind::StVenantKirchhoff); 2]);
}

#[test]
fn supporting_ranks_join_the_macro_rank_for_the_micro_read() {
    let (main, support) = decks("ms_support", 1, 1);
    let views = on_ranks(3, |global| {
        let macro_side = global.rank() == 0;
        let local = global
            .split(Some(usize::from(!macro_side)), global.rank())
            .expect("split")
            .expect("member");
        let comms = CommunicatorBundle::with_groups(global, local, NestedParallelism::SeparateInputFiles);
        let ps = read(if macro_side { &main } else { &support }, comms);
        let expected = if macro_side {
            ProblemType::structure
        } else {
            ProblemType::np_support
        };
        assert_eq!(ps.problem(0).expect("slot 0").problem_type(), expected);
        micro_view(&ps)
    });
    assert_eq!(views, vec![(3, 1, MaterialKind::StVenantKirchhoff); 3]);
}

/// Run one macro rank on `main` and `supporters` ranks on the supporting deck;
/// returns per rank whether the read succeeded and whether a group formed.
fn read_with_support(main: &Path, support: &Path, supporters: usize) -> Vec<(bool, bool)> {
    on_ranks(1 + supporters, |global| {
        let macro_side = global.rank() == 0;
        let local = global
            .split(Some(usize::from(!macro_side)), global.rank())
            .expect("split")
            .expect("member");
        let comms = CommunicatorBundle::with_groups(global, local, NestedParallelism::SeparateInputFiles);
        let reader = DeckReader::new(if macro_side { main } else { support }, comms.local().clone(), false)
            .expect("reader");
        let mut ps = ProblemSet::new(comms);
        let ok = read_input(&mut ps, &reader, true).is_ok();
        let grouped = ps
            .problem(0)
            .is_ok_and(|p| p.communicators().sub().is_some());
        (ok, grouped)
    })
}

#[test]
fn supporting_ranks_are_released_when_no_macro_rank_is_multiscale() {
    let dir = scratch_dir("ms_support_plain");
    let main = write_deck(&dir, "macro.dat", &micro_deck());
    let support = write_deck(&dir, "support.dat", "--PROBLEM TYP\nPROBLEMTYP NP_Supporting_Procs\n");
    assert_eq!(read_with_support(&main, &support, 2), vec![(true, false); 3]);
}

#[test]
fn a_macro_failure_before_the_split_reaches_the_supporting_ranks() {
    let dir = scratch_dir("ms_support_failure");
    let deck = macro_deck(1, 1).replace(
        "--MATERIALS\n",
        "--MATERIALS\nMAT 2 MAT_scatra_multiscale MICROFILE micro.dat MICRODIS_NUM 2 POROSITY 0.5 \
         TORTUOSITY 1.0 A_s 1.0 DIFFUSIVITY 1.0\n",
    );
    let main = write_deck(&dir, "macro.dat", &deck);
    let support = write_deck(&dir, "support.dat", "--PROBLEM TYP\nPROBLEMTYP NP_Supporting_Procs\n");
    assert_eq!(read_with_support(&main, &support, 2), vec![(false, false); 3]);
}
