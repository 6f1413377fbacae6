mod util;

use mesh_deck::algs::communicator::{Communicator, NoComm};
use mesh_deck::discretization::DiscretizationKind;
use mesh_deck::io::reader::DeckReader;
use mesh_deck::material::MaterialKind;
use mesh_deck::problem::read::read_input;
use mesh_deck::problem::result::ResultTarget;
use mesh_deck::problem::{CommunicatorBundle, ProblemSet, ProblemType, ShapeFunctionType};
use mesh_deck::DeckError;
use std::collections::BTreeSet;
use std::path::Path;
use util::{hex_block, on_ranks, scratch_dir, write_deck, x0_face_topology};

fn structure_deck(extra: &str) -> String {
    format!(
        "\
--PROBLEM SIZE
DIM 3
--PROBLEM TYP
PROBLEMTYP Structure
RANDSEED 7
--STRUCTURAL DYNAMIC
DYNAMICTYP Statics
--MATERIALS
MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 100.0 NUE 0.3 DENS 1.0
--FUNCT1
SYMBOLIC_FUNCTION_OF_TIME t
--DESIGN SURF DIRICH CONDITIONS
E 1 - NUMDOF 3 ONOFF 1 1 1 VAL 0.0 0.0 0.0 FUNCT 0 0 0
--DESIGN POINT NEUMANN CONDITIONS
E 1 - NUMDOF 3 ONOFF 0 0 1 VAL 0.0 0.0 -1.0 FUNCT 0 0 1
--DNODE-NODE TOPOLOGY
NODE 27 DNODE 1
{}{}--RESULT DESCRIPTION
STRUCTURE DIS structure NODE 27 QUANTITY dispz VALUE -1.0 TOLERANCE 1e-6
STRUCTURE DIS structure DSURFACE 1 QUANTITY dispx VALUE 0.0 TOLERANCE 1e-9
{extra}",
        x0_face_topology(2, 2, 2),
        hex_block(2, 2, 2, 1)
    )
}

struct RankView {
    size: usize,
    row_elements: Vec<i64>,
    global_elements: usize,
    global_nodes: usize,
    dirichlet: usize,
    neumann: usize,
    unknown: Vec<String>,
}

fn read_structure<C: Communicator>(path: &Path, comm: C) -> RankView {
    let reader = DeckReader::new(path, comm.clone(), false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(comm.clone()));
    read_input(&mut ps, &reader, true).expect("read input");
    let problem = ps.problem(0).expect("slot 0");
    assert_eq!(problem.problem_type(), ProblemType::structure);
    assert_eq!(problem.n_dim(), 3);
    assert_eq!(problem.rand_seed(), 7);
    assert_eq!(problem.dis_names(), ["structure".to_string()]);
    assert_eq!(
        problem.materials().require(1).expect("mat 1").kind,
        MaterialKind::StVenantKirchhoff
    );
    assert_eq!(problem.functions().len(), 1);
    assert_eq!(problem.result_tests().len(), 2);
    match &problem.result_tests().tests()[1].target {
        ResultTarget::NodeSet { nodes, .. } => assert_eq!(nodes.len(), 9),
        other => panic!("unexpected target {other:?}"),
    }
    let dis = problem.get_dis("structure").expect("structure");
    assert!(dis.is_filled());
    assert_eq!(dis.writer().dis_name(), "structure");
    RankView {
        size: comm.size(),
        row_elements: dis.element_row_gids(),
        global_elements: dis.num_global_elements().expect("elements"),
        global_nodes: dis.num_global_nodes().expect("nodes"),
        dirichlet: dis.conditions("Dirichlet").len(),
        neumann: dis.conditions("PointNeumann").len(),
        unknown: reader.unknown_sections(),
    }
}

#[test]
fn structure_deck_is_distributed_over_any_rank_count() {
    let dir = scratch_dir("input_structure");
    let path = write_deck(&dir, "block.dat", &structure_deck(""));
    for size in 1..=4 {
        let views = on_ranks(size, |comm| read_structure(&path, comm));
        let mut seen = BTreeSet::new();
        for v in &views {
            assert_eq!(v.size, size);
            assert_eq!(v.global_elements, 8);
            assert_eq!(v.global_nodes, 27);
            assert_eq!((v.dirichlet, v.neumann), (1, 1));
            assert!(v.unknown.is_empty(), "{:?}", v.unknown);
            for &gid in &v.row_elements {
                assert!(seen.insert(gid), "element {gid} owned twice on {size} ranks");
            }
        }
        assert_eq!(seen, (1..=8).collect::<BTreeSet<i64>>());
    }
}

#[test]
fn conditions_carry_the_design_node_cloud() {
    let dir = scratch_dir("input_conditions");
    let path = write_deck(&dir, "block.dat", &structure_deck(""));
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
    read_input(&mut ps, &reader, true).expect("read input");
    let problem = ps.problem(0).expect("slot 0");
    let dis = problem.get_dis("structure").expect("structure");
    let dirich = &dis.conditions("Dirichlet")[0];
    assert_eq!(dirich.id, 0);
    assert_eq!(dirich.nodes.len(), 9);
    assert!(dirich.contains_node(1) && !dirich.contains_node(2));
    assert_eq!(dirich.params.get::<Vec<i64>>("ONOFF").expect("onoff"), vec![1, 1, 1]);
    let neumann = &dis.conditions("PointNeumann")[0];
    assert_eq!(neumann.nodes.as_slice(), &[27]);
    assert_eq!(neumann.params.get::<String>("TYPE").expect("default"), "Live");
    for node in dis.nodes() {
        let on_face = dirich.contains_node(node.gid);
        assert_eq!(on_face, node.coords[0] == 0.0, "node {}", node.gid);
    }
}

#[test]
fn mesh_can_be_skipped() {
    let dir = scratch_dir("input_no_mesh");
    let path = write_deck(&dir, "block.dat", &structure_deck(""));
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
    read_input(&mut ps, &reader, false).expect("read input");
    let dis = ps.problem(0).expect("slot 0").get_dis("structure").expect("structure");
    assert_eq!(dis.elements().count(), 0);
    assert!(dis.conditions("Dirichlet").is_empty());
}

#[test]
fn generated_box_replaces_the_element_section() {
    let deck = "\
--PROBLEM TYP
PROBLEMTYP Structure
RANDSEED 1
--STRUCTURAL DYNAMIC
GEOMETRY box
--MATERIALS
MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 1.0 NUE 0.0 DENS 1.0
--STRUCTURE DOMAIN
LOWER_BOUND  0.0 0.0 0.0
UPPER_BOUND  2.0 1.0 1.0
INTERVALS    4 2 1
ELEMENTS     SOLID HEX8 MAT 1 KINEM linear
";
    let dir = scratch_dir("input_box");
    let path = write_deck(&dir, "box.dat", deck);
    let views = on_ranks(2, |comm| {
        let reader = DeckReader::new(&path, comm.clone(), false).expect("reader");
        let mut ps = ProblemSet::new(CommunicatorBundle::new(comm));
        read_input(&mut ps, &reader, true).expect("read input");
        let dis = ps.problem(0).expect("slot 0").get_dis("structure").expect("structure");
        let kinem: Vec<String> = dis
            .elements()
            .map(|e| e.params.get::<String>("KINEM").expect("kinem"))
            .collect();
        assert!(kinem.iter().all(|k| k == "linear"));
        let max_x = dis.nodes().map(|n| n.coords[0]).fold(f64::MIN, f64::max);
        (
            dis.element_row_gids().len(),
            dis.num_global_elements().expect("elements"),
            dis.num_global_nodes().expect("nodes"),
            max_x,
        )
    });
    assert_eq!(views[0].0 + views[1].0, 8);
    for (_, elements, nodes, _) in &views {
        assert_eq!(*elements, 8);
        assert_eq!(*nodes, 5 * 3 * 2);
    }
    assert!(views.iter().any(|v| v.3 == 2.0));
}

#[test]
fn unknown_material_fails_on_every_rank() {
    let mut deck = structure_deck("");
    // element 8 refers to a material nobody defined
    deck = deck.replace("8 SOLID HEX8 14 15 18 17 23 24 27 26 MAT 1", "8 SOLID HEX8 14 15 18 17 23 24 27 26 MAT 5");
    assert!(deck.contains("MAT 5"));
    let dir = scratch_dir("input_unknown_material");
    let path = write_deck(&dir, "block.dat", &deck);
    let errors = on_ranks(2, |comm| {
        let reader = DeckReader::new(&path, comm.clone(), false).expect("reader");
        let mut ps = ProblemSet::new(CommunicatorBundle::new(comm));
        read_input(&mut ps, &reader, true).unwrap_err()
    });
    for e in errors {
        assert!(matches!(e, DeckError::UnknownMaterial { id: 5, .. }), "{e}");
    }
}

#[test]
fn condition_on_missing_design_object_is_rejected() {
    let deck = structure_deck("").replace(
        "E 1 - NUMDOF 3 ONOFF 1 1 1",
        "E 3 - NUMDOF 3 ONOFF 1 1 1",
    );
    let dir = scratch_dir("input_design_range");
    let path = write_deck(&dir, "block.dat", &deck);
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
    let err = read_input(&mut ps, &reader, true).unwrap_err();
    assert!(matches!(err, DeckError::DesignOutOfRange { id: 2, len: 1, .. }), "{err}");
}

#[test]
fn element_on_missing_node_is_rejected() {
    let deck = structure_deck("").replace("NODE 26 COORD", "NODE 126 COORD");
    let dir = scratch_dir("input_missing_node");
    let path = write_deck(&dir, "block.dat", &deck);
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
    let err = read_input(&mut ps, &reader, true).unwrap_err();
    assert!(matches!(err, DeckError::MissingNode { node: 26, .. }), "{err}");
}

#[test]
fn nurbs_fluid_gets_one_discretization_with_knots() {
    let deck = "\
--PROBLEM SIZE
DIM 2
--PROBLEM TYP
PROBLEMTYP Fluid
SHAPEFCT Nurbs
RANDSEED 3
--FLUID DYNAMIC
TIMESTEP 0.1
--MATERIALS
MAT 1 MAT_fluid DYNVISCOSITY 0.01 DENSITY 1.0
--FLUID KNOTVECTORS
NURBS_DIMENSION 2
BEGIN NURBSPATCH
ID 1
NUMKNOTS 6
DEGREE 2
TYPE Interpolated
0.0
0.0
0.0
1.0
1.0
1.0
NUMKNOTS 6
DEGREE 2
TYPE Interpolated
0.0
0.0
0.0
1.0
1.0
1.0
END NURBSPATCH
--NODE COORDS
CP 1 COORD 0.0 0.0 0.0 1.0
CP 2 COORD 0.5 0.0 0.0 1.0
CP 3 COORD 1.0 0.0 0.0 1.0
CP 4 COORD 0.0 0.5 0.0 1.0
CP 5 COORD 0.5 0.5 0.0 0.8
CP 6 COORD 1.0 0.5 0.0 1.0
CP 7 COORD 0.0 1.0 0.0 1.0
CP 8 COORD 0.5 1.0 0.0 1.0
CP 9 COORD 1.0 1.0 0.0 1.0
--FLUID ELEMENTS
1 FLUID NURBS9 1 2 3 4 5 6 7 8 9 MAT 1 NA Euler
";
    let dir = scratch_dir("input_nurbs");
    let path = write_deck(&dir, "cavity.dat", deck);
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut ps = ProblemSet::new(CommunicatorBundle::new(NoComm));
    read_input(&mut ps, &reader, true).expect("read input");
    let problem = ps.problem(0).expect("slot 0");
    assert_eq!(problem.problem_type(), ProblemType::fluid);
    assert_eq!(problem.shape_function_type(), ShapeFunctionType::Nurbs);
    assert_eq!(problem.dis_names(), ["fluid".to_string()]);
    let dis = problem.get_dis("fluid").expect("fluid");
    assert_eq!(dis.kind(), DiscretizationKind::Nurbs);
    assert_eq!(dis.writer().dis_name(), "fluid");
    let knots = dis.knots().expect("knots");
    assert!(knots.is_filled());
    assert_eq!(knots.patch_of_element(1), Some(0));
    assert_eq!(dis.node(5).expect("cp 5").weight, Some(0.8));
    assert_eq!(dis.element(1).expect("element").dofs_per_node, 3);
    assert!(reader.unknown_sections().is_empty(), "{:?}", reader.unknown_sections());
}
