mod util;

use mesh_deck::algs::communicator::NoComm;
use mesh_deck::config::ParameterList;
use mesh_deck::io::key_value::read_parameters_in_section;
use mesh_deck::io::line_definition::{LineDefinition, read_all_lines_in_section};
use mesh_deck::io::reader::DeckReader;
use mesh_deck::DeckError;
use util::{on_ranks, scratch_dir, write_deck};

const DECK: &str = "\
--STRUCTURAL DYNAMIC
DYNAMICTYP                      GenAlpha
TIMESTEP                        0.05
NUMSTEP                         20
Status Test = xml/status.xml
--STRUCTURAL DYNAMIC/GENALPHA
RHO_INF 0.9
--SOLVER 1
SOLVER UMFPACK
--MATERIALS
MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 100.0 NUE 0.3 DENS 1.0
MAT 2 MAT_Struct_StVenantKirchhoff YOUNG 1.0e3 NUE 0.25 DENS 2.5 THEXPANS 1e-5
";

fn stvenant() -> LineDefinition {
    LineDefinition::builder()
        .add_named_int("MAT")
        .add_tag("MAT_Struct_StVenantKirchhoff")
        .add_named_double("YOUNG")
        .add_named_double("NUE")
        .add_named_double("DENS")
        .add_optional_named_double("THEXPANS")
        .with_default(0.0)
        .build()
}

#[test]
fn parameter_sections_become_nested_sublists() {
    let dir = scratch_dir("params_nested");
    let path = write_deck(&dir, "deck.dat", DECK);
    let lists = on_ranks(2, |comm| {
        let reader = DeckReader::new(&path, comm, false).expect("reader");
        let mut list = ParameterList::new();
        for name in ["STRUCTURAL DYNAMIC", "STRUCTURAL DYNAMIC/GENALPHA", "SOLVER 1", "FLUID DYNAMIC"] {
            read_parameters_in_section(&reader, name, &mut list).expect("section");
        }
        list
    });
    assert_eq!(lists[0], lists[1]);
    let list = &lists[0];
    let sdyn = list.sublist("STRUCTURAL DYNAMIC").expect("sdyn");
    assert_eq!(sdyn.get_str("DYNAMICTYP"), Some("GenAlpha"));
    assert_eq!(sdyn.require::<f64>("TIMESTEP").expect("dt"), 0.05);
    assert_eq!(sdyn.require::<usize>("NUMSTEP").expect("steps"), 20);
    assert_eq!(sdyn.get_str("Status Test"), Some("xml/status.xml"));
    assert_eq!(
        list.get_at::<f64>("STRUCTURAL DYNAMIC/GENALPHA", "RHO_INF").expect("rho"),
        Some(0.9)
    );
    assert_eq!(list.get_at::<String>("SOLVER 1", "SOLVER").expect("solver").as_deref(), Some("UMFPACK"));
    assert!(list.sublist("FLUID DYNAMIC").is_none());
}

#[test]
fn duplicate_keys_are_rejected() {
    let dir = scratch_dir("params_duplicate");
    let path = write_deck(&dir, "deck.dat", "--PROBLEM TYP\nPROBLEMTYP Structure\nPROBLEMTYP Fluid\n");
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut list = ParameterList::new();
    let err = read_parameters_in_section(&reader, "PROBLEM TYP", &mut list).unwrap_err();
    assert!(matches!(err, DeckError::DuplicateParameter { ref key, .. } if key == "PROBLEMTYP"));
}

#[test]
fn wrongly_typed_values_name_the_key() {
    let dir = scratch_dir("params_typed");
    let path = write_deck(&dir, "deck.dat", "--PROBLEM SIZE\nDIM three\n");
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let mut list = ParameterList::new();
    read_parameters_in_section(&reader, "PROBLEM SIZE", &mut list).expect("section");
    let err = list.get_at::<i32>("PROBLEM SIZE", "DIM").unwrap_err();
    assert!(err.to_string().contains("DIM"), "{err}");
}

#[test]
fn material_lines_match_their_definition() {
    let dir = scratch_dir("params_lines");
    let path = write_deck(&dir, "deck.dat", DECK);
    let reader = DeckReader::new(&path, NoComm, false).expect("reader");
    let lines = read_all_lines_in_section(&reader, "MATERIALS", &[stvenant()]).expect("materials");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].get::<i32>("MAT").expect("id"), 1);
    assert_eq!(lines[0].get::<f64>("THEXPANS").expect("default"), 0.0);
    assert_eq!(lines[1].get::<f64>("YOUNG").expect("young"), 1.0e3);
    assert_eq!(lines[1].get::<f64>("THEXPANS").expect("given"), 1e-5);
}

#[test]
fn unmatched_lines_fail_with_the_expected_layout() {
    let def = stvenant();
    let err = def.read("MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 1.0 DENS 1.0").unwrap_err();
    assert!(matches!(err, DeckError::LineDefinition { .. }));
    assert!(def.read("MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 1.0 NUE 0.3 DENS 1.0 EXTRA 2").is_err());
    assert!(def
        .read("MAT 1 MAT_Struct_StVenantKirchhoff YOUNG 1.0 NUE 0.3 DENS 1.0 THEXPANS 1 THEXPANS 2")
        .is_err());
}
