use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mesh_deck::algs::communicator::NoComm;
use mesh_deck::io::reader::{DeckReader, ReaderConfig};
use std::fmt::Write as _;
use std::path::PathBuf;

// Deck with `n` HEX8 element lines plus a few parameter sections.
fn write_deck(n: usize) -> PathBuf {
    let mut text = String::from("--PROBLEM TYP\nPROBLEMTYP Structure\n--STRUCTURAL DYNAMIC\n");
    for i in 0..50 {
        let _ = writeln!(text, "KEY_{i} {i}");
    }
    text.push_str("--STRUCTURE ELEMENTS\n");
    for e in 1..=n {
        let b = 8 * e;
        let _ = writeln!(
            text,
            "{e} SOLID HEX8 {} {} {} {} {} {} {} {} MAT 1 KINEM nonlinear // element {e}",
            b,
            b + 1,
            b + 2,
            b + 3,
            b + 4,
            b + 5,
            b + 6,
            b + 7
        );
    }
    let path = std::env::temp_dir().join(format!("mesh_deck_bench_{}_{n}.dat", std::process::id()));
    std::fs::write(&path, text).expect("write bench deck");
    path
}

fn bench_section_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("section-query");
    let keep_all = ReaderConfig {
        excluded_names: Vec::new(),
        excluded_suffixes: Vec::new(),
    };

    for &n in &[1_000usize, 10_000, 50_000] {
        let path = write_deck(n);
        let streamed = DeckReader::new(&path, NoComm, false).expect("reader");
        let shared = DeckReader::with_config(&path, NoComm, false, &keep_all).expect("reader");

        group.bench_with_input(BenchmarkId::new("on-disk", n), &streamed, |b, reader| {
            b.iter(|| reader.lines_in_section("STRUCTURE ELEMENTS").count());
        });
        group.bench_with_input(BenchmarkId::new("in-memory", n), &shared, |b, reader| {
            b.iter(|| reader.lines_in_section("STRUCTURE ELEMENTS").count());
        });
        group.bench_with_input(BenchmarkId::new("parameters", n), &shared, |b, reader| {
            b.iter(|| reader.lines_in_section("STRUCTURAL DYNAMIC").count());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_section_query);
criterion_main!(benches);
