#![allow(dead_code)]
use mesh_deck::algs::communicator::ThreadComm;
use std::path::{Path, PathBuf};

/// Fresh scratch directory for one test.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("mesh_deck_it_{}_{tag}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// Write `text` to `dir/name` and return the path.
pub fn write_deck(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write deck");
    path
}

/// Run `f` once per rank of a threaded world of `size` ranks; results are
/// ordered by rank.
pub fn on_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(ThreadComm) -> T + Sync,
{
    let world = ThreadComm::world(size);
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .into_iter()
            .map(|comm| {
                let f = &f;
                s.spawn(move || f(comm))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

pub fn assert_close(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "{a} vs {b} (tol {tol})");
}

/// Node and element sections of an `nx` x `ny` x `nz` block of HEX8 solids
/// over the unit cube, all with material `mat`. Node gids count from 1 in
/// x-fastest order.
pub fn hex_block(nx: usize, ny: usize, nz: usize, mat: i32) -> String {
    let gid = |i: usize, j: usize, k: usize| 1 + i + (nx + 1) * (j + (ny + 1) * k);
    let mut out = String::from("--NODE COORDS\n");
    for k in 0..=nz {
        for j in 0..=ny {
            for i in 0..=nx {
                out.push_str(&format!(
                    "NODE {} COORD {} {} {}\n",
                    gid(i, j, k),
                    i as f64 / nx as f64,
                    j as f64 / ny as f64,
                    k as f64 / nz as f64
                ));
            }
        }
    }
    out.push_str("--STRUCTURE ELEMENTS\n");
    let mut e = 1;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let n = [
                    gid(i, j, k),
                    gid(i + 1, j, k),
                    gid(i + 1, j + 1, k),
                    gid(i, j + 1, k),
                    gid(i, j, k + 1),
                    gid(i + 1, j, k + 1),
                    gid(i + 1, j + 1, k + 1),
                    gid(i, j + 1, k + 1),
                ];
                let conn: Vec<String> = n.iter().map(|g| g.to_string()).collect();
                out.push_str(&format!("{e} SOLID HEX8 {} MAT {mat} KINEM nonlinear\n", conn.join(" ")));
                e += 1;
            }
        }
    }
    out
}

/// `DSURF-NODE TOPOLOGY` lines putting the `x = 0` face of [`hex_block`]
/// into design surface 1.
pub fn x0_face_topology(nx: usize, ny: usize, nz: usize) -> String {
    let mut out = String::from("--DSURF-NODE TOPOLOGY\n");
    for k in 0..=nz {
        for j in 0..=ny {
            out.push_str(&format!("NODE {} DSURFACE 1\n", 1 + (nx + 1) * (j + (ny + 1) * k)));
        }
    }
    out
}
