//! Per-rank output of discretizations.
//!
//! Every discretization owns one [`DiscretizationWriter`]. A write produces one
//! JSON record per rank, `<prefix>.<discretization>.p<rank>.json`, appended
//! to a step list, so a post-processor can stitch the partitioned pieces back
//! together. Field values themselves belong to the solvers and are not
//! written here.

use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const OUTPUT_METADATA_VERSION: u32 = 1;

/// Where and under which name results go. Shared by all writers of a
/// problem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputControl {
    pub output_dir: PathBuf,
    /// File name prefix, usually the deck's file stem.
    pub prefix: String,
    /// Deck this output belongs to.
    pub input_file: PathBuf,
    /// Step to restart from, 0 for a fresh run.
    pub restart_step: i32,
    /// Write only on rank 0 instead of every rank.
    pub root_only: bool,
}

impl OutputControl {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            input_file: PathBuf::new(),
            restart_step: 0,
            root_only: false,
        }
    }

    /// Output next to the deck, prefixed with its file stem.
    pub fn for_input(input_file: &Path, restart_step: i32) -> Self {
        let output_dir = match input_file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let prefix = input_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into());
        Self {
            output_dir,
            prefix,
            input_file: input_file.to_path_buf(),
            restart_step,
            root_only: false,
        }
    }

    /// Path of the piece written by `rank` for `dis`.
    pub fn piece_path(&self, dis: &str, rank: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}.p{}.json", self.prefix, dis, rank))
    }

    /// Path of a coupling restart file.
    pub fn restart_path(&self, step: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}.restart.{step}.json", self.prefix))
    }
}

/// Metadata describing one written output step of one rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub num_row_nodes: usize,
    pub num_row_elements: usize,
    pub num_global_dofs: usize,
}

/// Content of a piece file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceMetadata {
    pub version: u32,
    pub discretization: String,
    pub rank: usize,
    pub size: usize,
    pub steps: Vec<StepRecord>,
}

/// Writer attached to one discretization.
#[derive(Clone, Debug)]
pub struct DiscretizationWriter {
    control: Arc<OutputControl>,
    dis_name: String,
    rank: usize,
    size: usize,
    written: Vec<StepRecord>,
}

impl DiscretizationWriter {
    pub fn new(control: Arc<OutputControl>, dis_name: impl Into<String>, rank: usize, size: usize) -> Self {
        Self {
            control,
            dis_name: dis_name.into(),
            rank,
            size,
            written: Vec::new(),
        }
    }

    pub fn control(&self) -> &OutputControl {
        &self.control
    }

    pub fn dis_name(&self) -> &str {
        &self.dis_name
    }

    /// Steps written so far by this writer.
    pub fn written_steps(&self) -> &[StepRecord] {
        &self.written
    }

    /// Record a step and rewrite this rank's piece file.
    pub fn write_step(&mut self, record: StepRecord) -> Result<(), DeckError> {
        self.written.push(record);
        if self.control.root_only && self.rank != 0 {
            return Ok(());
        }
        fs::create_dir_all(&self.control.output_dir)?;
        let meta = PieceMetadata {
            version: OUTPUT_METADATA_VERSION,
            discretization: self.dis_name.clone(),
            rank: self.rank,
            size: self.size,
            steps: self.written.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&meta)?;
        fs::write(self.control.piece_path(&self.dis_name, self.rank), bytes)?;
        Ok(())
    }
}

/// Load a piece written by [`DiscretizationWriter::write_step`].
pub fn read_piece(path: impl AsRef<Path>) -> Result<PieceMetadata, DeckError> {
    let bytes = fs::read(path)?;
    let meta: PieceMetadata = serde_json::from_slice(&bytes)?;
    if meta.version != OUTPUT_METADATA_VERSION {
        return Err(DeckError::Serde(format!(
            "unsupported output metadata version {}",
            meta.version
        )));
    }
    Ok(meta)
}
