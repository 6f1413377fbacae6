//! Restart record of the coupling algorithm.

use crate::algs::collective::{all_reduce_sum_i64, broadcast_string};
use crate::algs::communicator::Communicator;
use crate::deck_error::DeckError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CouplingRestart {
    pub step: usize,
    pub time: f64,
    /// Relaxation parameter reached at `step`.
    pub omega: f64,
}

impl CouplingRestart {
    pub fn write(&self, path: &Path) -> Result<(), DeckError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Write on rank 0 only. Collective: a failed write is reported on every
    /// rank of `comm`.
    pub fn write_shared<C: Communicator>(&self, path: &Path, comm: &C) -> Result<(), DeckError> {
        let written = if comm.is_root() { self.write(path) } else { Ok(()) };
        let failures = all_reduce_sum_i64(comm, written.is_err() as i64)?;
        written?;
        if failures > 0 {
            return Err(DeckError::DeckUnreadable {
                path: path.display().to_string(),
                reason: "restart record could not be written on rank 0".into(),
            });
        }
        Ok(())
    }

    /// Read on rank 0 and share with every rank of `comm`. A failure on rank
    /// 0 is reported on all ranks.
    pub fn read_shared<C: Communicator>(path: &Path, comm: &C) -> Result<Self, DeckError> {
        let mut content = String::new();
        let mut root_err = None;
        if comm.is_root() {
            match fs::read_to_string(path) {
                Ok(s) => content = s,
                Err(e) => root_err = Some(e),
            }
        }
        broadcast_string(comm, 0, &mut content)?;
        if let Some(e) = root_err {
            return Err(e.into());
        }
        if content.is_empty() {
            return Err(DeckError::DeckUnreadable {
                path: path.display().to_string(),
                reason: "restart file missing or empty on rank 0".into(),
            });
        }
        Ok(serde_json::from_str(&content)?)
    }
}
