// ============================================================
// Layer 2 — Inspect Use Case
// ============================================================
// Opens one checkpoint file and summarises it without building
// a model: the stored run config, every parameter's shape and
// the total parameter count.

use anyhow::Result;
use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::domain::{checkpoint::parameter_count, run_config::RunConfig};
use crate::infra::checkpoint::load_checkpoint_file;

/// What a checkpoint file contains
#[derive(Debug, Clone)]
pub struct CheckpointReport {
    pub path:       PathBuf,
    pub config:     RunConfig,
    /// (name, shape) in name order
    pub parameters: Vec<(String, Vec<usize>)>,
    pub total:      usize,
}

pub struct InspectUseCase {
    checkpoint: PathBuf,
}

impl InspectUseCase {
    pub fn new(checkpoint: impl Into<PathBuf>) -> Self {
        Self { checkpoint: checkpoint.into() }
    }

    pub fn execute(&self) -> Result<CheckpointReport> {
        inspect(&self.checkpoint)
    }
}

pub fn inspect(path: &Path) -> Result<CheckpointReport> {
    let (config, weight) = load_checkpoint_file(path)?;
    let total = parameter_count(&weight);
    let parameters = weight
        .into_iter()
        .map(|(name, tensor)| (name, tensor.shape))
        .collect();

    tracing::debug!("Inspected '{}'", path.display());
    Ok(CheckpointReport { path: path.to_path_buf(), config, parameters, total })
}

impl fmt::Display for CheckpointReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Checkpoint: {}", self.path.display())?;
        writeln!(f)?;
        writeln!(f, "Run config:")?;
        for (key, value) in self.config.fields() {
            writeln!(f, "  {key:<20} {value}")?;
        }
        writeln!(f)?;
        writeln!(f, "Parameters:")?;
        for (name, shape) in &self.parameters {
            writeln!(f, "  {name:<32} {shape:?}")?;
        }
        write!(f, "Total: {} parameters in {} tensors", self.total, self.parameters.len())
    }
}
