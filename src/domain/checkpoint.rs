// ============================================================
// Layer 3 — Checkpoint Domain Types
// ============================================================
// A checkpoint is exactly two things:
//
//   opt     — the RunConfig that was active when it was written
//   weight  — every learnable parameter, by dotted name
//
// Parameters are stored as plain f32 arrays plus a shape so
// the on-disk format does not depend on any tensor backend.
//
// Both envelope fields are Options on disk: a file missing
// one of them decodes fine but is rejected as corrupt.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::run_config::RunConfig;

/// One parameter tensor, flattened in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamTensor {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }

    /// Number of scalar elements implied by the shape
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Learnable-parameter snapshot: parameter name → tensor.
/// BTreeMap keeps names sorted so files are byte-stable.
pub type ParamSnapshot = BTreeMap<String, ParamTensor>;

/// Total scalar count across a snapshot
pub fn parameter_count(snapshot: &ParamSnapshot) -> usize {
    snapshot.values().map(ParamTensor::numel).sum()
}

/// The serialised unit written to `<epoch+1>.pth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    pub opt:    Option<RunConfig>,
    pub weight: Option<ParamSnapshot>,
}

impl CheckpointEnvelope {
    pub fn new(opt: RunConfig, weight: ParamSnapshot) -> Self {
        Self { opt: Some(opt), weight: Some(weight) }
    }
}
