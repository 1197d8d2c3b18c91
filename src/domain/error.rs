// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed errors for the failures a caller may want to tell
// apart. Everything else travels as anyhow::Error with
// context attached at the point of failure.
//
//   ConfigError      — bad flags, raised before any training
//   CheckpointError  — resume target missing or unreadable
//   DatasetError     — image folders that cannot form a dataset
//   TrainingError    — a step that cannot be carried out
//
// Reference: Rust Book §9 (Error Handling), thiserror docs

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        field:  &'static str,
        reason: String,
    },

    #[error("unknown model '{0}' (expected one of: unet, unet_nested, attention_unet)")]
    UnknownModel(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint not found: '{}'", path.display())]
    NotFound { path: PathBuf },

    #[error("checkpoint '{}' is corrupt: {reason}", path.display())]
    Corrupt {
        path:   PathBuf,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory '{}' does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("no image pairs found under '{}'", path.display())]
    Empty { path: PathBuf },

    #[error("no ground truth found for input '{}'", input.display())]
    UnpairedInput { input: PathBuf },

    #[error("'{}' is {found:?} but the rest of the split is {expected:?}", path.display())]
    SizeMismatch {
        path:     PathBuf,
        expected: (u32, u32),
        found:    (u32, u32),
    },

    #[error("'{}' contains class index {index} but n_class is {n_class}", path.display())]
    ClassOutOfRange {
        path:    PathBuf,
        index:   u8,
        n_class: usize,
    },
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("model produced no outputs for deep supervision")]
    EmptyPrediction,

    #[error("model produced {0} outputs but deep supervision is disabled")]
    UnexpectedStages(usize),

    #[error("optimizer step requested before any gradients were computed")]
    MissingGradients,
}
