// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop is written against these traits instead
// of burn types directly:
//
//   SegmentationModel  — forward pass + parameter snapshot
//   Criterion          — turns one output into a loss value
//   LossValue          — a differentiable scalar we can read
//   ParameterUpdater   — zero_grad → backward → step
//   BatchSource        — yields (input, ground truth) batches
//   ScalarSink         — live metrics stream
//
// The burn implementations live in Layer 5 (ml) and Layer 4
// (data). Unit tests drive the loop with plain f64 stubs.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::checkpoint::ParamSnapshot;

// ─── Prediction ───────────────────────────────────────────────────────────────
/// What a forward pass returns.
#[derive(Debug, Clone)]
pub enum Prediction<T> {
    /// One segmentation map
    Single(T),
    /// One map per supervised decoder depth, shallow to deep
    Stages(Vec<T>),
}

impl<T> Prediction<T> {
    /// Number of outputs carried by this prediction
    pub fn len(&self) -> usize {
        match self {
            Prediction::Single(_)      => 1,
            Prediction::Stages(stages) => stages.len(),
        }
    }

    pub fn into_outputs(self) -> Vec<T> {
        match self {
            Prediction::Single(output) => vec![output],
            Prediction::Stages(stages) => stages,
        }
    }
}

// ─── Batch ────────────────────────────────────────────────────────────────────
/// One (input, ground truth) pair, consumed by a single step.
#[derive(Debug, Clone)]
pub struct Batch<I, T> {
    pub input:  I,
    pub target: T,
}

// ─── LossValue ────────────────────────────────────────────────────────────────
/// A loss that can be combined, scaled and read back as f64.
///
/// Reading the scalar is the one point where the loop waits
/// on the device.
pub trait LossValue: Sized {
    fn scalar(&self) -> f64;

    fn plus(self, other: Self) -> Self;

    fn scaled(self, factor: f64) -> Self;
}

impl LossValue for f64 {
    fn scalar(&self) -> f64 {
        *self
    }

    fn plus(self, other: Self) -> Self {
        self + other
    }

    fn scaled(self, factor: f64) -> Self {
        self * factor
    }
}

// ─── SegmentationModel ────────────────────────────────────────────────────────
/// A trainable network.
///
/// `snapshot_parameters` is the single capability the
/// checkpoint manager relies on. Wrappers (e.g. replicated
/// models) forward it to the model they wrap.
pub trait SegmentationModel {
    type Input;
    type Output;

    fn forward(&self, input: Self::Input) -> Prediction<Self::Output>;

    fn snapshot_parameters(&self) -> Result<ParamSnapshot>;
}

// ─── Criterion ────────────────────────────────────────────────────────────────
/// A loss function over one model output and its ground truth.
pub trait Criterion<O, T> {
    type Loss: LossValue;

    fn compute(&self, output: O, target: &T) -> Self::Loss;
}

// ─── ParameterUpdater ─────────────────────────────────────────────────────────
/// The gradient-reset / backprop / update cycle of one batch.
///
/// The loop calls these exactly once per batch, in the order
/// they are declared here.
pub trait ParameterUpdater<M> {
    type Loss;

    fn zero_grad(&mut self);

    fn backward(&mut self, loss: Self::Loss, model: &M) -> Result<()>;

    fn step(&mut self, model: &mut M) -> Result<()>;
}

// ─── BatchSource ──────────────────────────────────────────────────────────────
/// A producer of batches for one epoch at a time.
///
/// May prefetch on worker threads internally; the loop only
/// ever pulls the next batch.
pub trait BatchSource {
    type Input;
    type Target;

    fn num_batches(&self) -> usize;

    fn batches(&self) -> Box<dyn Iterator<Item = Batch<Self::Input, Self::Target>> + '_>;
}

// ─── ScalarSink ───────────────────────────────────────────────────────────────
/// A live scalar time series consumed by an external dashboard.
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}
