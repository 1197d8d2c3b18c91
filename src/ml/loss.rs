// ============================================================
// Layer 5 — Loss Functions
// ============================================================
// Picks the criterion for a run, first match wins:
//
//   1. model_name == "unet_nested"  → BceDice
//   2. n_class > 1                  → CrossEntropy
//   3. otherwise                    → BceWithLogits
//
// All three take raw logits [N, C, H, W] and a ground truth
// map [N, 1, H, W] (0/1 for binary, class index otherwise)
// and return a mean over the batch as a [1] tensor.
//
//   BceWithLogits  max(x,0) − x·y + log(1 + e^−|x|)
//   CrossEntropy   −log_softmax(x)[y] over the class axis
//   BceDice        0.5·BCE + (1 − mean soft Dice)
//
// Reference: Milletari et al. (2016) V-Net (soft Dice)

use burn::{
    prelude::*,
    tensor::{
        activation::{log_softmax, sigmoid},
        ElementConversion,
    },
};

use crate::domain::traits::{Criterion, LossValue};

/// Dice smoothing term
pub const SMOOTH: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    BceDice,
    CrossEntropy,
    BceWithLogits,
}

/// Total over every (model_name, n_class, deep_supervision).
///
/// `deep_supervision` does not change the choice; it only
/// decides how the trainer combines per-output losses.
pub fn select_loss(model_name: &str, n_class: usize, _deep_supervision: bool) -> LossKind {
    if model_name == "unet_nested" {
        LossKind::BceDice
    } else if n_class > 1 {
        LossKind::CrossEntropy
    } else {
        LossKind::BceWithLogits
    }
}

/// Numerically stable binary cross-entropy on logits, averaged
/// over every element.
pub fn bce_with_logits<B: Backend>(logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let positive = logits.clone().clamp_min(0.0);
    let soft     = logits.clone().abs().neg().exp().log1p();
    (positive - logits * target + soft).mean()
}

/// Multi-class cross-entropy; `target` holds class indices.
pub fn cross_entropy<B: Backend>(logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let log_probs = log_softmax(logits, 1);
    log_probs.gather(1, target.int()).mean().neg()
}

/// 0.5·BCE + soft Dice loss, Dice averaged over the batch.
///
/// A multi-channel output is compared against the one-hot
/// encoding of `target`.
pub fn bce_dice<B: Backend>(logits: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let [n, c, h, w] = logits.dims();
    let target = if c > 1 { one_hot(target, c) } else { target };

    let bce   = bce_with_logits(logits.clone(), target.clone());
    let probs = sigmoid(logits).reshape([n, c * h * w]);
    let truth = target.reshape([n, c * h * w]);

    let intersection = (probs.clone() * truth.clone()).sum_dim(1);
    let dice = (intersection.mul_scalar(2.0).add_scalar(SMOOTH))
        / (probs.sum_dim(1) + truth.sum_dim(1)).add_scalar(SMOOTH);

    bce.mul_scalar(0.5) + dice.mean().neg().add_scalar(1.0)
}

/// [N, 1, H, W] class indices → [N, C, H, W] of 0/1
fn one_hot<B: Backend>(target: Tensor<B, 4>, n_class: usize) -> Tensor<B, 4> {
    let planes = (0..n_class)
        .map(|k| target.clone().equal_elem(k as f32).float())
        .collect();
    Tensor::cat(planes, 1)
}

impl<B: Backend> Criterion<Tensor<B, 4>, Tensor<B, 4>> for LossKind {
    type Loss = Tensor<B, 1>;

    fn compute(&self, output: Tensor<B, 4>, target: &Tensor<B, 4>) -> Tensor<B, 1> {
        match self {
            LossKind::BceDice       => bce_dice(output, target.clone()),
            LossKind::CrossEntropy  => cross_entropy(output, target.clone()),
            LossKind::BceWithLogits => bce_with_logits(output, target.clone()),
        }
    }
}

impl<B: Backend> LossValue for Tensor<B, 1> {
    fn scalar(&self) -> f64 {
        self.clone().into_scalar().elem::<f64>()
    }

    fn plus(self, other: Self) -> Self {
        self + other
    }

    fn scaled(self, factor: f64) -> Self {
        self.mul_scalar(factor)
    }
}
