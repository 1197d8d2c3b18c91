// ============================================================
// Layer 5 — Burn Optimizer Adapter
// ============================================================
// Plugs a burn optimizer into the ParameterUpdater cycle:
//
//   zero_grad  → drop any gradients left from the last batch
//   backward   → loss.backward(), mapped onto the model's params
//   step       → optim.step(lr, model, grads)
//
// The optimizer runs on AdamW's own defaults with DEFAULT_LR.
// The run's lr/b1/b2 are recorded in opt.csv and checkpoints
// but do not reach the update rule.
//
// AdamW update (per parameter θ, gradient g):
//   m = β1*m + (1-β1)*g
//   v = β2*v + (1-β2)*g²
//   θ = θ - lr * (m / (√v + ε) + λθ)
//
// Reference: Burn Book §5 (Training), Loshchilov & Hutter
//            (2019) Decoupled Weight Decay Regularization

use std::marker::PhantomData;

use anyhow::Result;
use burn::{
    module::AutodiffModule,
    optim::{adaptor::OptimizerAdaptor, AdamW, AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::domain::{error::TrainingError, traits::ParameterUpdater};

/// AdamW's conventional default step size
pub const DEFAULT_LR: f64 = 1e-3;

/// AdamW with default hyperparameters, stepping at DEFAULT_LR.
pub fn default_updater<B, M>() -> BurnUpdater<B, M, OptimizerAdaptor<AdamW, M, B>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    BurnUpdater::new(AdamWConfig::new().init::<B, M>(), DEFAULT_LR)
}

/// A burn optimizer plus the gradients of the current batch.
pub struct BurnUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    optim:   O,
    lr:      f64,
    grads:   Option<GradientsParams>,
    _marker: PhantomData<(B, M)>,
}

impl<B, M, O> BurnUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(optim: O, lr: f64) -> Self {
        Self { optim, lr, grads: None, _marker: PhantomData }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }
}

impl<B, M, O> ParameterUpdater<M> for BurnUpdater<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    type Loss = Tensor<B, 1>;

    fn zero_grad(&mut self) {
        self.grads = None;
    }

    fn backward(&mut self, loss: Tensor<B, 1>, model: &M) -> Result<()> {
        let grads  = loss.backward();
        self.grads = Some(GradientsParams::from_grads(grads, model));
        Ok(())
    }

    fn step(&mut self, model: &mut M) -> Result<()> {
        let grads = self.grads.take().ok_or(TrainingError::MissingGradients)?;
        *model = self.optim.step(self.lr, model.clone(), grads);
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::SegmentationModel;
    use crate::ml::loss::bce_with_logits;
    use crate::ml::unet::{UNet, UNetConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn tiny() -> UNet<TestBackend> {
        UNetConfig::new(1, 1).with_base_channels(2).init(&Default::default())
    }

    #[test]
    fn test_default_updater_steps_at_default_lr() {
        let updater = default_updater::<TestBackend, UNet<TestBackend>>();
        assert_eq!(updater.lr(), DEFAULT_LR);
    }

    #[test]
    fn test_step_without_backward_is_missing_gradients() {
        let mut model   = tiny();
        let mut updater = default_updater::<TestBackend, UNet<TestBackend>>();

        let err = updater.step(&mut model).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainingError>(),
            Some(TrainingError::MissingGradients)
        ));
    }

    #[test]
    fn test_one_cycle_changes_parameters() {
        let device      = Default::default();
        let mut model   = tiny();
        let before      = model.snapshot_parameters().unwrap();
        let mut updater = default_updater::<TestBackend, UNet<TestBackend>>();

        let input  = Tensor::ones([1, 1, 16, 16], &device);
        let target = Tensor::ones([1, 1, 16, 16], &device);
        let loss   = bce_with_logits(model.forward(input), target);

        updater.zero_grad();
        updater.backward(loss, &model).unwrap();
        updater.step(&mut model).unwrap();

        assert_ne!(model.snapshot_parameters().unwrap(), before);
    }

    #[test]
    fn test_zero_grad_discards_pending_gradients() {
        let device      = Default::default();
        let mut model   = tiny();
        let mut updater = default_updater::<TestBackend, UNet<TestBackend>>();

        let loss = bce_with_logits(
            model.forward(Tensor::ones([1, 1, 16, 16], &device)),
            Tensor::zeros([1, 1, 16, 16], &device),
        );
        updater.backward(loss, &model).unwrap();
        updater.zero_grad();

        assert!(updater.step(&mut model).is_err());
    }
}
