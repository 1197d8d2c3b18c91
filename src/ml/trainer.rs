// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Epoch/batch loop over the Layer 3 traits, so it runs the
// same against burn modules and against plain f64 stubs.
//
// For every epoch e in [cfg.epoch, cfg.n_epochs):
//
//   for each batch, in producer order:
//     prediction = model(input)
//     loss       = criterion(output)        single output
//                = mean(criterion(output_k)) deep supervision
//     epoch_loss += loss.scalar()
//     zero_grad → backward → step           exactly once each
//
//   metrics.record(e, epoch_loss)
//   if e % checkpoint_interval == 0 → save <e+1>.pth
//
// Any failure ends the run; nothing is retried or skipped.
//
// Reference: Burn Book §5 (Training), Kingma & Loshchilov
//            (2019) Decoupled Weight Decay Regularization

use anyhow::{Context, Result};

use crate::domain::{
    error::TrainingError,
    run_config::RunConfig,
    traits::{BatchSource, Criterion, LossValue, ParameterUpdater, Prediction, SegmentationModel},
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};

/// Combine a prediction into the loss of one batch.
///
/// With deep supervision every output is scored against the
/// same ground truth and the losses are averaged. Without it
/// the prediction must hold exactly one output.
pub fn batch_loss<O, T, C>(
    prediction:       Prediction<O>,
    target:           &T,
    criterion:        &C,
    deep_supervision: bool,
) -> Result<C::Loss, TrainingError>
where
    C: Criterion<O, T>,
{
    if deep_supervision {
        let outputs = prediction.into_outputs();
        let count   = outputs.len();

        let total = outputs
            .into_iter()
            .map(|output| criterion.compute(output, target))
            .reduce(|total, loss| total.plus(loss))
            .ok_or(TrainingError::EmptyPrediction)?;

        return Ok(total.scaled(1.0 / count as f64));
    }

    match prediction {
        Prediction::Single(output) => Ok(criterion.compute(output, target)),
        Prediction::Stages(mut stages) if stages.len() == 1 => {
            let output = stages.pop().ok_or(TrainingError::EmptyPrediction)?;
            Ok(criterion.compute(output, target))
        }
        Prediction::Stages(stages) => Err(TrainingError::UnexpectedStages(stages.len())),
    }
}

/// Train `model` over the configured epoch range and return it.
pub fn run_training<M, C, U, S>(
    cfg:         &RunConfig,
    mut model:   M,
    criterion:   &C,
    updater:     &mut U,
    source:      &S,
    metrics:     &mut MetricsLogger,
    checkpoints: &CheckpointManager,
) -> Result<M>
where
    M: SegmentationModel,
    S: BatchSource<Input = M::Input>,
    C: Criterion<M::Output, S::Target>,
    U: ParameterUpdater<M, Loss = C::Loss>,
{
    if !cfg.has_epochs_to_run() {
        tracing::warn!(
            "Nothing to train: start epoch {} is not below n_epochs {}",
            cfg.epoch, cfg.n_epochs
        );
        return Ok(model);
    }

    let num_batches = source.num_batches();
    tracing::info!(
        "Training epochs {}..{} with {} batches per epoch",
        cfg.epoch, cfg.n_epochs, num_batches
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in cfg.epoch..cfg.n_epochs {
        let mut epoch_loss = 0.0f64;

        for (i, batch) in source.batches().enumerate() {
            let prediction = model.forward(batch.input);
            let loss       = batch_loss(prediction, &batch.target, criterion, cfg.deep_supervision)?;
            let loss_value = loss.scalar();
            epoch_loss += loss_value;

            updater.zero_grad();
            updater.backward(loss, &model)?;
            updater.step(&mut model)?;

            println!(
                "ep: [{}/{}] batch: [{}/{}] loss: {:.6}",
                epoch + 1, cfg.n_epochs, i + 1, num_batches, loss_value,
            );
        }

        metrics
            .record(epoch, epoch_loss)
            .with_context(|| format!("Cannot log loss of epoch {epoch}"))?;

        if cfg.is_checkpoint_epoch(epoch) {
            let path = checkpoints.save(epoch, cfg, &model)?;
            tracing::info!("Checkpoint saved to '{}'", path.display());
        }
    }

    tracing::info!("Training complete!");
    Ok(model)
}
