// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates one training run in order:
//
//   Step 1: Validate flags, pick backend  (Layer 3 - domain)
//   Step 2: Build the network             (Layer 5 - ml)
//   Step 3: Resume from <epoch>.pth       (Layer 6 - infra)
//   Step 4: Dump effective config         (Layer 6 - infra)
//   Step 5: Loss + default AdamW          (Layer 5 - ml)
//   Step 6: Load dataset, build loader    (Layer 4 - data)
//   Step 7: Open loss log + scalar stream (Layer 6 - infra)
//   Step 8: Run training loop             (Layer 5 - ml)
//
// A non-zero --epoch resumes: weights from <epoch>.pth go into
// a network built from the *requested* flags, and the saved
// config replaces the requested one except for `epoch`.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    module::AutodiffModule,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::build_loader,
    dataset::load_dataset,
};
use crate::domain::run_config::{merge_resume, DeviceKind, RequestedConfig, RunConfig, SavedConfig};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{JsonlScalarWriter, MetricsLogger},
};
use crate::ml::{
    attention_unet::AttentionUNet,
    factory::{ModelKind, SegmentationNetwork},
    loss::select_loss,
    nested_unet::NestedUNet,
    session::{default_updater, DEFAULT_LR},
    trainer::run_training,
    unet::UNet,
};

type CpuBackend  = Autodiff<NdArray>;
type WgpuBackend = Autodiff<Wgpu>;

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Run training end to end; returns the effective config.
    pub fn execute(&self) -> Result<RunConfig> {
        let cfg = &self.config;
        cfg.validate()?;

        tracing::info!("Using {} backend", cfg.device);
        match cfg.device {
            DeviceKind::Cpu  => train_on::<CpuBackend>(cfg, NdArrayDevice::default()),
            DeviceKind::Wgpu => train_on::<WgpuBackend>(cfg, WgpuDevice::default()),
        }
    }
}

/// Dispatch on the model name for one backend.
pub fn train_on<B: AutodiffBackend>(requested: &RunConfig, device: B::Device) -> Result<RunConfig> {
    match ModelKind::from_name(&requested.model_name)? {
        ModelKind::UNet          => train_network::<B, UNet<B>>(requested, &device),
        ModelKind::NestedUNet    => train_network::<B, NestedUNet<B>>(requested, &device),
        ModelKind::AttentionUNet => train_network::<B, AttentionUNet<B>>(requested, &device),
    }
}

fn train_network<B, N>(requested: &RunConfig, device: &B::Device) -> Result<RunConfig>
where
    B: AutodiffBackend,
    N: SegmentationNetwork<B> + AutodiffModule<B>,
{
    // ── Step 2: Build the requested network ───────────────────────────────────
    let requested_ckpt = CheckpointManager::new(&requested.checkpoint_dir);

    let mut model = N::build(requested, device);
    tracing::info!(
        "Model ready: {} (in_channels={}, n_class={}, base_channels={})",
        requested.model_name, requested.in_channels, requested.n_class, requested.base_channels
    );

    // ── Step 3: Resume ────────────────────────────────────────────────────────
    let cfg = if requested.is_resume() {
        let path = requested_ckpt.path_for(requested.epoch);
        let (saved, weight) = requested_ckpt
            .load(requested.epoch)
            .with_context(|| format!("Cannot resume from '{}'", path.display()))?;

        model = model
            .with_snapshot(&weight)
            .with_context(|| format!("Checkpoint '{}' does not fit the requested model", path.display()))?;

        tracing::info!("Resumed weights from '{}'", path.display());
        merge_resume(SavedConfig(saved), &RequestedConfig(requested.clone()))
    } else {
        requested.clone()
    };

    // ── Step 4: Effective checkpoint dir + config dump ────────────────────────
    let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir);
    checkpoints.ensure_dir()?;
    checkpoints.save_run_config(&cfg)?;

    // ── Step 5: Loss + optimiser ──────────────────────────────────────────────
    let criterion   = select_loss(&cfg.model_name, cfg.n_class, cfg.deep_supervision);
    let mut updater = default_updater::<B, N>();
    tracing::info!("Loss: {:?}, AdamW defaults with lr={}", criterion, DEFAULT_LR);

    // ── Step 6: Data ──────────────────────────────────────────────────────────
    let dataset = load_dataset(&cfg)?;
    let source  = build_loader::<B>(&cfg, dataset);

    // ── Step 7: Metrics ───────────────────────────────────────────────────────
    let stream      = JsonlScalarWriter::create(&cfg.runs_dir)?;
    let mut metrics = MetricsLogger::new(checkpoints.dir(), Box::new(stream));

    // ── Step 8: Train ─────────────────────────────────────────────────────────
    run_training(&cfg, model, &criterion, &mut updater, &source, &mut metrics, &checkpoints)?;

    Ok(cfg)
}
