// ============================================================
// Layer 5 — Model Factory
// ============================================================
// Maps `--model_name` to a network and builds it from the run
// config. The name is parsed once into ModelKind; everything
// downstream dispatches on the enum.

use std::fmt;

use anyhow::Result;
use burn::prelude::*;

use crate::domain::{
    checkpoint::ParamSnapshot,
    error::ConfigError,
    run_config::RunConfig,
    traits::SegmentationModel,
};
use crate::ml::{
    attention_unet::{AttentionUNet, AttentionUNetConfig},
    nested_unet::{NestedUNet, NestedUNetConfig},
    params::{restore_from, NamedParameters},
    unet::{UNet, UNetConfig},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    UNet,
    NestedUNet,
    AttentionUNet,
}

impl ModelKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "unet"           => Ok(ModelKind::UNet),
            "unet_nested"    => Ok(ModelKind::NestedUNet),
            "attention_unet" => Ok(ModelKind::AttentionUNet),
            other            => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::UNet          => "unet",
            ModelKind::NestedUNet    => "unet_nested",
            ModelKind::AttentionUNet => "attention_unet",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A network that can be built from a RunConfig.
pub trait NetworkFactory<B: Backend>: Sized {
    fn build(cfg: &RunConfig, device: &B::Device) -> Self;
}

impl<B: Backend> NetworkFactory<B> for UNet<B> {
    fn build(cfg: &RunConfig, device: &B::Device) -> Self {
        UNetConfig::new(cfg.in_channels, cfg.n_class)
            .with_base_channels(cfg.base_channels)
            .init(device)
    }
}

impl<B: Backend> NetworkFactory<B> for NestedUNet<B> {
    fn build(cfg: &RunConfig, device: &B::Device) -> Self {
        NestedUNetConfig::new(cfg.in_channels, cfg.n_class)
            .with_base_channels(cfg.base_channels)
            .with_deep_supervision(cfg.deep_supervision)
            .init(device)
    }
}

impl<B: Backend> NetworkFactory<B> for AttentionUNet<B> {
    fn build(cfg: &RunConfig, device: &B::Device) -> Self {
        AttentionUNetConfig::new(cfg.in_channels, cfg.n_class)
            .with_base_channels(cfg.base_channels)
            .init(device)
    }
}

/// Everything the training use case needs from a network.
pub trait SegmentationNetwork<B: Backend>:
    NetworkFactory<B>
    + Module<B>
    + NamedParameters
    + SegmentationModel<Input = Tensor<B, 4>, Output = Tensor<B, 4>>
{
    /// Replace this network's parameters with a snapshot.
    fn with_snapshot(self, snapshot: &ParamSnapshot) -> Result<Self> {
        restore_from::<B, _>(self, snapshot)
    }
}

impl<B: Backend, N> SegmentationNetwork<B> for N where
    N: NetworkFactory<B>
        + Module<B>
        + NamedParameters
        + SegmentationModel<Input = Tensor<B, 4>, Output = Tensor<B, 4>>
{
}
