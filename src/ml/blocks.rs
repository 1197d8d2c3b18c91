// ============================================================
// Layer 5 — Shared Building Blocks
// ============================================================
// The pieces every UNet variant is assembled from:
//
//   ConvBlock      — (3×3 conv → ReLU) × 2, spatial size kept
//   AttentionGate  — additive attention over a skip connection
//   upsample2x     — nearest-neighbour ×2 upsampling
//
// Reference: Ronneberger et al. (2015) U-Net
//            Oktay et al. (2018) Attention U-Net

use anyhow::Result;
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

use crate::domain::checkpoint::ParamSnapshot;
use crate::ml::params::{join, NamedParameters};

/// 3×3 convolution that preserves height and width
pub fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

/// 1×1 convolution, a per-pixel linear projection
pub fn conv1x1<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [1, 1]).init(device)
}

/// [N, C, H, W] → [N, C, 2H, 2W], each pixel copied into a 2×2 cell
pub fn upsample2x<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    x.reshape([n, c, h, 1, w, 1])
        .repeat_dim(3, 2)
        .repeat_dim(5, 2)
        .reshape([n, c, h * 2, w * 2])
}

// ─── ConvBlock ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_ch: usize, out_ch: usize, device: &B::Device) -> Self {
        Self {
            conv1: conv3x3(in_ch, out_ch, device),
            conv2: conv3x3(out_ch, out_ch, device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }
}

impl<B: Backend> NamedParameters for ConvBlock<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        self.conv1.export_params(&join(prefix, "conv1"), out)?;
        self.conv2.export_params(&join(prefix, "conv2"), out)
    }

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        Ok(Self {
            conv1: self.conv1.import_params(&join(prefix, "conv1"), snapshot)?,
            conv2: self.conv2.import_params(&join(prefix, "conv2"), snapshot)?,
        })
    }
}

// ─── AttentionGate ────────────────────────────────────────────────────────────
/// Scales a skip connection `x` by a per-pixel weight in
/// (0, 1) computed from `x` and the gating signal `g`:
///
///   alpha = sigmoid(psi(relu(W_g·g + W_x·x)))
///   out   = x * alpha
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    pub w_g: Conv2d<B>,
    pub w_x: Conv2d<B>,
    pub psi: Conv2d<B>,
}

impl<B: Backend> AttentionGate<B> {
    pub fn new(gate_ch: usize, skip_ch: usize, inter_ch: usize, device: &B::Device) -> Self {
        Self {
            w_g: conv1x1(gate_ch, inter_ch, device),
            w_x: conv1x1(skip_ch, inter_ch, device),
            psi: conv1x1(inter_ch, 1, device),
        }
    }

    pub fn forward(&self, g: Tensor<B, 4>, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();
        let a     = relu(self.w_g.forward(g) + self.w_x.forward(x.clone()));
        let alpha = sigmoid(self.psi.forward(a));
        x * alpha.repeat_dim(1, channels)
    }
}

impl<B: Backend> NamedParameters for AttentionGate<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        self.w_g.export_params(&join(prefix, "w_g"), out)?;
        self.w_x.export_params(&join(prefix, "w_x"), out)?;
        self.psi.export_params(&join(prefix, "psi"), out)
    }

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        Ok(Self {
            w_g: self.w_g.import_params(&join(prefix, "w_g"), snapshot)?,
            w_x: self.w_x.import_params(&join(prefix, "w_x"), snapshot)?,
            psi: self.psi.import_params(&join(prefix, "psi"), snapshot)?,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    #[test]
    fn test_upsample_copies_each_pixel_into_2x2_cell() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );

        let up     = upsample2x(x);
        let values = up.clone().into_data().to_vec::<f32>().unwrap();

        assert_eq!(up.dims(), [1, 1, 4, 4]);
        assert_eq!(
            values,
            vec![
                1.0, 1.0, 2.0, 2.0,
                1.0, 1.0, 2.0, 2.0,
                3.0, 3.0, 4.0, 4.0,
                3.0, 3.0, 4.0, 4.0,
            ]
        );
    }

    #[test]
    fn test_conv_block_keeps_spatial_size() {
        let device = Default::default();
        let block  = ConvBlock::<TestBackend>::new(3, 5, &device);
        let out    = block.forward(Tensor::zeros([2, 3, 8, 8], &device));
        assert_eq!(out.dims(), [2, 5, 8, 8]);
    }

    #[test]
    fn test_attention_gate_keeps_skip_shape() {
        let device = Default::default();
        let gate   = AttentionGate::<TestBackend>::new(4, 6, 2, &device);
        let g      = Tensor::ones([1, 4, 8, 8], &device);
        let x      = Tensor::ones([1, 6, 8, 8], &device);
        assert_eq!(gate.forward(g, x).dims(), [1, 6, 8, 8]);
    }
}
