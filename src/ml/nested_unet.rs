// ============================================================
// Layer 5 — UNet++ (Nested UNet)
// ============================================================
// Replaces the plain skip connections of UNet with dense
// nested pathways. Node X(i,j) sits at depth i and column j:
//
//   X0,0 ─ X0,1 ─ X0,2 ─ X0,3 ─ X0,4
//     │   ↗  │   ↗  │   ↗  │   ↗
//   X1,0 ─ X1,1 ─ X1,2 ─ X1,3
//     │   ↗  │   ↗  │   ↗
//   X2,0 ─ X2,1 ─ X2,2
//     │   ↗  │   ↗
//   X3,0 ─ X3,1
//     │   ↗
//   X4,0
//
// X(i,j) = ConvBlock(cat[X(i,0) .. X(i,j-1), up(X(i+1,j-1))])
//
// With deep supervision every top-row node X0,1 .. X0,4 gets
// its own 1×1 head and the model returns all four maps,
// shallow to deep. Otherwise only X0,4 is decoded.
//
// Reference: Zhou et al. (2018) UNet++: A Nested U-Net
//            Architecture for Medical Image Segmentation

use anyhow::{bail, Result};
use burn::{
    nn::{conv::Conv2d, pool::MaxPool2d},
    prelude::*,
};

use crate::domain::checkpoint::ParamSnapshot;
use crate::domain::traits::{Prediction, SegmentationModel};
use crate::ml::blocks::{conv1x1, upsample2x, ConvBlock};
use crate::ml::params::{join, snapshot_of, NamedParameters};
use crate::ml::unet::pool2x;

/// Number of supervised heads when deep supervision is on
pub const DEEP_HEADS: usize = 4;

#[derive(Config, Debug)]
pub struct NestedUNetConfig {
    pub in_channels:      usize,
    pub n_class:          usize,
    #[config(default = 32)]
    pub base_channels:    usize,
    #[config(default = false)]
    pub deep_supervision: bool,
}

impl NestedUNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NestedUNet<B> {
        let f = [
            self.base_channels,
            self.base_channels * 2,
            self.base_channels * 4,
            self.base_channels * 8,
            self.base_channels * 16,
        ];
        let heads = if self.deep_supervision { DEEP_HEADS } else { 1 };

        NestedUNet {
            conv0_0: ConvBlock::new(self.in_channels, f[0], device),
            conv1_0: ConvBlock::new(f[0], f[1], device),
            conv2_0: ConvBlock::new(f[1], f[2], device),
            conv3_0: ConvBlock::new(f[2], f[3], device),
            conv4_0: ConvBlock::new(f[3], f[4], device),

            conv0_1: ConvBlock::new(f[0] + f[1], f[0], device),
            conv1_1: ConvBlock::new(f[1] + f[2], f[1], device),
            conv2_1: ConvBlock::new(f[2] + f[3], f[2], device),
            conv3_1: ConvBlock::new(f[3] + f[4], f[3], device),

            conv0_2: ConvBlock::new(f[0] * 2 + f[1], f[0], device),
            conv1_2: ConvBlock::new(f[1] * 2 + f[2], f[1], device),
            conv2_2: ConvBlock::new(f[2] * 2 + f[3], f[2], device),

            conv0_3: ConvBlock::new(f[0] * 3 + f[1], f[0], device),
            conv1_3: ConvBlock::new(f[1] * 3 + f[2], f[1], device),

            conv0_4: ConvBlock::new(f[0] * 4 + f[1], f[0], device),

            finals: (0..heads).map(|_| conv1x1(f[0], self.n_class, device)).collect(),
            pool:   pool2x::<B>(),
            deep_supervision: self.deep_supervision,
        }
    }
}

#[derive(Module, Debug)]
pub struct NestedUNet<B: Backend> {
    pub conv0_0: ConvBlock<B>,
    pub conv1_0: ConvBlock<B>,
    pub conv2_0: ConvBlock<B>,
    pub conv3_0: ConvBlock<B>,
    pub conv4_0: ConvBlock<B>,
    pub conv0_1: ConvBlock<B>,
    pub conv1_1: ConvBlock<B>,
    pub conv2_1: ConvBlock<B>,
    pub conv3_1: ConvBlock<B>,
    pub conv0_2: ConvBlock<B>,
    pub conv1_2: ConvBlock<B>,
    pub conv2_2: ConvBlock<B>,
    pub conv0_3: ConvBlock<B>,
    pub conv1_3: ConvBlock<B>,
    pub conv0_4: ConvBlock<B>,
    /// One head per supervised output (4) or just the last (1)
    pub finals:  Vec<Conv2d<B>>,
    pub pool:    MaxPool2d,
    pub deep_supervision: bool,
}

impl<B: Backend> NestedUNet<B> {
    /// Top-row nodes X0,1 .. X0,4 for an input [N, C, H, W]
    fn top_row(&self, x: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        let x0_0 = self.conv0_0.forward(x);
        let x1_0 = self.conv1_0.forward(self.pool.forward(x0_0.clone()));
        let x0_1 = self.conv0_1.forward(Tensor::cat(
            vec![x0_0.clone(), upsample2x(x1_0.clone())], 1,
        ));

        let x2_0 = self.conv2_0.forward(self.pool.forward(x1_0.clone()));
        let x1_1 = self.conv1_1.forward(Tensor::cat(
            vec![x1_0.clone(), upsample2x(x2_0.clone())], 1,
        ));
        let x0_2 = self.conv0_2.forward(Tensor::cat(
            vec![x0_0.clone(), x0_1.clone(), upsample2x(x1_1.clone())], 1,
        ));

        let x3_0 = self.conv3_0.forward(self.pool.forward(x2_0.clone()));
        let x2_1 = self.conv2_1.forward(Tensor::cat(
            vec![x2_0.clone(), upsample2x(x3_0.clone())], 1,
        ));
        let x1_2 = self.conv1_2.forward(Tensor::cat(
            vec![x1_0.clone(), x1_1.clone(), upsample2x(x2_1.clone())], 1,
        ));
        let x0_3 = self.conv0_3.forward(Tensor::cat(
            vec![x0_0.clone(), x0_1.clone(), x0_2.clone(), upsample2x(x1_2.clone())], 1,
        ));

        let x4_0 = self.conv4_0.forward(self.pool.forward(x3_0.clone()));
        let x3_1 = self.conv3_1.forward(Tensor::cat(vec![x3_0, upsample2x(x4_0)], 1));
        let x2_2 = self.conv2_2.forward(Tensor::cat(vec![x2_0, x2_1, upsample2x(x3_1)], 1));
        let x1_3 = self.conv1_3.forward(Tensor::cat(
            vec![x1_0, x1_1, x1_2, upsample2x(x2_2)], 1,
        ));
        let x0_4 = self.conv0_4.forward(Tensor::cat(
            vec![x0_0, x0_1.clone(), x0_2.clone(), x0_3.clone(), upsample2x(x1_3)], 1,
        ));

        [x0_1, x0_2, x0_3, x0_4]
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Prediction<Tensor<B, 4>> {
        let nodes = self.top_row(x);

        if self.deep_supervision {
            let maps = nodes
                .into_iter()
                .zip(self.finals.iter())
                .map(|(node, head)| head.forward(node))
                .collect();
            Prediction::Stages(maps)
        } else {
            let [_, _, _, x0_4] = nodes;
            Prediction::Single(self.finals[0].forward(x0_4))
        }
    }
}

impl<B: Backend> SegmentationModel for NestedUNet<B> {
    type Input  = Tensor<B, 4>;
    type Output = Tensor<B, 4>;

    fn forward(&self, input: Tensor<B, 4>) -> Prediction<Tensor<B, 4>> {
        NestedUNet::forward(self, input)
    }

    fn snapshot_parameters(&self) -> Result<ParamSnapshot> {
        snapshot_of::<B, _>(self)
    }
}

impl<B: Backend> NamedParameters for NestedUNet<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        for (name, block) in self.blocks() {
            block.export_params(&join(prefix, name), out)?;
        }
        self.finals.export_params(&join(prefix, "finals"), out)
    }

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        if self.finals.is_empty() {
            bail!("UNet++ has no output head");
        }
        let load = |block: ConvBlock<B>, name: &str| block.import_params(&join(prefix, name), snapshot);

        Ok(Self {
            conv0_0: load(self.conv0_0, "conv0_0")?,
            conv1_0: load(self.conv1_0, "conv1_0")?,
            conv2_0: load(self.conv2_0, "conv2_0")?,
            conv3_0: load(self.conv3_0, "conv3_0")?,
            conv4_0: load(self.conv4_0, "conv4_0")?,
            conv0_1: load(self.conv0_1, "conv0_1")?,
            conv1_1: load(self.conv1_1, "conv1_1")?,
            conv2_1: load(self.conv2_1, "conv2_1")?,
            conv3_1: load(self.conv3_1, "conv3_1")?,
            conv0_2: load(self.conv0_2, "conv0_2")?,
            conv1_2: load(self.conv1_2, "conv1_2")?,
            conv2_2: load(self.conv2_2, "conv2_2")?,
            conv0_3: load(self.conv0_3, "conv0_3")?,
            conv1_3: load(self.conv1_3, "conv1_3")?,
            conv0_4: load(self.conv0_4, "conv0_4")?,
            finals:  self.finals.import_params(&join(prefix, "finals"), snapshot)?,
            pool:    self.pool,
            deep_supervision: self.deep_supervision,
        })
    }
}

impl<B: Backend> NestedUNet<B> {
    fn blocks(&self) -> [(&'static str, &ConvBlock<B>); 15] {
        [
            ("conv0_0", &self.conv0_0),
            ("conv1_0", &self.conv1_0),
            ("conv2_0", &self.conv2_0),
            ("conv3_0", &self.conv3_0),
            ("conv4_0", &self.conv4_0),
            ("conv0_1", &self.conv0_1),
            ("conv1_1", &self.conv1_1),
            ("conv2_1", &self.conv2_1),
            ("conv3_1", &self.conv3_1),
            ("conv0_2", &self.conv0_2),
            ("conv1_2", &self.conv1_2),
            ("conv2_2", &self.conv2_2),
            ("conv0_3", &self.conv0_3),
            ("conv1_3", &self.conv1_3),
            ("conv0_4", &self.conv0_4),
        ]
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny(deep_supervision: bool) -> NestedUNet<TestBackend> {
        NestedUNetConfig::new(1, 1)
            .with_base_channels(2)
            .with_deep_supervision(deep_supervision)
            .init(&Default::default())
    }

    #[test]
    fn test_single_head_without_deep_supervision() {
        let model = tiny(false);
        match model.forward(Tensor::zeros([2, 1, 16, 16], &Default::default())) {
            Prediction::Single(map) => assert_eq!(map.dims(), [2, 1, 16, 16]),
            Prediction::Stages(s)   => panic!("expected one map, got {}", s.len()),
        }
    }

    #[test]
    fn test_four_full_resolution_heads_with_deep_supervision() {
        let model = tiny(true);
        let maps  = model
            .forward(Tensor::zeros([1, 1, 32, 32], &Default::default()))
            .into_outputs();

        assert_eq!(maps.len(), DEEP_HEADS);
        for map in maps {
            assert_eq!(map.dims(), [1, 1, 32, 32]);
        }
    }

    #[test]
    fn test_snapshot_includes_every_head() {
        let snapshot = tiny(true).snapshot_parameters().unwrap();
        assert!(snapshot.contains_key("finals.3.weight"));
        assert_eq!(snapshot["conv0_4.conv1.weight"].shape, vec![2, 2 * 4 + 4, 3, 3]);
    }

    #[test]
    fn test_import_restores_snapshot() {
        let snapshot = tiny(false).snapshot_parameters().unwrap();
        let restored = tiny(false).import_params("", &snapshot).unwrap();
        assert_eq!(restored.snapshot_parameters().unwrap(), snapshot);
    }
}
