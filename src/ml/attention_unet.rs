// ============================================================
// Layer 5 — Attention UNet
// ============================================================
// UNet with an additive attention gate on every skip
// connection. Before a skip is concatenated into the decoder
// it is reweighted by a gate driven by the upsampled decoder
// signal one level below:
//
//   g    = up_k(decoder below)
//   skip = gate_k(g, encoder skip)
//   d    = dec_k(cat[skip, g])
//
// Gate widths (c = base_channels):
//   att1: g 8c, skip 8c → 4c
//   att2: g 4c, skip 4c → 2c
//   att3: g 2c, skip 2c → c
//   att4: g c,  skip c  → c/2
//
// Reference: Oktay et al. (2018) Attention U-Net: Learning
//            Where to Look for the Pancreas

use anyhow::Result;
use burn::{
    nn::{
        conv::{Conv2d, ConvTranspose2d},
        pool::MaxPool2d,
    },
    prelude::*,
};

use crate::domain::checkpoint::ParamSnapshot;
use crate::domain::traits::{Prediction, SegmentationModel};
use crate::ml::blocks::{conv1x1, AttentionGate, ConvBlock};
use crate::ml::params::{join, snapshot_of, NamedParameters};
use crate::ml::unet::{pool2x, up_conv};

#[derive(Config, Debug)]
pub struct AttentionUNetConfig {
    pub in_channels:   usize,
    pub n_class:       usize,
    #[config(default = 32)]
    pub base_channels: usize,
}

impl AttentionUNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentionUNet<B> {
        let c = self.base_channels;
        AttentionUNet {
            inc:   ConvBlock::new(self.in_channels, c, device),
            down1: ConvBlock::new(c, c * 2, device),
            down2: ConvBlock::new(c * 2, c * 4, device),
            down3: ConvBlock::new(c * 4, c * 8, device),
            down4: ConvBlock::new(c * 8, c * 16, device),
            up1:   up_conv(c * 16, c * 8, device),
            att1:  AttentionGate::new(c * 8, c * 8, c * 4, device),
            dec1:  ConvBlock::new(c * 16, c * 8, device),
            up2:   up_conv(c * 8, c * 4, device),
            att2:  AttentionGate::new(c * 4, c * 4, c * 2, device),
            dec2:  ConvBlock::new(c * 8, c * 4, device),
            up3:   up_conv(c * 4, c * 2, device),
            att3:  AttentionGate::new(c * 2, c * 2, c, device),
            dec3:  ConvBlock::new(c * 4, c * 2, device),
            up4:   up_conv(c * 2, c, device),
            att4:  AttentionGate::new(c, c, (c / 2).max(1), device),
            dec4:  ConvBlock::new(c * 2, c, device),
            outc:  conv1x1(c, self.n_class, device),
            pool:  pool2x::<B>(),
        }
    }
}

#[derive(Module, Debug)]
pub struct AttentionUNet<B: Backend> {
    pub inc:   ConvBlock<B>,
    pub down1: ConvBlock<B>,
    pub down2: ConvBlock<B>,
    pub down3: ConvBlock<B>,
    pub down4: ConvBlock<B>,
    pub up1:   ConvTranspose2d<B>,
    pub att1:  AttentionGate<B>,
    pub dec1:  ConvBlock<B>,
    pub up2:   ConvTranspose2d<B>,
    pub att2:  AttentionGate<B>,
    pub dec2:  ConvBlock<B>,
    pub up3:   ConvTranspose2d<B>,
    pub att3:  AttentionGate<B>,
    pub dec3:  ConvBlock<B>,
    pub up4:   ConvTranspose2d<B>,
    pub att4:  AttentionGate<B>,
    pub dec4:  ConvBlock<B>,
    pub outc:  Conv2d<B>,
    pub pool:  MaxPool2d,
}

impl<B: Backend> AttentionUNet<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.inc.forward(x);
        let x2 = self.down1.forward(self.pool.forward(x1.clone()));
        let x3 = self.down2.forward(self.pool.forward(x2.clone()));
        let x4 = self.down3.forward(self.pool.forward(x3.clone()));
        let x5 = self.down4.forward(self.pool.forward(x4.clone()));

        let g = self.up1.forward(x5);
        let d = self.dec1.forward(Tensor::cat(vec![self.att1.forward(g.clone(), x4), g], 1));

        let g = self.up2.forward(d);
        let d = self.dec2.forward(Tensor::cat(vec![self.att2.forward(g.clone(), x3), g], 1));

        let g = self.up3.forward(d);
        let d = self.dec3.forward(Tensor::cat(vec![self.att3.forward(g.clone(), x2), g], 1));

        let g = self.up4.forward(d);
        let d = self.dec4.forward(Tensor::cat(vec![self.att4.forward(g.clone(), x1), g], 1));

        self.outc.forward(d)
    }
}

impl<B: Backend> SegmentationModel for AttentionUNet<B> {
    type Input  = Tensor<B, 4>;
    type Output = Tensor<B, 4>;

    fn forward(&self, input: Tensor<B, 4>) -> Prediction<Tensor<B, 4>> {
        Prediction::Single(AttentionUNet::forward(self, input))
    }

    fn snapshot_parameters(&self) -> Result<ParamSnapshot> {
        snapshot_of::<B, _>(self)
    }
}

impl<B: Backend> NamedParameters for AttentionUNet<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        self.inc.export_params(&join(prefix, "inc"), out)?;
        self.down1.export_params(&join(prefix, "down1"), out)?;
        self.down2.export_params(&join(prefix, "down2"), out)?;
        self.down3.export_params(&join(prefix, "down3"), out)?;
        self.down4.export_params(&join(prefix, "down4"), out)?;
        self.up1.export_params(&join(prefix, "up1"), out)?;
        self.att1.export_params(&join(prefix, "att1"), out)?;
        self.dec1.export_params(&join(prefix, "dec1"), out)?;
        self.up2.export_params(&join(prefix, "up2"), out)?;
        self.att2.export_params(&join(prefix, "att2"), out)?;
        self.dec2.export_params(&join(prefix, "dec2"), out)?;
        self.up3.export_params(&join(prefix, "up3"), out)?;
        self.att3.export_params(&join(prefix, "att3"), out)?;
        self.dec3.export_params(&join(prefix, "dec3"), out)?;
        self.up4.export_params(&join(prefix, "up4"), out)?;
        self.att4.export_params(&join(prefix, "att4"), out)?;
        self.dec4.export_params(&join(prefix, "dec4"), out)?;
        self.outc.export_params(&join(prefix, "outc"), out)
    }

    fn import_params(self, prefix: &str, snapshot: &ParamSnapshot) -> Result<Self> {
        Ok(Self {
            inc:   self.inc.import_params(&join(prefix, "inc"), snapshot)?,
            down1: self.down1.import_params(&join(prefix, "down1"), snapshot)?,
            down2: self.down2.import_params(&join(prefix, "down2"), snapshot)?,
            down3: self.down3.import_params(&join(prefix, "down3"), snapshot)?,
            down4: self.down4.import_params(&join(prefix, "down4"), snapshot)?,
            up1:   self.up1.import_params(&join(prefix, "up1"), snapshot)?,
            att1:  self.att1.import_params(&join(prefix, "att1"), snapshot)?,
            dec1:  self.dec1.import_params(&join(prefix, "dec1"), snapshot)?,
            up2:   self.up2.import_params(&join(prefix, "up2"), snapshot)?,
            att2:  self.att2.import_params(&join(prefix, "att2"), snapshot)?,
            dec2:  self.dec2.import_params(&join(prefix, "dec2"), snapshot)?,
            up3:   self.up3.import_params(&join(prefix, "up3"), snapshot)?,
            att3:  self.att3.import_params(&join(prefix, "att3"), snapshot)?,
            dec3:  self.dec3.import_params(&join(prefix, "dec3"), snapshot)?,
            up4:   self.up4.import_params(&join(prefix, "up4"), snapshot)?,
            att4:  self.att4.import_params(&join(prefix, "att4"), snapshot)?,
            dec4:  self.dec4.import_params(&join(prefix, "dec4"), snapshot)?,
            outc:  self.outc.import_params(&join(prefix, "outc"), snapshot)?,
            pool:  self.pool,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_forward_keeps_spatial_size() {
        let model: AttentionUNet<TestBackend> = AttentionUNetConfig::new(3, 4)
            .with_base_channels(2)
            .init(&Default::default());
        let out = model.forward(Tensor::ones([1, 3, 16, 16], &Default::default()));
        assert_eq!(out.dims(), [1, 4, 16, 16]);
    }

    #[test]
    fn test_gates_are_named_in_snapshot() {
        let model: AttentionUNet<TestBackend> = AttentionUNetConfig::new(1, 1)
            .with_base_channels(2)
            .init(&Default::default());
        let snapshot = model.snapshot_parameters().unwrap();

        assert_eq!(snapshot["att1.w_g.weight"].shape, vec![8, 16, 1, 1]);
        assert_eq!(snapshot["att4.psi.weight"].shape, vec![1, 1, 1, 1]);
    }
}
