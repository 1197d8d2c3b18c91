// ============================================================
// Layer 5 — UNet
// ============================================================
// The classic encoder/decoder with skip connections.
//
//   input ─ inc ──────────────────────────── dec4 ─ outc → logits
//            │ pool                           ▲ up4
//           down1 ─────────────────────── dec3
//            │ pool                       ▲ up3
//           down2 ─────────────────── dec2
//            │ pool                   ▲ up2
//           down3 ─────────────── dec1
//            │ pool               ▲ up1
//           down4 ────────────────┘
//
// Widths: c, 2c, 4c, 8c, 16c with c = base_channels.
// Four 2× poolings: height and width must be multiples of 16.
//
// Reference: Ronneberger et al. (2015) U-Net

use anyhow::Result;
use burn::{
    nn::{
        conv::{Conv2d, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use crate::domain::checkpoint::ParamSnapshot;
use crate::domain::traits::{Prediction, SegmentationModel};
use crate::ml::blocks::{conv1x1, ConvBlock};
use crate::ml::params::{join, snapshot_of, NamedParameters};

#[derive(Config, Debug)]
pub struct UNetConfig {
    pub in_channels:   usize,
    pub n_class:       usize,
    #[config(default = 32)]
    pub base_channels: usize,
}

/// 2×2 transposed convolution doubling height and width
pub fn up_conv<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([in_ch, out_ch], [2, 2])
        .with_stride([2, 2])
        .init(device)
}

/// 2×2 max pooling with stride 2
pub fn pool2x<B: Backend>() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

impl UNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> UNet<B> {
        let c = self.base_channels;
        UNet {
            inc:   ConvBlock::new(self.in_channels, c, device),
            down1: ConvBlock::new(c, c * 2, device),
            down2: ConvBlock::new(c * 2, c * 4, device),
            down3: ConvBlock::new(c * 4, c * 8, device),
            down4: ConvBlock::new(c * 8, c * 16, device),
            up1:   up_conv(c * 16, c * 8, device),
            dec1:  ConvBlock::new(c * 16, c * 8, device),
            up2:   up_conv(c * 8, c * 4, device),
            dec2:  ConvBlock::new(c * 8, c * 4, device),
            up3:   up_conv(c * 4, c * 2, device),
            dec3:  ConvBlock::new(c * 4, c * 2, device),
            up4:   up_conv(c * 2, c, device),
            dec4:  ConvBlock::new(c * 2, c, device),
            outc:  conv1x1(c, self.n_class, device),
            pool:  pool2x::<B>(),
        }
    }
}

#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    pub inc:   ConvBlock<B>,
    pub down1: ConvBlock<B>,
    pub down2: ConvBlock<B>,
    pub down3: ConvBlock<B>,
    pub down4: ConvBlock<B>,
    pub up1:   ConvTranspose2d<B>,
    pub dec1:  ConvBlock<B>,
    pub up2:   ConvTranspose2d<B>,
    pub dec2:  ConvBlock<B>,
    pub up3:   ConvTranspose2d<B>,
    pub dec3:  ConvBlock<B>,
    pub up4:   ConvTranspose2d<B>,
    pub dec4:  ConvBlock<B>,
    pub outc:  Conv2d<B>,
    pub pool:  MaxPool2d,
}

impl<B: Backend> UNet<B> {
    /// [N, in_channels, H, W] → logits [N, n_class, H, W]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x1 = self.inc.forward(x);
        let x2 = self.down1.forward(self.pool.forward(x1.clone()));
        let x3 = self.down2.forward(self.pool.forward(x2.clone()));
        let x4 = self.down3.forward(self.pool.forward(x3.clone()));
        let x5 = self.down4.forward(self.pool.forward(x4.clone()));

        let d = self.dec1.forward(Tensor::cat(vec![x4, self.up1.forward(x5)], 1));
        let d = self.dec2.forward(Tensor::cat(vec![x3, self.up2.forward(d)], 1));
        let d = self.dec3.forward(Tensor::cat(vec![x2, self.up3.forward(d)], 1));
        let d = self.dec4.forward(Tensor::cat(vec![x1, self.up4.forward(d)], 1));

        self.outc.forward(d)
    }
}

impl<B: Backend> SegmentationModel for UNet<B> {
    type Input  = Tensor<B, 4>;
    type Output = Tensor<B, 4>;

    fn forward(&self, input: Tensor<B, 4>) -> Prediction<Tensor<B, 4>> {
        Prediction::Single(UNet::forward(self, input))
    }

    fn snapshot_parameters(&self) -> Result<ParamSnapshot> {
        snapshot_of::<B, _>(self)
    }
}

impl<B: Backend> NamedParameters for UNet<B> {
    fn export_params(&self, prefix: &str, out: &mut ParamSnapshot) -> Result<()> {
        self.inc.export_params(&join(prefix, "inc"), out)?;
        self.down1.export_params(&join(prefix, "down1"), out)?;
        self.down2.export_params(&join(prefix, "down2"), out)?;
        self.down3.export_params(&join(prefix, "down3"), out)?;
        self.down4.export_params(&join(prefix, "down4"), out)?;
        self.up1.export_params(&join(prefix, "up1"), out)?;
        self.dec1.export_params(&join(prefix, "dec1"), out)?;
        self.up2.export_params(&join(prefix, "up2"), out)?;
        self.dec2.export_params(&join(prefix, "dec2"), out)?;
        self.up3.export_params(&join(prefix, "up3"), out)?;
        self.dec3.export_params(&join(prefix, "dec3"), out)?;
        self.up4.export_params(&join(prefix, "up4"), out)?;
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
            dec1:  self.dec1.import_params(&join(prefix, "dec1"), snapshot)?,
            up2:   self.up2.import_params(&join(prefix, "up2"), snapshot)?,
            dec2:  self.dec2.import_params(&join(prefix, "dec2"), snapshot)?,
            up3:   self.up3.import_params(&join(prefix, "up3"), snapshot)?,
            dec3:  self.dec3.import_params(&join(prefix, "dec3"), snapshot)?,
            up4:   self.up4.import_params(&join(prefix, "up4"), snapshot)?,
            dec4:  self.dec4.import_params(&join(prefix, "dec4"), snapshot)?,
            outc:  self.outc.import_params(&join(prefix, "outc"), snapshot)?,
            pool:  self.pool,
        })
    }
}
