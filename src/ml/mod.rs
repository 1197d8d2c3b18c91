// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All burn-specific model and optimisation code lives here.
// The training loop itself only sees the Layer 3 traits; this
// layer provides their burn implementations.
//
// What's in this layer:
//
//   params.rs         — NamedParameters: module ⇄ ParamSnapshot
//                       by dotted parameter name
//
//   blocks.rs         — ConvBlock, AttentionGate, upsample2x
//
//   unet.rs           — UNet (4-level encoder/decoder)
//   nested_unet.rs    — UNet++ with optional deep supervision
//   attention_unet.rs — UNet with attention-gated skips
//
//   factory.rs        — ModelKind + NetworkFactory: model name
//                       → freshly built network
//
//   loss.rs           — BCE-with-logits, cross-entropy, BCE+Dice
//                       and the rule that picks one
//
//   session.rs        — BurnUpdater: AdamW behind ParameterUpdater
//
//   trainer.rs        — The epoch/batch training loop
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Parameter export/import by name
pub mod params;

/// Convolution blocks and attention gates shared by the networks
pub mod blocks;

/// Classic UNet
pub mod unet;

/// UNet++ (nested skip pathways)
pub mod nested_unet;

/// Attention UNet
pub mod attention_unet;

/// Model name → network
pub mod factory;

/// Loss functions and loss selection
pub mod loss;

/// burn optimizer adapter
pub mod session;

/// Generic training loop
pub mod trainer;
