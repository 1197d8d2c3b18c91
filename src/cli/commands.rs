// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `inspect`, and all
// their flags. Flag names keep their underscores
// (`--n_epochs`, `--checkpoint_dir`, ...).
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for bad values
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::run_config::{DeviceKind, RunConfig};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a segmentation network
    Train(TrainArgs),

    /// Print the config and parameter shapes stored in a checkpoint
    Inspect(InspectArgs),
}

/// Backend selection on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceArg {
    Cpu,
    Wgpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Cpu  => DeviceKind::Cpu,
            DeviceArg::Wgpu => DeviceKind::Wgpu,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Name of the dataset folder under --data_root
    #[arg(long = "dataset_name", default_value = "mydataset")]
    pub dataset_name: String,

    /// Epoch to start training from; non-zero resumes from <epoch>.pth
    #[arg(long = "epoch", default_value_t = 0)]
    pub epoch: usize,

    /// Number of epochs of training
    #[arg(long = "n_epochs", default_value_t = 100)]
    pub n_epochs: usize,

    #[arg(long = "batch_size", default_value_t = 8)]
    pub batch_size: usize,

    /// Learning rate, recorded in opt.csv and checkpoints
    #[arg(long = "lr", default_value_t = 2e-4)]
    pub lr: f64,

    /// Decay of first order momentum, recorded only
    #[arg(long = "b1", default_value_t = 0.5)]
    pub b1: f64,

    /// Decay of second order momentum, recorded only
    #[arg(long = "b2", default_value_t = 0.999)]
    pub b2: f64,

    /// Data loader worker threads
    #[arg(long = "n_cpu", default_value_t = 16)]
    pub n_cpu: usize,

    /// unet | unet_nested | attention_unet
    #[arg(long = "model_name", default_value = "unet")]
    pub model_name: String,

    /// Image downscaling factor in (0, 1]
    #[arg(long = "scale", default_value_t = 1.0)]
    pub scale: f64,

    /// 1 (grayscale) or 3 (RGB)
    #[arg(long = "in_channels", default_value_t = 3)]
    pub in_channels: usize,

    /// 1 for binary masks, otherwise the number of classes
    #[arg(long = "n_class", default_value_t = 1)]
    pub n_class: usize,

    #[arg(long = "checkpoint_dir", default_value = "./checkpoint/")]
    pub checkpoint_dir: PathBuf,

    /// Save a checkpoint every N epochs
    #[arg(long = "checkpoint_interval", default_value_t = 20)]
    pub checkpoint_interval: usize,

    /// Train on the test split instead of train
    #[arg(long = "test")]
    pub test: bool,

    /// Average the loss over every UNet++ output head
    #[arg(long = "deep_supervision")]
    pub deep_supervision: bool,

    /// Root folder holding the datasets
    #[arg(long = "data_root", default_value = "./data")]
    pub data_root: PathBuf,

    /// Parent folder of the live scalar streams
    #[arg(long = "runs_dir", default_value = "runs")]
    pub runs_dir: PathBuf,

    /// Width of the first encoder stage
    #[arg(long = "base_channels", default_value_t = 32)]
    pub base_channels: usize,

    /// Data loader shuffle seed
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    #[arg(long = "device", value_enum, default_value = "wgpu")]
    pub device: DeviceArg,
}

/// Convert CLI TrainArgs into the domain RunConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        RunConfig {
            dataset_name:        a.dataset_name,
            epoch:               a.epoch,
            n_epochs:            a.n_epochs,
            batch_size:          a.batch_size,
            lr:                  a.lr,
            b1:                  a.b1,
            b2:                  a.b2,
            n_cpu:               a.n_cpu,
            model_name:          a.model_name,
            scale:               a.scale,
            in_channels:         a.in_channels,
            n_class:             a.n_class,
            checkpoint_dir:      a.checkpoint_dir,
            checkpoint_interval: a.checkpoint_interval,
            test:                a.test,
            deep_supervision:    a.deep_supervision,
            data_root:           a.data_root,
            runs_dir:            a.runs_dir,
            base_channels:       a.base_channels,
            seed:                a.seed,
            device:              a.device.into(),
        }
    }
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to a `<epoch>.pth` file
    #[arg(long)]
    pub checkpoint: PathBuf,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn train_config(argv: &[&str]) -> RunConfig {
        let cli = Cli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Commands::Train(args) => args.into(),
            other => panic!("expected train, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_match_run_config_default() {
        assert_eq!(train_config(&["unet-trainer", "train"]), RunConfig::default());
    }

    #[test]
    fn test_underscore_flags_are_parsed() {
        let cfg = train_config(&[
            "unet-trainer", "train",
            "--dataset_name", "cells",
            "--n_epochs", "50",
            "--model_name", "unet_nested",
            "--deep_supervision",
            "--checkpoint_interval", "5",
            "--device", "cpu",
        ]);

        assert_eq!(cfg.dataset_name, "cells");
        assert_eq!(cfg.n_epochs, 50);
        assert_eq!(cfg.model_name, "unet_nested");
        assert!(cfg.deep_supervision);
        assert!(!cfg.test);
        assert_eq!(cfg.checkpoint_interval, 5);
        assert_eq!(cfg.device, DeviceKind::Cpu);
    }

    #[test]
    fn test_inspect_requires_checkpoint() {
        assert!(Cli::try_parse_from(["unet-trainer", "inspect"]).is_err());
        let cli = Cli::try_parse_from(["unet-trainer", "inspect", "--checkpoint", "ckpt/21.pth"]).unwrap();
        assert!(matches!(cli.command, Commands::Inspect(a) if a.checkpoint == PathBuf::from("ckpt/21.pth")));
    }
}
