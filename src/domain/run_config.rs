// ============================================================
// Layer 3 — Run Configuration
// ============================================================
// Every parameter of one training run, as a flat record.
//
// RunConfig is built once from the CLI and then treated as
// read-only. The only field that ever differs between a saved
// run and a resumed run is `epoch`: resuming adopts the saved
// hyperparameters but keeps the epoch the user asked for.
//
// That rule is expressed as a pure merge of two wrapper types:
//
//   SavedConfig      — what the checkpoint recorded
//   RequestedConfig  — what the current command line asked for
//        │
//        ▼
//   merge_resume()   → effective RunConfig
//
// Reference: Rust Book §5 (Structs), §9 (Error Handling)

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Model names accepted by the model factory.
pub const KNOWN_MODELS: [&str; 3] = ["unet", "unet_nested", "attention_unet"];

// ─── DeviceKind ───────────────────────────────────────────────────────────────
/// Which burn backend the run executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// `Autodiff<NdArray>` on the host CPU
    Cpu,
    /// `Autodiff<Wgpu>` on the default GPU adapter
    Wgpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu  => write!(f, "cpu"),
            DeviceKind::Wgpu => write!(f, "wgpu"),
        }
    }
}

// ─── RunConfig ────────────────────────────────────────────────────────────────
/// All parameters of a training run.
///
/// Serialised into every checkpoint under the `opt` key, and
/// dumped line by line into `opt.csv` at process start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub dataset_name:        String,
    /// First epoch to train (0 for a cold start)
    pub epoch:               usize,
    /// Exclusive upper bound of the epoch range
    pub n_epochs:            usize,
    pub batch_size:          usize,
    pub lr:                  f64,
    pub b1:                  f64,
    pub b2:                  f64,
    /// Data loader worker threads
    pub n_cpu:               usize,
    pub model_name:          String,
    /// Downscaling factor applied to every image before batching
    pub scale:               f64,
    pub in_channels:         usize,
    pub n_class:             usize,
    pub checkpoint_dir:      PathBuf,
    pub checkpoint_interval: usize,
    /// Load the `test` split instead of `train`
    pub test:                bool,
    pub deep_supervision:    bool,
    pub data_root:           PathBuf,
    /// Parent directory of the live scalar streams
    pub runs_dir:            PathBuf,
    /// Width of the first encoder stage; deeper stages double it
    pub base_channels:       usize,
    /// Shuffle seed for the data loader
    pub seed:                u64,
    pub device:              DeviceKind,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset_name:        "mydataset".to_string(),
            epoch:               0,
            n_epochs:            100,
            batch_size:          8,
            lr:                  2e-4,
            b1:                  0.5,
            b2:                  0.999,
            n_cpu:               16,
            model_name:          "unet".to_string(),
            scale:               1.0,
            in_channels:         3,
            n_class:             1,
            checkpoint_dir:      PathBuf::from("./checkpoint/"),
            checkpoint_interval: 20,
            test:                false,
            deep_supervision:    false,
            data_root:           PathBuf::from("./data"),
            runs_dir:            PathBuf::from("runs"),
            base_channels:       32,
            seed:                42,
            device:              DeviceKind::Wgpu,
        }
    }
}

impl RunConfig {
    /// Reject configurations that cannot start a run.
    ///
    /// An empty epoch range (`epoch >= n_epochs`) is NOT an error:
    /// the loop simply has nothing to do.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be at least 1"));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::invalid("checkpoint_interval", "must be at least 1"));
        }
        if self.n_class == 0 {
            return Err(ConfigError::invalid("n_class", "must be at least 1"));
        }
        if self.in_channels != 1 && self.in_channels != 3 {
            return Err(ConfigError::invalid(
                "in_channels",
                format!("must be 1 (grayscale) or 3 (RGB), got {}", self.in_channels),
            ));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(ConfigError::invalid(
                "scale",
                format!("must be in (0, 1], got {}", self.scale),
            ));
        }
        if self.base_channels == 0 {
            return Err(ConfigError::invalid("base_channels", "must be at least 1"));
        }
        if !KNOWN_MODELS.contains(&self.model_name.as_str()) {
            return Err(ConfigError::UnknownModel(self.model_name.clone()));
        }
        Ok(())
    }

    /// True if the epoch range `epoch..n_epochs` is non-empty
    pub fn has_epochs_to_run(&self) -> bool {
        self.epoch < self.n_epochs
    }

    /// A non-zero start epoch resumes from `<epoch>.pth`
    pub fn is_resume(&self) -> bool {
        self.epoch != 0
    }

    /// Whether a checkpoint is due at the end of `epoch`.
    /// Uses the raw epoch counter, not epochs since resume.
    pub fn is_checkpoint_epoch(&self, epoch: usize) -> bool {
        epoch % self.checkpoint_interval == 0
    }

    /// Every field as `(key, value)` in declaration order,
    /// the row format of `opt.csv`.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dataset_name",        self.dataset_name.clone()),
            ("epoch",               self.epoch.to_string()),
            ("n_epochs",            self.n_epochs.to_string()),
            ("batch_size",          self.batch_size.to_string()),
            ("lr",                  self.lr.to_string()),
            ("b1",                  self.b1.to_string()),
            ("b2",                  self.b2.to_string()),
            ("n_cpu",               self.n_cpu.to_string()),
            ("model_name",          self.model_name.clone()),
            ("scale",               self.scale.to_string()),
            ("in_channels",         self.in_channels.to_string()),
            ("n_class",             self.n_class.to_string()),
            ("checkpoint_dir",      self.checkpoint_dir.display().to_string()),
            ("checkpoint_interval", self.checkpoint_interval.to_string()),
            ("test",                self.test.to_string()),
            ("deep_supervision",    self.deep_supervision.to_string()),
            ("data_root",           self.data_root.display().to_string()),
            ("runs_dir",            self.runs_dir.display().to_string()),
            ("base_channels",       self.base_channels.to_string()),
            ("seed",                self.seed.to_string()),
            ("device",              self.device.to_string()),
        ]
    }
}

// ─── Resume Merge ─────────────────────────────────────────────────────────────
/// The configuration stored inside a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedConfig(pub RunConfig);

/// The configuration the current command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedConfig(pub RunConfig);

/// Combine a saved and a requested configuration on resume.
///
/// Every field comes from the saved run except `epoch`,
/// which is the restart point the caller requested.
pub fn merge_resume(saved: SavedConfig, requested: &RequestedConfig) -> RunConfig {
    RunConfig {
        epoch: requested.0.epoch,
        ..saved.0
    }
}
