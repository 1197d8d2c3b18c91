// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores {run config, model weights} as one unit.
//
// File naming convention:
//   checkpoint_dir/
//     opt.csv      ← run config dump, one `key,value` per line
//     1.pth        ← written at the end of epoch 0
//     21.pth       ← written at the end of epoch 20
//     ...
//
// A checkpoint is written to a temporary file in the same
// directory and renamed into place, so a reader never sees a
// half-written `.pth`. Old checkpoints are never deleted here.
//
// Encoding: bincode over CheckpointEnvelope.
//
// Reference: Rust Book §9 (Error Handling), tempfile docs

use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::domain::{
    checkpoint::{CheckpointEnvelope, ParamSnapshot},
    error::CheckpointError,
    run_config::RunConfig,
    traits::SegmentationModel,
};

/// Manages checkpoint files inside one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Point the manager at a directory. Nothing is created yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the checkpoint directory (like `mkdir -p`)
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file named by `index`
    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.pth"))
    }

    /// Save the config and the model's parameters at the end
    /// of `epoch`, to `<dir>/<epoch+1>.pth`.
    pub fn save<M: SegmentationModel>(
        &self,
        epoch: usize,
        cfg:   &RunConfig,
        model: &M,
    ) -> Result<PathBuf> {
        let weight = model
            .snapshot_parameters()
            .context("Cannot snapshot model parameters")?;
        let path = self.path_for(epoch + 1);
        self.write_envelope(&path, &CheckpointEnvelope::new(cfg.clone(), weight))?;
        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(path)
    }

    /// Load `<dir>/<index>.pth` and return (config, weight).
    pub fn load(&self, index: usize) -> Result<(RunConfig, ParamSnapshot), CheckpointError> {
        load_checkpoint_file(&self.path_for(index))
    }

    /// Dump every config field to `opt.csv` as `key,value`.
    pub fn save_run_config(&self, cfg: &RunConfig) -> Result<PathBuf> {
        let path = self.dir.join("opt.csv");
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        for (key, value) in cfg.fields() {
            writer.write_record([key, value.as_str()])?;
        }
        writer.flush()?;

        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(path)
    }

    /// Serialise to a temp file next to `path`, then rename.
    fn write_envelope(&self, path: &Path, envelope: &CheckpointEnvelope) -> Result<()> {
        let bytes = bincode::serialize(envelope).context("Cannot encode checkpoint")?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Cannot create temp file in '{}'", self.dir.display()))?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        Ok(())
    }
}

/// Read any checkpoint file by path.
///
/// Fails with `NotFound` if the file is absent and `Corrupt`
/// if it cannot be decoded or lacks `opt` or `weight`.
pub fn load_checkpoint_file(path: &Path) -> Result<(RunConfig, ParamSnapshot), CheckpointError> {
    if !path.exists() {
        return Err(CheckpointError::NotFound { path: path.to_path_buf() });
    }

    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| corrupt(format!("cannot read file: {e}")))?;
    let envelope: CheckpointEnvelope =
        bincode::deserialize(&bytes).map_err(|e| corrupt(format!("cannot decode: {e}")))?;

    let weight = envelope.weight.ok_or_else(|| corrupt("missing 'weight'".to_string()))?;
    let opt    = envelope.opt.ok_or_else(|| corrupt("missing 'opt'".to_string()))?;

    Ok((opt, weight))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::ParamTensor;
    use crate::domain::traits::Prediction;
    use tempfile::TempDir;

    /// A model that is nothing but its parameter snapshot
    struct FixedWeights(ParamSnapshot);

    impl SegmentationModel for FixedWeights {
        type Input  = ();
        type Output = ();

        fn forward(&self, _input: ()) -> Prediction<()> {
            Prediction::Single(())
        }

        fn snapshot_parameters(&self) -> Result<ParamSnapshot> {
            Ok(self.0.clone())
        }
    }

    fn sample_weights() -> ParamSnapshot {
        let mut weights = ParamSnapshot::new();
        weights.insert(
            "inc.conv1.weight".to_string(),
            ParamTensor::new(vec![2, 1, 3, 3], (0..18).map(|i| i as f32 * 0.5).collect()),
        );
        weights.insert(
            "inc.conv1.bias".to_string(),
            ParamTensor::new(vec![2], vec![-1.0, 1.0]),
        );
        weights
    }

    #[test]
    fn test_round_trip_returns_saved_config_and_weights() {
        let tmp     = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path());
        let cfg     = RunConfig { epoch: 3, n_epochs: 9, ..RunConfig::default() };
        let model   = FixedWeights(sample_weights());

        let path = manager.save(4, &cfg, &model).unwrap();
        assert_eq!(path, tmp.path().join("5.pth"));

        let (loaded_cfg, loaded_weight) = manager.load(5).unwrap();
        assert_eq!(loaded_cfg, cfg);
        assert_eq!(loaded_weight, sample_weights());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let tmp     = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path());
        assert!(matches!(manager.load(7), Err(CheckpointError::NotFound { .. })));
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("1.pth"), b"\x01\x02not a checkpoint").unwrap();
        let manager = CheckpointManager::new(tmp.path());
        assert!(matches!(manager.load(1), Err(CheckpointError::Corrupt { .. })));
    }

    #[test]
    fn test_weight_only_checkpoint_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let envelope = CheckpointEnvelope { opt: None, weight: Some(sample_weights()) };
        fs::write(tmp.path().join("3.pth"), bincode::serialize(&envelope).unwrap()).unwrap();

        let manager = CheckpointManager::new(tmp.path());
        match manager.load(3) {
            Err(CheckpointError::Corrupt { reason, .. }) => assert!(reason.contains("opt")),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let tmp     = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path());
        let model   = FixedWeights(sample_weights());

        manager.save(0, &RunConfig::default(), &model).unwrap();
        manager.save(0, &RunConfig::default(), &model).unwrap();

        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.pth".to_string()]);
    }

    #[test]
    fn test_run_config_dump_has_one_line_per_field() {
        let tmp     = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path().join("nested"));
        manager.ensure_dir().unwrap();

        let cfg  = RunConfig { dataset_name: "cells".to_string(), ..RunConfig::default() };
        let path = manager.save_run_config(&cfg).unwrap();

        let text  = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), cfg.fields().len());
        assert_eq!(lines[0], "dataset_name,cells");
        assert_eq!(lines[1], "epoch,0");
    }

    #[test]
    fn test_run_config_dump_quotes_paths_with_commas() {
        let tmp     = TempDir::new().unwrap();
        let manager = CheckpointManager::new(tmp.path());

        let cfg  = RunConfig { data_root: PathBuf::from("./data,v2"), ..RunConfig::default() };
        let path = manager.save_run_config(&cfg).unwrap();

        let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), cfg.fields().len());
        assert!(rows.iter().all(|r| r.len() == 2));

        let data_root = rows.iter().find(|r| &r[0] == "data_root").unwrap();
        assert_eq!(&data_root[1], "./data,v2");
    }
}
