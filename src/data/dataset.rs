// ============================================================
// Layer 4 — Segmentation Dataset
// ============================================================
// Decodes one split of a dataset into memory and exposes it
// through burn's Dataset trait.
//
// All pairs of a split must share one original size; that
// size is scaled and snapped once, so every item has the same
// [C, H, W] and batches stack without padding.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use std::path::PathBuf;

use crate::data::loader::{
    discover_pairs, image_size, load_ground_truth, load_input, scaled_side,
};
use crate::domain::{error::DatasetError, run_config::RunConfig};

/// One decoded (input, ground truth) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationItem {
    /// CHW, values in [0, 1]
    pub input:    Vec<f32>,
    /// HW, 0/1 or class index
    pub gt:       Vec<f32>,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

#[derive(Debug)]
pub struct SegmentationDataset {
    items: Vec<SegmentationItem>,
}

impl SegmentationDataset {
    pub fn new(items: Vec<SegmentationItem>) -> Self {
        Self { items }
    }

    /// (height, width) shared by every item
    pub fn image_shape(&self) -> Option<(usize, usize)> {
        self.items.first().map(|item| (item.height, item.width))
    }
}

impl Dataset<SegmentationItem> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SegmentationItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// `<data_root>/<dataset_name>/<test|train>`
pub fn split_dir(cfg: &RunConfig) -> PathBuf {
    let split = if cfg.test { "test" } else { "train" };
    cfg.data_root.join(&cfg.dataset_name).join(split)
}

/// Load every pair of the configured split.
pub fn load_dataset(cfg: &RunConfig) -> Result<SegmentationDataset> {
    let dir   = split_dir(cfg);
    let pairs = discover_pairs(&dir)
        .with_context(|| format!("Cannot open dataset '{}'", cfg.dataset_name))?;

    let first = pairs
        .first()
        .ok_or_else(|| DatasetError::Empty { path: dir.clone() })?;
    let original = image_size(&first.input)?;
    let width    = scaled_side(original.0, cfg.scale);
    let height   = scaled_side(original.1, cfg.scale);

    let mut items = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        for path in [&pair.input, &pair.gt] {
            let found = image_size(path)?;
            if found != original {
                return Err(DatasetError::SizeMismatch {
                    path:     path.clone(),
                    expected: original,
                    found,
                }
                .into());
            }
        }

        items.push(SegmentationItem {
            input:    load_input(&pair.input, width, height, cfg.in_channels)?,
            gt:       load_ground_truth(&pair.gt, width, height, cfg.n_class)?,
            channels: cfg.in_channels,
            height:   height as usize,
            width:    width as usize,
        });
    }

    tracing::info!(
        "Loaded {} image pairs from '{}' at {}x{}",
        items.len(), dir.display(), width, height
    );
    Ok(SegmentationDataset::new(items))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn write_split(root: &std::path::Path, split: &str, sizes: &[(u32, u32)]) {
        let dir = root.join("cells").join(split);
        fs::create_dir_all(dir.join("input")).unwrap();
        fs::create_dir_all(dir.join("gt")).unwrap();
        for (i, &(w, h)) in sizes.iter().enumerate() {
            RgbImage::new(w, h).save(dir.join("input").join(format!("{i}.png"))).unwrap();
            GrayImage::from_pixel(w, h, Luma([255]))
                .save(dir.join("gt").join(format!("{i}.png")))
                .unwrap();
        }
    }

    fn config(root: &std::path::Path) -> RunConfig {
        RunConfig {
            dataset_name: "cells".to_string(),
            data_root:    root.to_path_buf(),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_items_are_scaled_and_snapped() {
        let tmp = TempDir::new().unwrap();
        write_split(tmp.path(), "train", &[(40, 70), (40, 70)]);

        let dataset = load_dataset(&config(tmp.path())).unwrap();
        let item    = dataset.get(1).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!((item.height, item.width), (64, 32));
        assert_eq!(item.input.len(), 3 * 64 * 32);
        assert!(item.gt.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_test_flag_selects_test_split() {
        let tmp = TempDir::new().unwrap();
        write_split(tmp.path(), "test", &[(16, 16)]);

        let cfg = RunConfig { test: true, ..config(tmp.path()) };
        assert_eq!(load_dataset(&cfg).unwrap().len(), 1);
        assert!(load_dataset(&config(tmp.path())).is_err());
    }

    #[test]
    fn test_mixed_sizes_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write_split(tmp.path(), "train", &[(32, 32), (48, 32)]);

        let err = load_dataset(&config(tmp.path())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::SizeMismatch { expected: (32, 32), found: (48, 32), .. })
        ));
    }

    #[test]
    fn test_empty_split_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_split(tmp.path(), "train", &[]);

        let err = load_dataset(&config(tmp.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<DatasetError>(), Some(DatasetError::Empty { .. })));
    }
}
