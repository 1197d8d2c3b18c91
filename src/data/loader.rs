// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Finds (input, ground truth) image pairs on disk and decodes
// them into flat f32 planes with the `image` crate.
//
// Directory layout:
//   <data_root>/<dataset_name>/
//     train/
//       input/   cell_001.png  cell_002.png ...
//       gt/      cell_001.png  cell_002.png ...
//     test/
//       input/ ...
//       gt/    ...
//
// A pair is an input and a ground truth with the same file
// stem; extensions may differ (cell_001.jpg ↔ cell_001.png).
//
// Every image is resized by `scale` and then snapped down to a
// multiple of 16 (at least 16) so four 2× poolings divide it.
//
//   input  → RGB or luma, CHW order, values in [0, 1]
//   gt     → nearest-neighbour resize, then
//              n_class == 1 → 1.0 where pixel > 127, else 0.0
//              n_class  > 1 → raw pixel value as class index
//
// Reference: image crate docs (DynamicImage, imageops)

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::error::DatasetError;

/// File extensions recognised as images
pub const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Network input sides must be multiples of this
pub const SIZE_MULTIPLE: u32 = 16;

/// Pixel value above which a binary mask counts as foreground
pub const BINARY_THRESHOLD: u8 = 127;

/// One input image and its ground-truth mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub input: PathBuf,
    pub gt:    PathBuf,
}

/// `side * scale`, rounded down to a multiple of 16, at least 16
pub fn scaled_side(side: u32, scale: f64) -> u32 {
    let scaled = (side as f64 * scale).floor() as u32;
    (scaled / SIZE_MULTIPLE * SIZE_MULTIPLE).max(SIZE_MULTIPLE)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// Image files directly inside `dir`, sorted by path.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::MissingDirectory { path: dir.to_path_buf() }.into());
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Pair every image in `<split_dir>/input` with the image of
/// the same stem in `<split_dir>/gt`.
pub fn discover_pairs(split_dir: &Path) -> Result<Vec<ImagePair>> {
    let inputs = list_images(&split_dir.join("input"))?;
    let truths = list_images(&split_dir.join("gt"))?;

    let by_stem: HashMap<String, PathBuf> = truths
        .into_iter()
        .filter_map(|path| stem_of(&path).map(|stem| (stem, path)))
        .collect();

    let mut pairs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let gt = stem_of(&input)
            .and_then(|stem| by_stem.get(&stem).cloned())
            .ok_or_else(|| DatasetError::UnpairedInput { input: input.clone() })?;
        pairs.push(ImagePair { input, gt });
    }

    tracing::debug!("Found {} image pairs in '{}'", pairs.len(), split_dir.display());
    Ok(pairs)
}

/// (width, height) of an image file, read from its header
pub fn image_size(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path)
        .with_context(|| format!("Cannot read image header of '{}'", path.display()))
}

/// Decode, resize and normalise an input image into CHW f32.
pub fn load_input(path: &Path, width: u32, height: u32, channels: usize) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode '{}'", path.display()))?;
    let img = if (img.width(), img.height()) == (width, height) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Triangle)
    };

    let (w, h) = (width as usize, height as usize);
    let mut planes = vec![0.0f32; channels * h * w];

    if channels == 1 {
        for (x, y, pixel) in img.to_luma8().enumerate_pixels() {
            planes[y as usize * w + x as usize] = pixel.0[0] as f32 / 255.0;
        }
    } else {
        for (x, y, pixel) in img.to_rgb8().enumerate_pixels() {
            let offset = y as usize * w + x as usize;
            for c in 0..3 {
                planes[c * h * w + offset] = pixel.0[c] as f32 / 255.0;
            }
        }
    }
    Ok(planes)
}

/// Decode and resize a ground-truth mask into one f32 plane.
pub fn load_ground_truth(path: &Path, width: u32, height: u32, n_class: usize) -> Result<Vec<f32>> {
    let mask = image::open(path)
        .with_context(|| format!("Cannot decode '{}'", path.display()))?
        .to_luma8();
    let mask = imageops::resize(&mask, width, height, FilterType::Nearest);

    let mut plane = Vec::with_capacity((width * height) as usize);
    for pixel in mask.pixels() {
        let value = pixel.0[0];
        if n_class == 1 {
            plane.push(if value > BINARY_THRESHOLD { 1.0 } else { 0.0 });
        } else if (value as usize) < n_class {
            plane.push(value as f32);
        } else {
            return Err(DatasetError::ClassOutOfRange {
                path: path.to_path_buf(),
                index: value,
                n_class,
            }
            .into());
        }
    }
    Ok(plane)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use tempfile::TempDir;

    fn split_with(tmp: &TempDir, inputs: &[&str], gts: &[&str]) -> PathBuf {
        let split = tmp.path().join("train");
        fs::create_dir_all(split.join("input")).unwrap();
        fs::create_dir_all(split.join("gt")).unwrap();
        for name in inputs {
            RgbImage::new(16, 16).save(split.join("input").join(name)).unwrap();
        }
        for name in gts {
            GrayImage::new(16, 16).save(split.join("gt").join(name)).unwrap();
        }
        split
    }

    #[test]
    fn test_scaled_side_snaps_to_multiple_of_16() {
        assert_eq!(scaled_side(512, 1.0), 512);
        assert_eq!(scaled_side(500, 1.0), 496);
        assert_eq!(scaled_side(512, 0.5), 256);
        assert_eq!(scaled_side(100, 0.1), 16);
    }

    #[test]
    fn test_pairs_match_on_stem_across_extensions() {
        let tmp   = TempDir::new().unwrap();
        let split = split_with(&tmp, &["a.png", "b.bmp"], &["b.png", "a.png"]);

        let pairs = discover_pairs(&split).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].input.ends_with("a.png") && pairs[0].gt.ends_with("a.png"));
        assert!(pairs[1].input.ends_with("b.bmp") && pairs[1].gt.ends_with("b.png"));
    }

    #[test]
    fn test_input_without_gt_is_unpaired() {
        let tmp   = TempDir::new().unwrap();
        let split = split_with(&tmp, &["a.png", "lonely.png"], &["a.png"]);

        let err = discover_pairs(&split).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::UnpairedInput { .. })
        ));
    }

    #[test]
    fn test_missing_gt_directory_is_reported() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("input")).unwrap();

        let err = discover_pairs(tmp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::MissingDirectory { .. })
        ));
    }

    #[test]
    fn test_input_is_chw_and_normalised() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("x.png");
        RgbImage::from_pixel(2, 2, Rgb([255, 0, 51])).save(&path).unwrap();

        let planes = load_input(&path, 2, 2, 3).unwrap();
        assert_eq!(planes.len(), 12);
        assert_eq!(&planes[0..4], &[1.0; 4]);
        assert_eq!(&planes[4..8], &[0.0; 4]);
        assert!((planes[8] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_binary_mask_is_thresholded() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("m.png");
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([127]));
        mask.put_pixel(1, 0, Luma([128]));
        mask.save(&path).unwrap();

        assert_eq!(load_ground_truth(&path, 2, 1, 1).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_class_index_out_of_range_is_rejected() {
        let tmp  = TempDir::new().unwrap();
        let path = tmp.path().join("m.png");
        GrayImage::from_pixel(2, 2, Luma([3])).save(&path).unwrap();

        assert_eq!(load_ground_truth(&path, 2, 2, 4).unwrap(), vec![3.0; 4]);
        let err = load_ground_truth(&path, 2, 2, 3).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::ClassOutOfRange { index: 3, n_class: 3, .. })
        ));
    }
}
