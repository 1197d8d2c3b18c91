// ============================================================
// Layer 4 — Segmentation Batcher
// ============================================================
// Implements burn's Batcher trait to stack SegmentationItems
// into tensors, and wraps the resulting DataLoader as the
// training loop's BatchSource.
//
// The loader iterates over whole batches (BatchChunks), so a
// worker pool of any size yields exactly ceil(N / batch_size)
// batches of batch_size items, the last one possibly short.
//
// How batching works here:
//   Input:  N items, each C×H×W input plus H×W ground truth
//   Output: input [N, C, H, W], gt [N, 1, H, W]
//
//   Items are already CHW-flat, so concatenating them in
//   order gives the NCHW buffer directly.
//
// Reference: Burn Book §4 (Batcher, DataLoader)

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
    tensor::TensorData,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::data::dataset::{SegmentationDataset, SegmentationItem};
use crate::domain::{
    run_config::RunConfig,
    traits::{Batch, BatchSource},
};

// ─── SegmentationBatch ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// [N, C, H, W]
    pub input: Tensor<B, 4>,
    /// [N, 1, H, W]
    pub gt:    Tensor<B, 4>,
}

// ─── SegmentationBatcher ──────────────────────────────────────────────────────
#[derive(Clone, Debug, Default)]
pub struct SegmentationBatcher;

impl<B: Backend> Batcher<B, SegmentationItem, SegmentationBatch<B>> for SegmentationBatcher {
    fn batch(&self, items: Vec<SegmentationItem>, device: &B::Device) -> SegmentationBatch<B> {
        let batch_size = items.len();
        // Every item of a dataset shares one shape
        let (c, h, w)  = (items[0].channels, items[0].height, items[0].width);

        let input: Vec<f32> = items.iter().flat_map(|i| i.input.iter().copied()).collect();
        let gt:    Vec<f32> = items.iter().flat_map(|i| i.gt.iter().copied()).collect();

        SegmentationBatch {
            input: Tensor::from_data(TensorData::new(input, [batch_size, c, h, w]), device),
            gt:    Tensor::from_data(TensorData::new(gt, [batch_size, 1, h, w]), device),
        }
    }
}

// ─── BatchChunks ──────────────────────────────────────────────────────────────
/// The dataset seen as whole batches: element `i` holds items
/// `order[i*bs .. (i+1)*bs]`. Loader workers split these chunks
/// between them, never the items inside one.
#[derive(Debug)]
pub struct BatchChunks {
    items:      SegmentationDataset,
    batch_size: usize,
    order:      RwLock<Vec<usize>>,
}

impl BatchChunks {
    pub fn new(items: SegmentationDataset, batch_size: usize) -> Self {
        let order = (0..items.len()).collect();
        Self { items, batch_size: batch_size.max(1), order: RwLock::new(order) }
    }

    /// Draw a fresh item order; every chunk changes membership.
    pub fn reshuffle(&self, rng: &mut StdRng) {
        self.order
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shuffle(rng);
    }
}

impl Dataset<Vec<SegmentationItem>> for BatchChunks {
    fn get(&self, index: usize) -> Option<Vec<SegmentationItem>> {
        let order = self.order.read().unwrap_or_else(PoisonError::into_inner);
        let start = index.checked_mul(self.batch_size)?;
        if start >= order.len() {
            return None;
        }
        let end = (start + self.batch_size).min(order.len());

        order[start..end].iter().map(|&i| self.items.get(i)).collect()
    }

    fn len(&self) -> usize {
        self.items.len().div_ceil(self.batch_size)
    }
}

/// Stacks one chunk; the loader hands it over as a 1-element list.
#[derive(Clone, Debug, Default)]
pub struct ChunkBatcher;

impl<B: Backend> Batcher<B, Vec<SegmentationItem>, SegmentationBatch<B>> for ChunkBatcher {
    fn batch(&self, chunks: Vec<Vec<SegmentationItem>>, device: &B::Device) -> SegmentationBatch<B> {
        let items: Vec<SegmentationItem> = chunks.into_iter().flatten().collect();
        <SegmentationBatcher as Batcher<B, _, _>>::batch(&SegmentationBatcher, items, device)
    }
}

/// Loader over `dataset` with the run's batch size, seed and
/// worker count. Items are reshuffled at the start of every epoch.
pub fn build_loader<B: Backend>(cfg: &RunConfig, dataset: SegmentationDataset) -> LoaderSource<B> {
    let chunks = Arc::new(BatchChunks::new(dataset, cfg.batch_size));
    let loader = DataLoaderBuilder::new(ChunkBatcher)
        .batch_size(1)
        .num_workers(cfg.n_cpu.max(1))
        .build(chunks.clone());

    LoaderSource { chunks, loader, rng: Mutex::new(StdRng::seed_from_u64(cfg.seed)) }
}

// ─── LoaderSource ─────────────────────────────────────────────────────────────
/// A burn DataLoader of whole batches seen as a BatchSource.
pub struct LoaderSource<B: Backend> {
    chunks: Arc<BatchChunks>,
    loader: Arc<dyn DataLoader<B, SegmentationBatch<B>>>,
    rng:    Mutex<StdRng>,
}

impl<B: Backend> BatchSource for LoaderSource<B> {
    type Input  = Tensor<B, 4>;
    type Target = Tensor<B, 4>;

    fn num_batches(&self) -> usize {
        self.chunks.len()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch<Tensor<B, 4>, Tensor<B, 4>>> + '_> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.chunks.reshuffle(&mut rng);

        Box::new(
            self.loader
                .iter()
                .map(|batch| Batch { input: batch.input, target: batch.gt }),
        )
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn item(fill: f32) -> SegmentationItem {
        SegmentationItem {
            input:    vec![fill; 3 * 2 * 2],
            gt:       vec![1.0, 0.0, 0.0, 1.0],
            channels: 3,
            height:   2,
            width:    2,
        }
    }

    #[test]
    fn test_batch_stacks_items_in_nchw() {
        let batch: SegmentationBatch<TestBackend> =
            SegmentationBatcher.batch(vec![item(0.25), item(0.75)], &Default::default());

        assert_eq!(batch.input.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.gt.dims(), [2, 1, 2, 2]);

        let values = batch.input.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 0.25);
        assert_eq!(values[12], 0.75);
    }

    #[test]
    fn test_chunks_split_the_order_into_whole_batches() {
        let chunks = BatchChunks::new(SegmentationDataset::new((0..7).map(|i| item(i as f32)).collect()), 3);

        assert_eq!(chunks.len(), 3);
        let sizes: Vec<usize> = (0..3).map(|i| chunks.get(i).unwrap().len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert!(chunks.get(3).is_none());
    }

    #[test]
    fn test_reshuffle_keeps_a_permutation() {
        let chunks = BatchChunks::new(SegmentationDataset::new((0..7).map(|i| item(i as f32)).collect()), 3);
        chunks.reshuffle(&mut StdRng::seed_from_u64(7));

        let mut seen: Vec<f32> = (0..chunks.len())
            .flat_map(|i| chunks.get(i).unwrap())
            .map(|it| it.input[0])
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..7).map(|i| i as f32).collect::<Vec<_>>());
    }

    fn epoch_fills(source: &LoaderSource<TestBackend>) -> (Vec<usize>, Vec<f32>) {
        let mut sizes = Vec::new();
        let mut fills = Vec::new();
        for batch in source.batches() {
            sizes.push(batch.input.dims()[0]);
            let values = batch.input.into_data().to_vec::<f32>().unwrap();
            fills.extend(values.chunks(12).map(|c| c[0]));
        }
        sizes.sort_unstable();
        fills.sort_by(|a, b| a.partial_cmp(b).unwrap());
        (sizes, fills)
    }

    #[test]
    fn test_loader_source_covers_every_item() {
        let cfg    = RunConfig { batch_size: 2, n_cpu: 1, ..RunConfig::default() };
        let source = build_loader::<TestBackend>(&cfg, SegmentationDataset::new((0..5).map(|i| item(i as f32)).collect()));

        assert_eq!(source.num_batches(), 3);

        let (sizes, fills) = epoch_fills(&source);
        assert_eq!(sizes, vec![1, 2, 2]);
        assert_eq!(fills, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_worker_pool_keeps_batch_size() {
        let cfg     = RunConfig { batch_size: 8, n_cpu: 16, ..RunConfig::default() };
        let dataset = SegmentationDataset::new((0..100).map(|i| item(i as f32)).collect());
        let source  = build_loader::<TestBackend>(&cfg, dataset);

        assert_eq!(source.num_batches(), 13);

        let mut expected_sizes = vec![8; 12];
        expected_sizes.insert(0, 4);
        let all: Vec<f32> = (0..100).map(|i| i as f32).collect();

        for _epoch in 0..2 {
            let (sizes, fills) = epoch_fills(&source);
            assert_eq!(sizes.len(), source.num_batches());
            assert_eq!(sizes, expected_sizes);
            assert_eq!(fills, all);
        }
    }
}
