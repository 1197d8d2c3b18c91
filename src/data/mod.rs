// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from image folders on disk
// to batched tensors.
//
// The pipeline flows in this order:
//
//   <data_root>/<dataset>/<split>/{input,gt}/
//       │
//       ▼
//   loader              → pairs files by stem, decodes images
//       │
//       ▼
//   SegmentationDataset → implements Burn's Dataset trait
//       │
//       ▼
//   BatchChunks         → reshuffled each epoch, one element per batch
//       │
//       ▼
//   SegmentationBatcher → stacks items into NCHW tensors
//       │
//       ▼
//   DataLoader          → prefetches whole batches on n_cpu workers
//       │
//       ▼
//   LoaderSource        → BatchSource for the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Image pair discovery and decoding
pub mod loader;

/// Implements Burn's Dataset trait for decoded image pairs
pub mod dataset;

/// Implements Burn's Batcher trait and the loop's BatchSource
pub mod batcher;
