// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence that several layers rely on:
//
//   checkpoint.rs — {run config, weights} per epoch, written
//                   atomically; opt.csv run-config dump;
//                   loading for resume and inspection
//
//   metrics.rs    — per-epoch loss history mirrored to
//                   loss.csv and a live JSON-lines stream
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Checkpoint saving and loading
pub mod checkpoint;

/// Loss history CSV and scalar stream
pub mod metrics;
