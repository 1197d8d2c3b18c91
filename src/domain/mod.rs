// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define the core
// concepts of a training run.
//
// Rules for this layer:
//   - NO burn framework types
//   - NO file I/O
//   - Only plain data, errors and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Run parameters and the resume merge
pub mod run_config;

// Parameter snapshot and the checkpoint envelope
pub mod checkpoint;

// Typed error taxonomy
pub mod error;

// Core abstractions the training loop is written against
pub mod traits;
