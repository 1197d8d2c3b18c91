// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records the summed training loss of every epoch in two
// places:
//
//   1. checkpoint_dir/loss.csv — the full history so far,
//      rewritten from memory after every epoch
//   2. a live scalar stream — one point per epoch under the
//      tag "Loss/train", epoch index on the x-axis
//
// Example loss.csv after three epochs:
//   epoch,loss
//   0,41.273100
//   1,30.118532
//   2,27.004871
//
// The stream implementation writes JSON lines to
// runs/<timestamp>/scalars.jsonl and flushes each point so a
// dashboard can tail it while training runs.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::domain::traits::ScalarSink;

/// Series name of the per-epoch training loss
pub const LOSS_TAG: &str = "Loss/train";

/// One row of loss.csv
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetric {
    /// 0-based epoch index
    pub epoch: usize,
    /// Sum of the per-batch losses of this epoch
    pub loss:  f64,
}

/// Keeps the epoch history and mirrors it to disk and the stream.
pub struct MetricsLogger {
    csv_path: PathBuf,
    history:  Vec<EpochMetric>,
    sink:     Box<dyn ScalarSink>,
}

impl MetricsLogger {
    /// Write loss.csv into `dir` and forward points to `sink`.
    pub fn new(dir: impl AsRef<Path>, sink: Box<dyn ScalarSink>) -> Self {
        Self {
            csv_path: dir.as_ref().join("loss.csv"),
            history:  Vec::new(),
            sink,
        }
    }

    /// Append one epoch, rewrite loss.csv, emit the scalar.
    pub fn record(&mut self, epoch: usize, loss: f64) -> Result<()> {
        self.history.push(EpochMetric { epoch, loss });
        self.rewrite_csv()?;
        self.sink.add_scalar(LOSS_TAG, loss, epoch)?;

        tracing::debug!("Logged epoch {} loss={:.6}", epoch, loss);
        Ok(())
    }

    pub fn history(&self) -> &[EpochMetric] {
        &self.history
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Replace loss.csv with the complete in-memory history.
    fn rewrite_csv(&self) -> Result<()> {
        let dir = self.csv_path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Cannot create temp file in '{}'", dir.display()))?;

        let mut writer = csv::Writer::from_writer(tmp);
        writer.write_record(["epoch", "loss"])?;
        for m in &self.history {
            writer.write_record([m.epoch.to_string(), format!("{:.6}", m.loss)])?;
        }
        let tmp = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Cannot flush loss log: {}", e.error()))?;

        tmp.persist(&self.csv_path)
            .map_err(|e| e.error)
            .with_context(|| format!("Cannot write '{}'", self.csv_path.display()))?;
        Ok(())
    }
}

// ─── JsonlScalarWriter ────────────────────────────────────────────────────────
/// Scalar stream as JSON lines: {"tag", "step", "value", "wall_time"}.
pub struct JsonlScalarWriter {
    path:   PathBuf,
    writer: BufWriter<File>,
}

impl JsonlScalarWriter {
    /// Open a fresh stream under `runs_dir/<YYYYmmdd-HHMMSS>/`.
    pub fn create(runs_dir: impl AsRef<Path>) -> Result<Self> {
        let stamp   = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let run_dir = runs_dir.as_ref().join(stamp);
        Self::open_in(&run_dir)
    }

    /// Open (or append to) `dir/scalars.jsonl`.
    pub fn open_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;

        let path = dir.join("scalars.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;

        tracing::info!("Streaming scalars to '{}'", path.display());
        Ok(Self { path, writer: BufWriter::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScalarSink for JsonlScalarWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let wall_time = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let line = serde_json::json!({
            "tag":       tag,
            "step":      step,
            "value":     value,
            "wall_time": wall_time,
        });
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
