//! Directory-based visualization board.
//!
//! The board is an append-only event log a dashboard process tails:
//! montage PNGs under `<dir>/<tag>/` plus an `events.jsonl` index with
//! one line per written image. It stands in for a full event-file
//! format; consumers only need the files and the index.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use candle_core::{IndexOp, Tensor};
use chrono::Utc;
use serde::Serialize;
use vton_core::{Error, Result};

use crate::montage::tile_rows;
use crate::tensor::tensor_to_image;

#[derive(Debug, Serialize)]
struct BoardEvent<'a> {
    step: usize,
    tag: &'a str,
    file: String,
    written_at: chrono::DateTime<Utc>,
}

/// Visualization sink for one driver run.
pub struct Board {
    dir: PathBuf,
    events: BufWriter<File>,
}

impl Board {
    /// Create (or reopen, appending) a board directory.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let events_path = dir.join("events.jsonl");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .map_err(|e| Error::io(&events_path, e))?;

        Ok(Self {
            dir,
            events: BufWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log one `[b, c, h, w]` image batch: one PNG per batch element.
    pub fn add_image(&mut self, tag: &str, batch: &Tensor, step: usize) -> Result<()> {
        let tag_dir = self.dir.join(tag);
        fs::create_dir_all(&tag_dir).map_err(|e| Error::io(&tag_dir, e))?;

        let b = batch.dim(0).map_err(|e| Error::Image(e.to_string()))?;
        for i in 0..b {
            let sample = batch.i(i).map_err(|e| Error::Image(e.to_string()))?;
            let img = tensor_to_image(&sample).map_err(|e| Error::Image(e.to_string()))?;

            let file = format!("{tag}/step_{step:06}_{i:03}.png");
            let path = self.dir.join(&file);
            img.save(&path)
                .map_err(|e| Error::Image(format!("{}: {e}", path.display())))?;

            let event = BoardEvent {
                step,
                tag,
                file,
                written_at: Utc::now(),
            };
            serde_json::to_writer(&mut self.events, &event)?;
            self.events
                .write_all(b"\n")
                .map_err(|e| Error::io(self.dir.join("events.jsonl"), e))?;
        }
        self.events
            .flush()
            .map_err(|e| Error::io(self.dir.join("events.jsonl"), e))?;
        Ok(())
    }

    /// Tile rows of batched tensors into a montage and log it.
    pub fn add_images(&mut self, tag: &str, rows: &[Vec<Tensor>], step: usize) -> Result<()> {
        let canvas = tile_rows(rows).map_err(|e| Error::Image(e.to_string()))?;
        self.add_image(tag, &canvas, step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn writes_pngs_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut board = Board::create(dir.path().join("run")).unwrap();

        let batch = Tensor::zeros((2, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
        board.add_image("combine", &batch, 1).unwrap();

        assert!(dir.path().join("run/combine/step_000001_000.png").exists());
        assert!(dir.path().join("run/combine/step_000001_001.png").exists());

        let index = std::fs::read_to_string(dir.path().join("run/events.jsonl")).unwrap();
        let lines: Vec<_> = index.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"combine\""));
    }

    #[test]
    fn montage_event_is_logged_once_per_batch_element() {
        let dir = tempfile::tempdir().unwrap();
        let mut board = Board::create(dir.path()).unwrap();

        let tile = Tensor::zeros((1, 3, 4, 4), DType::F32, &Device::Cpu).unwrap();
        board
            .add_images("combine", &[vec![tile.clone(), tile]], 3)
            .unwrap();

        let index = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(index.lines().count(), 1);
    }
}
