//! Prefetching batch loader.
//!
//! Worker threads pull sample indices from a shared cursor, assemble
//! bundles, and send them back over a channel; the consuming side
//! reorders them into manifest order and collates fixed-size batches.
//! The final batch may be short. Workers only parallelize sample
//! assembly; inference itself stays strictly sequential.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use vton_core::{Error, Result};

use crate::dataset::{collate, Batch, SampleBundle, TryonDataset};

pub struct Loader {
    rx: mpsc::Receiver<(usize, Result<SampleBundle>)>,
    /// Out-of-order arrivals waiting for their turn.
    pending: BTreeMap<usize, Result<SampleBundle>>,
    next_index: usize,
    total: usize,
    batch_size: usize,
    workers: Vec<thread::JoinHandle<()>>,
}

impl Loader {
    /// Start `workers` prefetch threads over the whole dataset.
    pub fn new(dataset: Arc<TryonDataset>, batch_size: usize, workers: usize) -> Loader {
        let total = dataset.len();
        let batch_size = batch_size.max(1);
        let workers = workers.clamp(1, total.max(1));

        let (tx, rx) = mpsc::channel();
        let cursor = Arc::new(Mutex::new(0usize));

        let handles = (0..workers)
            .map(|_| {
                let dataset = Arc::clone(&dataset);
                let cursor = Arc::clone(&cursor);
                let tx = tx.clone();
                thread::spawn(move || loop {
                    let idx = {
                        let mut cursor = cursor.lock();
                        if *cursor >= total {
                            break;
                        }
                        let idx = *cursor;
                        *cursor += 1;
                        idx
                    };
                    if tx.send((idx, dataset.sample(idx))).is_err() {
                        break;
                    }
                })
            })
            .collect();

        Loader {
            rx,
            pending: BTreeMap::new(),
            next_index: 0,
            total,
            batch_size,
            workers: handles,
        }
    }

    fn take_next_sample(&mut self) -> Option<Result<SampleBundle>> {
        if self.next_index >= self.total {
            return None;
        }
        loop {
            if let Some(sample) = self.pending.remove(&self.next_index) {
                self.next_index += 1;
                return Some(sample);
            }
            match self.rx.recv() {
                Ok((idx, sample)) => {
                    self.pending.insert(idx, sample);
                }
                Err(_) => {
                    // Workers died without delivering the sample.
                    self.next_index = self.total;
                    return Some(Err(Error::Dataset(
                        "loader workers exited before the dataset was exhausted".into(),
                    )));
                }
            }
        }
    }

    fn next_batch(&mut self) -> Option<Result<Batch>> {
        let mut samples = Vec::with_capacity(self.batch_size);
        while samples.len() < self.batch_size {
            match self.take_next_sample() {
                Some(Ok(sample)) => samples.push(sample),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if samples.is_empty() {
            None
        } else {
            Some(collate(&samples))
        }
    }
}

impl Iterator for Loader {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        // Drain the channel so senders unblock, then join.
        self.pending.clear();
        while self.rx.try_recv().is_ok() {}
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use image::RgbImage;
    use vton_core::{write_pairs, Keypoint, PairEntry, PosePoint, PoseSkeleton};

    use crate::dataset::DatasetOptions;

    fn stage_many(dir: &Path, n: usize) -> DatasetOptions {
        let datamode = "test";
        let image_dir = dir.join(datamode).join("image");
        let cloth_dir = dir.join(datamode).join("cloth");
        fs::create_dir_all(&image_dir).unwrap();
        fs::create_dir_all(&cloth_dir).unwrap();

        let mut pairs = Vec::new();
        for i in 0..n {
            let person = RgbImage::from_pixel(24, 32, image::Rgb([i as u8, 100, 100]));
            let cloth = RgbImage::from_pixel(24, 32, image::Rgb([40, 40, 200]));
            person
                .save(image_dir.join(format!("person_{i}.png")))
                .unwrap();
            cloth.save(cloth_dir.join(format!("cloth_{i}.png"))).unwrap();

            let mut skeleton = PoseSkeleton::default();
            skeleton.points[Keypoint::Neck as usize] = PosePoint::new(12.0, 8.0, 0.9);
            crate::pose::write_skeleton(
                &dir.join(datamode)
                    .join("pose")
                    .join(format!("person_{i}_keypoints.json")),
                &skeleton,
            )
            .unwrap();

            pairs.push(PairEntry::new(
                format!("person_{i}.png"),
                format!("cloth_{i}.png"),
            ));
        }

        let list = dir.join("pairs.txt");
        write_pairs(&list, &pairs).unwrap();

        let mut opts = DatasetOptions::new(dir, datamode, list);
        opts.fine_width = 32;
        opts.fine_height = 32;
        opts
    }

    #[test]
    fn batches_preserve_manifest_order() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = stage_many(tmp.path(), 5);
        let dataset = Arc::new(crate::dataset::TryonDataset::open(opts, None).unwrap());

        let loader = Loader::new(dataset, 2, 3);
        let mut names = Vec::new();
        let mut sizes = Vec::new();
        for batch in loader {
            let batch = batch.unwrap();
            sizes.push(batch.len());
            names.extend(batch.im_names);
        }

        assert_eq!(sizes, vec![2, 2, 1]);
        let expected: Vec<String> = (0..5).map(|i| format!("person_{i}.png")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn single_worker_single_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let opts = stage_many(tmp.path(), 2);
        let dataset = Arc::new(crate::dataset::TryonDataset::open(opts, None).unwrap());

        let mut loader = Loader::new(dataset, 4, 1);
        let batch = loader.next().unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(loader.next().is_none());
    }
}
