//! Batched training dataset with on-the-fly augmentation.
//!
//! An [`AugmentedDataset`] pairs input images with labels, both shaped
//! `(N, H, W, C)`, and streams them as:
//!
//! 1. augment every `(x[i], y[i])` pair with one random draw (in parallel),
//! 2. group consecutive samples into batches (the last one may be short),
//! 3. shuffle the batches through a bounded shuffle buffer,
//! 4. prefetch batches on a background thread.
//!
//! Example:
//! ```no_run
//! # use volume_prep::dataset::{AugmentedDataset, DatasetConfig};
//! # use ndarray::Array4;
//! let x = Array4::<f32>::zeros((64, 128, 128, 1));
//! let y = Array4::<f32>::zeros((64, 128, 128, 1));
//! let config = DatasetConfig::builder().batch_size(8).seed(42).build();
//! let dataset = AugmentedDataset::new(x, y, config)?;
//! for batch in dataset.iter()? {
//!     let batch = batch?;
//!     assert_eq!(batch.x.dim().1, 128);
//! }
//! # Ok::<(), volume_prep::Error>(())
//! ```
//!
//! Every call to [`AugmentedDataset::iter`] starts a new epoch with fresh
//! augmentation parameters and a new shuffle order. With a seed, epoch `e`
//! is reproducible: sample `i` is augmented with an RNG seeded from
//! `seed + (e << 32) + i`.

use crate::augmentation::{AugmentConfig, augment};
use crate::error::{Error, Result};

use crossbeam_channel::{Receiver, bounded};
use log::{debug, error};
use ndarray::{Array3, Array4, Axis, stack};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

/// Shuffle buffer size as a multiple of the batch size.
pub const SHUFFLE_FACTOR: usize = 4;

/// Configuration for AugmentedDataset
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Number of samples per batch
    pub batch_size: usize,
    /// Batches held by the shuffle buffer (defaults to `4 * batch_size`)
    pub shuffle_buffer: Option<usize>,
    /// Batches prepared ahead of the consumer
    pub prefetch: usize,
    /// Random seed for reproducible augmentation and shuffling
    pub seed: Option<u64>,
    /// Ranges of the random augmentation parameters
    pub augment: AugmentConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            shuffle_buffer: None,
            prefetch: 2,
            seed: None,
            augment: AugmentConfig::default(),
        }
    }
}

impl DatasetConfig {
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    pub fn shuffle_buffer_size(&self) -> usize {
        self.shuffle_buffer.unwrap_or(SHUFFLE_FACTOR * self.batch_size)
    }
}

/// Builder for DatasetConfig with method chaining
#[derive(Default)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the shuffle buffer size in batches (must be > 0)
    pub fn shuffle_buffer(mut self, batches: usize) -> Self {
        self.config.shuffle_buffer = Some(batches);
        self
    }

    /// Set how many batches the background thread may prepare ahead.
    pub fn prefetch(mut self, batches: usize) -> Self {
        self.config.prefetch = batches;
        self
    }

    /// Set the random seed for reproducible epochs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn augment(mut self, augment: AugmentConfig) -> Self {
        self.config.augment = augment;
        self
    }

    pub fn build(self) -> DatasetConfig {
        self.config
    }
}

/// Augmented inputs and labels, both `(batch, H, W, C)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array4<f32>,
    pub y: Array4<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct AugmentedDataset {
    x: Arc<Array4<f32>>,
    y: Arc<Array4<f32>>,
    config: DatasetConfig,
    base_seed: u64,
    epoch: AtomicUsize,
}

/// Dataset of `(x, y)` pairs augmented with [`augment`], batched by
/// `batch_size`, shuffled through a `4 * batch_size` buffer and prefetched.
pub fn create_dataset(
    x: Array4<f32>,
    y: Array4<f32>,
    batch_size: usize,
) -> Result<AugmentedDataset> {
    AugmentedDataset::new(x, y, DatasetConfig::builder().batch_size(batch_size).build())
}

impl AugmentedDataset {
    /// # Errors
    ///
    /// Returns an error when `x` and `y` disagree on sample count or image
    /// size, or when the batch or shuffle buffer size is zero.
    pub fn new(x: Array4<f32>, y: Array4<f32>, config: DatasetConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::invalid_parameter("batch_size", "must be positive"));
        }
        if config.shuffle_buffer_size() == 0 {
            return Err(Error::invalid_parameter("shuffle_buffer", "must be positive"));
        }
        let (xn, xh, xw, _) = x.dim();
        let (yn, yh, yw, _) = y.dim();
        if (xn, xh, xw) != (yn, yh, yw) {
            return Err(Error::InvalidShape {
                expected: format!("labels shaped ({xn}, {xh}, {xw}, _)"),
                actual: format!("{:?}", y.shape()),
            });
        }

        let base_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        Ok(Self {
            x: Arc::new(x),
            y: Arc::new(y),
            config,
            base_seed,
            epoch: AtomicUsize::new(0),
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of batches per epoch, counting a final short batch.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.config.batch_size)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Start the next epoch.
    pub fn iter(&self) -> Result<DatasetIter> {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        self.iter_epoch(epoch)
    }

    /// Stream a given epoch without advancing the epoch counter.
    pub fn iter_epoch(&self, epoch: usize) -> Result<DatasetIter> {
        let (tx, rx) = bounded(self.config.prefetch);
        let stop = Arc::new(AtomicBool::new(false));
        let producer = Producer {
            x: Arc::clone(&self.x),
            y: Arc::clone(&self.y),
            batch_size: self.config.batch_size,
            shuffle_buffer: self.config.shuffle_buffer_size(),
            augment: self.config.augment,
            base_seed: self.base_seed,
            epoch,
            stop: Arc::clone(&stop),
        };

        let handle = thread::Builder::new()
            .name("dataset-prefetch".to_string())
            .spawn(move || {
                for item in producer.batches() {
                    let failed = item.is_err();
                    if tx.send(item).is_err() || failed {
                        break;
                    }
                }
            })?;

        Ok(DatasetIter {
            rx: Some(rx),
            handle: Some(handle),
            stop,
        })
    }
}

struct Producer {
    x: Arc<Array4<f32>>,
    y: Arc<Array4<f32>>,
    batch_size: usize,
    shuffle_buffer: usize,
    augment: AugmentConfig,
    base_seed: u64,
    epoch: usize,
    stop: Arc<AtomicBool>,
}

impl Producer {
    fn sample_seed(&self, index: usize) -> u64 {
        self.base_seed
            .wrapping_add((self.epoch as u64) << 32)
            .wrapping_add(index as u64)
    }

    fn shuffle_seed(&self) -> u64 {
        self.base_seed.rotate_left(32) ^ self.epoch as u64
    }

    fn batches(&self) -> impl Iterator<Item = Result<Batch>> + '_ {
        let total = self.x.len_of(Axis(0));
        // checked before each batch so an abandoned epoch stops filling the shuffle buffer
        let ranges = (0..total)
            .step_by(self.batch_size)
            .take_while(move |_| !self.stop.load(Ordering::Relaxed))
            .map(move |start| start..(start + self.batch_size).min(total));
        let rng = StdRng::seed_from_u64(self.shuffle_seed());
        Shuffled::new(ranges.map(move |range| self.augment_batch(range)), self.shuffle_buffer, rng)
    }

    fn augment_batch(&self, range: Range<usize>) -> Result<Batch> {
        debug!("epoch {} augmenting samples {:?}", self.epoch, range);
        let pairs: Vec<(Array3<f32>, Array3<f32>)> = range
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.sample_seed(i));
                augment(
                    &self.x.index_axis(Axis(0), i),
                    &self.y.index_axis(Axis(0), i),
                    &mut rng,
                    &self.augment,
                )
            })
            .collect::<Result<_>>()?;

        let xs: Vec<_> = pairs.iter().map(|(x, _)| x.view()).collect();
        let ys: Vec<_> = pairs.iter().map(|(_, y)| y.view()).collect();
        Ok(Batch {
            x: stack(Axis(0), &xs)?,
            y: stack(Axis(0), &ys)?,
        })
    }
}

/// Shuffles an iterator through a buffer of `capacity` items: once the
/// buffer is full, each incoming item replaces a randomly chosen buffered
/// one, which is emitted. Errors pass through immediately.
pub struct Shuffled<I, T, R> {
    inner: I,
    buffer: Vec<T>,
    capacity: usize,
    rng: R,
}

impl<I, T, R> Shuffled<I, T, R>
where
    I: Iterator<Item = Result<T>>,
    R: Rng,
{
    pub fn new(inner: I, capacity: usize, rng: R) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            rng,
        }
    }
}

impl<I, T, R> Iterator for Shuffled<I, T, R>
where
    I: Iterator<Item = Result<T>>,
    R: Rng,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.len() < self.capacity {
            match self.inner.next() {
                Some(Ok(item)) => self.buffer.push(item),
                Some(Err(e)) => return Some(Err(e)),
                None => break,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(index)))
    }
}

/// Batches of one epoch, received from the prefetch thread.
pub struct DatasetIter {
    rx: Option<Receiver<Result<Batch>>>,
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl Iterator for DatasetIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(batch) = self.rx.as_ref()?.recv().ok() {
            return Some(batch);
        }
        self.rx = None;
        match self.handle.take()?.join() {
            Ok(()) => None,
            Err(_) => {
                error!("dataset prefetch thread panicked");
                Some(Err(Error::Pipeline("prefetch thread panicked".to_string())))
            }
        }
    }
}

impl Drop for DatasetIter {
    fn drop(&mut self) {
        // stop augmenting, then disconnect so a blocked producer returns
        self.stop.store(true, Ordering::Relaxed);
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
