//! # volume-prep library
//!
//! This crate serves preprocessing, augmentation and format conversion
//! utilities for volumetric medical images that feed a machine-learning
//! pipeline.
//!
//! Scans are read from NIfTI (`.nii`, `.nii.gz`), GIPL (`.gipl`), NRRD
//! (`.nrrd`) and PNG files together with their headers, so that processed
//! data can be written back with the original geometry. Around that the
//! crate offers:
//!  - Intensity normalization, contrast adjustment and 2D resizing
//!  - Deconstruction of a volume into PNG slices and reconstruction of a
//!    volume from processed slices
//!  - Geometric augmentation (rotation, shift, shear, zoom) applied
//!    identically to an image and its label
//!  - A batched, shuffled dataset that augments samples in parallel with
//!    rayon and prefetches batches on a background thread
//!
//! Volumes are indexed `(x, y, z)` as stored in the files; slices are taken
//! along the last axis unless an [`Orientation`] says otherwise.
//!
//! # Examples
//!
//! ## Splitting a scan into slices and putting it back together
//!
//! ```no_run
//! # use volume_prep::VolumeLoader;
//! let volume = VolumeLoader::load_from_file("scans/case_01.nii.gz")?;
//! volume.deconstruct("case_01.nii.gz", "slices", 512, 512)?;
//!
//! // ... process the PNG slices ...
//!
//! let rebuilt = VolumeLoader::reconstruct_like("case_01", "slices", &volume)?;
//! let data = rebuilt.data.view().into_dyn();
//! volume_prep::save_file("case_01_rebuilt.nii.gz", data, rebuilt.header())?;
//! # Ok::<(), volume_prep::Error>(())
//! ```
//!
//! ## Training batches
//!
//! ```no_run
//! # use volume_prep::create_dataset;
//! # use ndarray::Array4;
//! let images = Array4::<f32>::zeros((32, 256, 256, 1));
//! let labels = Array4::<f32>::zeros((32, 256, 256, 1));
//! let dataset = create_dataset(images, labels, 4)?;
//! for batch in dataset.iter()? {
//!     let batch = batch?;
//!     println!("{} samples", batch.len());
//! }
//! # Ok::<(), volume_prep::Error>(())
//! ```

pub mod augmentation;
pub mod dataset;
pub mod enums;
pub mod error;
mod interpolator;
pub mod io;
pub mod preprocess;
pub mod volume;
pub mod volume_loader;

pub use augmentation::{AugmentConfig, AugmentParams, augment, augment_heat_map};
pub use dataset::{AugmentedDataset, Batch, DatasetConfig, create_dataset};
pub use enums::{Format, Interpolation, Orientation};
pub use error::{Error, Result};
pub use io::{Header, read_file, save_file};
pub use preprocess::{adjust_contrast, normalize, prepare_sample, resize_2d};
pub use volume::Volume;
pub use volume_loader::VolumeLoader;
