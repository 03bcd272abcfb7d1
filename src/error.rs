//! Error types for volume-prep.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported file format: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to read NIfTI file {path}: {source}")]
    Nifti {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },

    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Malformed or unsupported header of a GIPL or NRRD file.
    #[error("invalid header in {path}: {reason}")]
    Header { path: PathBuf, reason: String },

    #[error("invalid shape: expected {expected}, got {actual}")]
    InvalidShape { expected: String, actual: String },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("slice {index} of {path} is outside a volume with {depth} slices")]
    SliceIndexOutOfRange {
        path: PathBuf,
        index: usize,
        depth: usize,
    },

    /// The prefetch thread of a dataset stopped unexpectedly.
    #[error("dataset pipeline failed: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {
    pub(crate) fn header(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::Header {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
