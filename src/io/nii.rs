//! NIfTI-1 volumes through the `nifti` crate.

use crate::error::{Error, Result};

use ndarray::{ArrayD, ArrayViewD};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Load a `.nii` or `.nii.gz` file. Intensities are scaled by the header's
/// `scl_slope` and `scl_inter`.
pub fn read(path: &Path) -> Result<(ArrayD<f32>, NiftiHeader)> {
    let wrap = |source| Error::Nifti {
        path: path.to_path_buf(),
        source,
    };

    let object = ReaderOptions::new().read_file(path).map_err(wrap)?;
    let header = object.header().clone();
    let data = object.into_volume().into_ndarray::<f32>().map_err(wrap)?;
    Ok((data, header))
}

/// Write `data` as a float NIfTI file. The optional header supplies geometry
/// and descriptive fields; dimensions, datatype and scaling follow `data`.
pub fn write(path: &Path, data: ArrayViewD<'_, f32>, header: Option<&NiftiHeader>) -> Result<()> {
    let mut reference = header.cloned().unwrap_or_default();
    reference.scl_slope = 1.0;
    reference.scl_inter = 0.0;

    WriterOptions::new(path)
        .reference_header(&reference)
        .write_nifti(&data)
        .map_err(|source| Error::Nifti {
            path: path.to_path_buf(),
            source,
        })
}
