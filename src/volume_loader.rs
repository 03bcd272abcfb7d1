use crate::enums::Format;
use crate::error::{Error, Result};
use crate::io;
use crate::preprocess::resize_2d;
use crate::volume::Volume;

use log::{debug, info, warn};
use ndarray::{Array2, Array3, ArrayD, Axis, Ix2, Ix3};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from any supported file.
    ///
    /// Trailing axes of length 1 beyond the third are dropped and a 2D image
    /// becomes a volume with a single slice.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not hold 3D data.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Volume> {
        let (data, header) = io::read_file(path)?;
        let data = Self::into_volume_array(data)?;
        Ok(Volume::new(data, header))
    }

    fn into_volume_array(mut data: ArrayD<f32>) -> Result<Array3<f32>> {
        while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
            let last = data.ndim() - 1;
            data = data.index_axis_move(Axis(last), 0);
        }
        if data.ndim() == 2 {
            data.insert_axis_inplace(Axis(2));
        }

        let shape = data.shape().to_vec();
        data.into_dimensionality::<Ix3>().map_err(|_| Error::InvalidShape {
            expected: "a 3D volume".to_string(),
            actual: format!("{shape:?}"),
        })
    }

    /// Rebuild a volume of `shape` from the slices `<filename>_<z>.<ext>` in
    /// `dir`. Each slice is resized to the in-plane shape and stored at
    /// `[:, :, z]`; slices that are not on disk stay zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SliceIndexOutOfRange`] when a slice number does not
    /// fit in `shape`, and IO or format errors from reading the slices.
    pub fn reconstruct(
        filename: &str,
        dir: impl AsRef<Path>,
        shape: (usize, usize, usize),
    ) -> Result<Array3<f32>> {
        let dir = dir.as_ref();
        let slices = Self::slice_files(dir, filename)?;
        if slices.is_empty() {
            warn!("no slices named {filename}_<n> in {}", dir.display());
        }
        info!("Reconstructing {} from {} slices", filename, slices.len());

        if let Some((index, path)) = slices.iter().find(|(index, _)| *index >= shape.2) {
            return Err(Error::SliceIndexOutOfRange {
                path: path.clone(),
                index: *index,
                depth: shape.2,
            });
        }

        let decoded: Vec<(usize, Array2<f32>)> = slices
            .par_iter()
            .map(|(index, path)| -> Result<(usize, Array2<f32>)> {
                debug!("slice {index} <- {}", path.display());
                let (data, _) = io::read_any(path)?;
                let slice = Self::first_channel(data)?;
                Ok((*index, resize_2d(&slice, shape.0, shape.1)?))
            })
            .collect::<Result<_>>()?;

        let mut volume = Array3::<f32>::zeros(shape);
        for (index, slice) in decoded {
            volume.index_axis_mut(Axis(2), index).assign(&slice);
        }
        Ok(volume)
    }

    /// [`VolumeLoader::reconstruct`] with the shape and header of `original`.
    pub fn reconstruct_like(
        filename: &str,
        dir: impl AsRef<Path>,
        original: &Volume,
    ) -> Result<Volume> {
        let data = Self::reconstruct(filename, dir, original.dim())?;
        Ok(Volume::new(data, original.header.clone()))
    }

    // (slice number, path) of every readable slice file, ordered by number
    fn slice_files(dir: &Path, filename: &str) -> Result<Vec<(usize, PathBuf)>> {
        let mut slices: Vec<_> = fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| Format::from_path(path).is_some())
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                let index = slice_number(name, filename)?;
                Some((index, path))
            })
            .collect();

        slices.sort_by_key(|(index, _)| *index);
        Ok(slices)
    }

    fn first_channel(data: ArrayD<f32>) -> Result<Array2<f32>> {
        let data = if data.ndim() == 3 {
            data.index_axis_move(Axis(2), 0)
        } else {
            data
        };
        let shape = data.shape().to_vec();
        data.into_dimensionality::<Ix2>().map_err(|_| Error::InvalidShape {
            expected: "a 2D slice".to_string(),
            actual: format!("{shape:?}"),
        })
    }
}

/// Slice number of `<filename>_<n>.<ext>`, `None` for any other name.
pub fn slice_number(name: &str, filename: &str) -> Option<usize> {
    let rest = name.strip_prefix(filename)?.strip_prefix('_')?;
    let (number, _) = rest.split_once('.')?;
    number.parse().ok()
}
