use crate::enums::{Interpolation, Orientation};
use crate::error::Result;
use crate::interpolator::Interpolator;
use crate::io::{self, Header, png};
use crate::preprocess::resize_2d;

use image::GrayImage;
use log::{debug, info};
use ndarray::{Array3, ArrayView2, Axis};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Side length of the PNG slices written by [`Volume::deconstruct`] by default.
pub const DEFAULT_SLICE_SIZE: usize = 512;

/// A 3D scan indexed `(x, y, z)` with the header it was loaded with.
#[derive(Debug, Clone, Default)]
pub struct Volume {
    pub data: Array3<f32>,
    pub header: Option<Header>,
}

impl Volume {
    pub fn new(data: Array3<f32>, header: Option<Header>) -> Self {
        Self { data, header }
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// Get a mutable reference to the underlying data
    pub fn data_mut(&mut self) -> &mut Array3<f32> {
        &mut self.data
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Voxel size along `(x, y, z)`. Axes the header does not describe, or
    /// describes with a non-positive size, count as 1.
    pub fn spacing(&self) -> (f32, f32, f32) {
        let spacing = self.header.as_ref().and_then(Header::spacing).unwrap_or_default();
        let axis = |i: usize| {
            spacing
                .get(i)
                .copied()
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(1.0)
        };
        (axis(0), axis(1), axis(2))
    }

    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: &Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        Some(self.data.index_axis(Axis(orientation.axis()), index))
    }

    // (rows, columns) of a slice resampled to isotropic voxels
    fn get_output_dimensions(&self, orientation: &Orientation) -> (usize, usize) {
        let (x, y, z) = Interpolator::get_isotropic_dimensions(self.spacing(), self.dim());
        match orientation {
            Orientation::Sagittal => (y, z),
            Orientation::Coronal => (x, z),
            Orientation::Axial => (x, y),
        }
    }

    /// Render a slice as an 8-bit grey image, stretched to the full range.
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
    ) -> Option<GrayImage> {
        let slice = self.get_slice_from_axis(index, &orientation)?;

        match interpolation {
            Interpolation::None => png::gray_image(slice.into_dyn()),
            Interpolation::Linear => {
                let (rows, columns) = self.get_output_dimensions(&orientation);
                let resampled = resize_2d(&slice, rows, columns).ok()?;
                png::gray_image(resampled.view().into_dyn())
            }
        }
    }

    /// Write every slice along the z axis as `<outdir>/<stem>_<z>.png`,
    /// resized to `desired_width x desired_height`. `stem` is the file name of
    /// `filename` up to its first dot.
    pub fn deconstruct(
        &self,
        filename: impl AsRef<Path>,
        outdir: impl AsRef<Path>,
        desired_width: usize,
        desired_height: usize,
    ) -> Result<Vec<PathBuf>> {
        let stem = slice_stem(filename.as_ref());
        let outdir = outdir.as_ref();
        let depth = self.dim().2;
        info!("Writing {depth} slices of {stem} to {}", outdir.display());

        (0..depth)
            .into_par_iter()
            .map(|z| -> Result<PathBuf> {
                let slice = self.data.index_axis(Axis(2), z);
                let resized = resize_2d(&slice, desired_width, desired_height)?;
                let out = outdir.join(format!("{stem}_{z}.png"));
                debug!("slice {z} -> {}", out.display());
                io::save_any(&out, resized.view().into_dyn(), None)?;
                Ok(out)
            })
            .collect()
    }

    fn is_valid_index(&self, index: usize, orientation: &Orientation) -> bool {
        index < self.data.len_of(Axis(orientation.axis()))
    }
}

/// File name up to the first dot: `case_01.nii.gz` becomes `case_01`.
pub fn slice_stem(filename: &Path) -> String {
    let name = filename
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}
