use super::read_bytes;
use crate::error::{Error, Result};

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn};
use rayon::prelude::*;
use std::path::Path;

/// Load a PNG as raw sample values: `(H, W)` for grey images and
/// `(H, W, C)` otherwise. 16-bit images keep their full range.
pub fn read(path: &Path) -> Result<ArrayD<f32>> {
    let bytes = read_bytes(path)?;
    let img = image::load_from_memory_with_format(&bytes, ImageFormat::Png).map_err(|source| {
        Error::ImageLoad {
            path: path.to_path_buf(),
            source,
        }
    })?;
    image_to_array(&img)
}

pub(crate) fn image_to_array(img: &DynamicImage) -> Result<ArrayD<f32>> {
    let (width, height) = (img.width() as usize, img.height() as usize);
    let color = img.color();
    let channels = usize::from(color.channel_count());
    let wide = color.bytes_per_pixel() > color.channel_count();

    let samples: Vec<f32> = match (channels, wide) {
        (1, false) => img.to_luma8().into_raw().into_iter().map(f32::from).collect(),
        (1, true) => img.to_luma16().into_raw().into_iter().map(f32::from).collect(),
        (2, false) => img.to_luma_alpha8().into_raw().into_iter().map(f32::from).collect(),
        (2, true) => img.to_luma_alpha16().into_raw().into_iter().map(f32::from).collect(),
        (3, false) => img.to_rgb8().into_raw().into_iter().map(f32::from).collect(),
        (3, true) => img.to_rgb16().into_raw().into_iter().map(f32::from).collect(),
        (_, false) => img.to_rgba8().into_raw().into_iter().map(f32::from).collect(),
        (_, true) => img.to_rgba16().into_raw().into_iter().map(f32::from).collect(),
    };
    let channels = channels.min(4);

    let shape = if channels == 1 {
        IxDyn(&[height, width])
    } else {
        IxDyn(&[height, width, channels])
    };
    Ok(ArrayD::from_shape_vec(shape, samples)?)
}

/// Map values onto `0..=255`: shift the minimum to zero, divide by the new
/// maximum when it is non-zero and truncate.
pub(crate) fn scale_to_u8(values: &[f32]) -> Vec<u8> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().map(|v| v - min).fold(f32::NEG_INFINITY, f32::max);
    let scale = if max != 0.0 && max.is_finite() { 255.0 / max } else { 255.0 };

    values
        .par_iter()
        .map(|&v| ((v - min) * scale).clamp(0.0, 255.0) as u8)
        .collect()
}

pub(crate) fn gray_image(data: ArrayViewD<'_, f32>) -> Option<GrayImage> {
    let (height, width) = (data.shape()[0], data.shape()[1]);
    let values: Vec<f32> = data.iter().copied().collect();
    ImageBuffer::from_raw(width as u32, height as u32, scale_to_u8(&values))
}

/// Save `(H, W)` or `(H, W, C)` data with 1, 3 or 4 channels as an 8-bit PNG.
pub fn write(path: &Path, data: ArrayViewD<'_, f32>) -> Result<()> {
    let data = match data.ndim() {
        2 => data.insert_axis(Axis(2)),
        3 => data,
        _ => {
            return Err(Error::InvalidShape {
                expected: "(H, W) or (H, W, C)".to_string(),
                actual: format!("{:?}", data.shape()),
            });
        }
    };
    let (height, width, channels) = (data.shape()[0], data.shape()[1], data.shape()[2]);
    let values: Vec<f32> = data.iter().copied().collect();
    let pixels = scale_to_u8(&values);
    let (w, h) = (width as u32, height as u32);

    let image = match channels {
        1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
        _ => None,
    }
    .ok_or_else(|| Error::InvalidShape {
        expected: "1, 3 or 4 channels".to_string(),
        actual: format!("{:?}", data.shape()),
    })?;

    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| Error::ImageSave {
            path: path.to_path_buf(),
            source,
        })
}
