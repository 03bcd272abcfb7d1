//! Intensity normalization, contrast adjustment and 2D resizing.

use crate::error::{Error, Result};
use crate::interpolator::Interpolator;
use crate::io;

use ndarray::{Array, Array2, ArrayBase, ArrayD, Data, Dimension, Ix2, Zip};
use std::path::Path;

/// Threshold separating background from foreground in 8-bit label images.
pub const LABEL_THRESHOLD: f32 = 127.5;

pub const HISTOGRAM_BINS: usize = 256;

/// Smallest and largest value of an array, `None` when it is empty.
pub fn min_max<S, D>(input: &ArrayBase<S, D>) -> Option<(f32, f32)>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    if input.is_empty() {
        return None;
    }
    Some(input.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    }))
}

/// Rescale intensities from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Missing input bounds default to the array minimum and maximum. Values
/// outside the input range are clipped first. With a degenerate input range
/// every value collapses to `in_min`, clipped to the output range.
pub fn normalize<S, D>(
    input: &ArrayBase<S, D>,
    in_min: Option<f32>,
    in_max: Option<f32>,
    out_min: f32,
    out_max: f32,
) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let Some((data_min, data_max)) = min_max(input) else {
        return input.to_owned();
    };
    let in_min = in_min.unwrap_or(data_min);
    let in_max = in_max.unwrap_or(data_max);

    if in_min == in_max {
        return input.mapv(|v| v.max(in_min).min(in_max).max(out_min).min(out_max));
    }

    input.mapv(|v| {
        let unit = (v.max(in_min).min(in_max) - in_min) / (in_max - in_min);
        unit * (out_max - out_min) + out_min
    })
}

/// Value below which `p` percent of `values` fall, interpolating linearly
/// between the closest ranks.
pub fn percentile(values: &[f32], p: f32) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f32;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Histogram equalization onto `[0, 1]`: every value is replaced by the
/// cumulative distribution of the image, interpolated at the bin centres.
pub fn equalize_hist<S, D>(input: &ArrayBase<S, D>, nbins: usize) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let Some((min, max)) = min_max(input) else {
        return input.to_owned();
    };
    let nbins = nbins.max(1);
    let (lo, hi) = if min == max {
        (f64::from(min) - 0.5, f64::from(max) + 0.5)
    } else {
        (f64::from(min), f64::from(max))
    };
    let width = (hi - lo) / nbins as f64;

    let mut histogram = vec![0u64; nbins];
    for &v in input.iter() {
        let bin = (((f64::from(v) - lo) / width) as usize).min(nbins - 1);
        histogram[bin] += 1;
    }

    let total = input.len() as f64;
    let cdf: Vec<f64> = histogram
        .iter()
        .scan(0u64, |acc, &count| {
            *acc += count;
            Some(*acc as f64 / total)
        })
        .collect();
    let first_center = lo + 0.5 * width;
    let last_center = lo + (nbins as f64 - 0.5) * width;

    input.mapv(|v| {
        let v = f64::from(v);
        if v <= first_center {
            return cdf[0] as f32;
        }
        if v >= last_center {
            return cdf[nbins - 1] as f32;
        }
        let position = (v - first_center) / width;
        let i = (position.floor() as usize).min(nbins - 2);
        let fraction = position - i as f64;
        (cdf[i] + (cdf[i + 1] - cdf[i]) * fraction) as f32
    })
}

/// Stretch contrast between the `pmin` and `pmax` percentiles of the
/// non-zero voxels, equalize the histogram and map the result onto
/// `[out_min, out_max]` (the input range by default).
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when the percentiles are outside
/// `0..=100` or `pmin > pmax`.
pub fn adjust_contrast<S, D>(
    input: &ArrayBase<S, D>,
    out_min: Option<f32>,
    out_max: Option<f32>,
    pmin: f32,
    pmax: f32,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    if !(0.0..=100.0).contains(&pmin) || !(0.0..=100.0).contains(&pmax) || pmin > pmax {
        return Err(Error::invalid_parameter(
            "percentiles",
            format!("expected 0 <= pmin <= pmax <= 100, got {pmin} and {pmax}"),
        ));
    }

    let Some((data_min, data_max)) = min_max(input) else {
        return Ok(input.to_owned());
    };
    let out_min = out_min.unwrap_or(data_min);
    let out_max = out_max.unwrap_or(data_max);

    let foreground: Vec<f32> = input.iter().copied().filter(|&v| v != 0.0).collect();
    let (Some(val_min), Some(val_max)) = (
        percentile(&foreground, pmin),
        percentile(&foreground, pmax),
    ) else {
        return Ok(input.to_owned());
    };

    let stretched = normalize(input, Some(val_min), Some(val_max), out_min, out_max);
    let equalized = equalize_hist(&stretched, HISTOGRAM_BINS);
    Ok(normalize(&equalized, None, None, out_min, out_max))
}

/// Bilinear resize of a 2D image to `desired_width` samples along axis 0 and
/// `desired_height` along axis 1. The corner samples of input and output
/// coincide.
///
/// # Errors
///
/// Returns an error for an empty image or a zero target size.
pub fn resize_2d<S>(
    img: &ArrayBase<S, Ix2>,
    desired_width: usize,
    desired_height: usize,
) -> Result<Array2<f32>>
where
    S: Data<Elem = f32>,
{
    if desired_width == 0 || desired_height == 0 {
        return Err(Error::invalid_parameter(
            "size",
            format!("target size must be positive, got {desired_width}x{desired_height}"),
        ));
    }
    let (current_width, current_height) = img.dim();
    if current_width == 0 || current_height == 0 {
        return Err(Error::InvalidShape {
            expected: "a non-empty 2D image".to_string(),
            actual: format!("{:?}", img.shape()),
        });
    }
    if (current_width, current_height) == (desired_width, desired_height) {
        return Ok(img.to_owned());
    }

    let view = img.view();
    let mut out = Array2::<f32>::zeros((desired_width, desired_height));
    Zip::indexed(&mut out).par_for_each(|(i, j), value| {
        let src_i = Interpolator::zoom_coordinate(i, current_width, desired_width);
        let src_j = Interpolator::zoom_coordinate(j, current_height, desired_height);
        *value = Interpolator::bilinear_interpolate(&view, src_i, src_j);
    });
    Ok(out)
}

/// Min-max scale onto `[0, 1]` when the maximum is positive. Constant
/// positive images become zero.
pub fn scale_to_unit<S, D>(input: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    match min_max(input) {
        Some((min, max)) if max > 0.0 && max > min => input.mapv(|v| (v - min) / (max - min)),
        Some((_, max)) if max > 0.0 => input.mapv(|_| 0.0),
        _ => input.to_owned(),
    }
}

/// Round-trip values in `[0, 1]` through 8-bit storage: `floor(255 x) / 255`.
pub fn quantize_u8<S, D>(input: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    input.mapv(|v| (255.0 * v).clamp(0.0, 255.0).floor() / 255.0)
}

/// `0` below `threshold`, `1` otherwise.
pub fn binarize<S, D>(input: &ArrayBase<S, D>, threshold: f32) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    input.mapv(|v| if v < threshold { 0.0 } else { 1.0 })
}

/// Load a training sample. Inputs are scaled to `[0, 1]` and quantized to
/// 8-bit steps; labels are binarized at [`LABEL_THRESHOLD`].
pub fn prepare_sample(path: impl AsRef<Path>, label: bool) -> Result<ArrayD<f32>> {
    let (data, _) = io::read_any(path.as_ref())?;
    if label {
        Ok(binarize(&data, LABEL_THRESHOLD))
    } else {
        Ok(quantize_u8(&scale_to_unit(&data)))
    }
}
