//! Geometric augmentation of `(H, W, C)` training images and their labels.
//!
//! One draw of [`AugmentParams`] is applied to an image and its label so
//! that both stay aligned: rotation, two shifts, shear and a centre zoom, in
//! that order. Every layer works channel by channel and fills uncovered
//! pixels with zero.

use crate::error::{Error, Result};
use crate::interpolator::Interpolator;
use crate::preprocess::{binarize, quantize_u8};

use ndarray::{Array3, ArrayBase, Axis, Data, Ix3, Slice, Zip, s};
use rand::Rng;

/// Threshold applied to labels after interpolation.
pub const LABEL_CUTOFF: f32 = 0.5;

/// Ranges the random augmentation parameters are drawn from, as half-open
/// intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentConfig {
    /// Rotation in degrees.
    pub rotation: (f32, f32),
    /// Shift in pixels, used for both spatial axes.
    pub shift: (f32, f32),
    /// Shear angle in radians.
    pub shear: (f32, f32),
    /// Pixels cropped from each border before zooming back, minus one.
    pub zoom: (f32, f32),
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            rotation: (0.0, 360.0),
            shift: (-30.0, 30.0),
            shear: (-0.2, 0.2),
            zoom: (0.0, 15.0),
        }
    }
}

/// One draw of augmentation parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentParams {
    pub rotation: i32,
    pub shift0: i32,
    pub shift1: i32,
    pub shear: f32,
    pub zoom: usize,
}

impl AugmentParams {
    /// Draw parameters uniformly from `config`. Integer parameters are
    /// truncated towards zero.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, config: &AugmentConfig) -> Self {
        Self {
            rotation: uniform(rng, config.rotation) as i32,
            shift0: uniform(rng, config.shift) as i32,
            shift1: uniform(rng, config.shift) as i32,
            shear: uniform(rng, config.shear),
            zoom: uniform(rng, config.zoom).max(0.0) as usize,
        }
    }
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, (low, high): (f32, f32)) -> f32 {
    if high > low { rng.random_range(low..high) } else { low }
}

/// Resample every channel through an inverse map from output `(row, col)`
/// to input `(row, col)`, bilinear with zero outside the image.
fn warp<S, F>(img: &ArrayBase<S, Ix3>, inverse_map: F) -> Array3<f32>
where
    S: Data<Elem = f32>,
    F: Fn(f32, f32) -> (f32, f32) + Sync,
{
    let view = img.view();
    let mut out = Array3::<f32>::zeros(img.raw_dim());
    Zip::indexed(&mut out).par_for_each(|(row, col, channel), value| {
        let (y, x) = inverse_map(row as f32, col as f32);
        let plane = view.index_axis(Axis(2), channel);
        *value = Interpolator::bilinear_constant(&plane, y, x, 0.0);
    });
    out
}

/// Rotate counter-clockwise by `angle` degrees about the image centre,
/// keeping the image size.
pub fn rotate<S>(img: &ArrayBase<S, Ix3>, angle: f32) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    let (height, width, _) = img.dim();
    let center_x = width as f32 / 2.0 - 0.5;
    let center_y = height as f32 / 2.0 - 0.5;
    let (sin, cos) = angle.to_radians().sin_cos();

    warp(img, |row, col| {
        let dx = col - center_x;
        let dy = row - center_y;
        let x = cos * dx - sin * dy + center_x;
        let y = sin * dx + cos * dy + center_y;
        (y, x)
    })
}

/// Translate by `k` pixels along spatial `axis` (0 or 1). Pixels shifted in
/// from outside are zero.
pub fn shift<S>(img: &ArrayBase<S, Ix3>, k: i32, axis: usize) -> Result<Array3<f32>>
where
    S: Data<Elem = f32>,
{
    if axis > 1 {
        return Err(Error::invalid_parameter("axis", format!("expected 0 or 1, got {axis}")));
    }
    let axis = Axis(axis);
    let len = img.len_of(axis) as isize;
    let k = k as isize;

    let mut out = Array3::<f32>::zeros(img.raw_dim());
    if k.abs() >= len {
        return Ok(out);
    }
    if k >= 0 {
        out.slice_axis_mut(axis, Slice::from(k..))
            .assign(&img.slice_axis(axis, Slice::from(..len - k)));
    } else {
        out.slice_axis_mut(axis, Slice::from(..len + k))
            .assign(&img.slice_axis(axis, Slice::from(-k..)));
    }
    Ok(out)
}

/// Shear by angle `k` (radians): the input of output pixel `(x, y)` is
/// `(x - sin(k) y, cos(k) y)`.
pub fn shear<S>(img: &ArrayBase<S, Ix3>, k: f32) -> Array3<f32>
where
    S: Data<Elem = f32>,
{
    let (sin, cos) = k.sin_cos();
    warp(img, |row, col| (cos * row, col - sin * row))
}

/// Crop `k` pixels from every spatial border and stretch the centre back to
/// the original size.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] when the crop leaves nothing.
pub fn center_zoom<S>(img: &ArrayBase<S, Ix3>, k: usize) -> Result<Array3<f32>>
where
    S: Data<Elem = f32>,
{
    let (height, width, _) = img.dim();
    if 2 * k >= height || 2 * k >= width {
        return Err(Error::invalid_parameter(
            "zoom",
            format!("cannot crop {k} pixels from each side of a {height}x{width} image"),
        ));
    }

    let crop = img.slice(s![k..height - k, k..width - k, ..]);
    let (crop_height, crop_width, _) = crop.dim();
    let mut out = Array3::<f32>::zeros(img.raw_dim());
    Zip::indexed(&mut out).par_for_each(|(row, col, channel), value| {
        let y = Interpolator::resize_coordinate(row, crop_height, height);
        let x = Interpolator::resize_coordinate(col, crop_width, width);
        let y = Interpolator::mirror(y, crop_height);
        let x = Interpolator::mirror(x, crop_width);
        *value = Interpolator::bilinear_interpolate(&crop.index_axis(Axis(2), channel), y, x);
    });
    Ok(out)
}

/// Apply every layer with `params`. Labels are binarized at
/// [`LABEL_CUTOFF`], images are quantized to 8-bit steps.
pub fn augment_layers<S>(
    img: &ArrayBase<S, Ix3>,
    params: &AugmentParams,
    is_label: bool,
) -> Result<Array3<f32>>
where
    S: Data<Elem = f32>,
{
    let x = rotate(img, params.rotation as f32);
    let x = shift(&x, params.shift0, 0)?;
    let x = shift(&x, params.shift1, 1)?;
    let x = shear(&x, params.shear);
    // +1 keeps a zero draw from producing an empty crop
    let x = center_zoom(&x, params.zoom + 1)?;

    if is_label {
        Ok(binarize(&x, LABEL_CUTOFF))
    } else {
        Ok(quantize_u8(&x))
    }
}

/// Augment an image and its label with the same random parameters.
pub fn augment<R, S, T>(
    x: &ArrayBase<S, Ix3>,
    y: &ArrayBase<T, Ix3>,
    rng: &mut R,
    config: &AugmentConfig,
) -> Result<(Array3<f32>, Array3<f32>)>
where
    R: Rng + ?Sized,
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
{
    let params = AugmentParams::sample(rng, config);
    let x = augment_layers(x, &params, false)?;
    let y = augment_layers(y, &params, true)?;
    Ok((x, y))
}

/// Augment a label map on its own.
pub fn augment_heat_map<R, S>(
    y: &ArrayBase<S, Ix3>,
    rng: &mut R,
    config: &AugmentConfig,
) -> Result<Array3<f32>>
where
    R: Rng + ?Sized,
    S: Data<Elem = f32>,
{
    let params = AugmentParams::sample(rng, config);
    augment_layers(y, &params, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn image(h: usize, w: usize) -> Array3<f32> {
        Array3::from_shape_fn((h, w, 1), |(r, c, _)| (r * w + c) as f32 / (h * w) as f32)
    }

    fn square_mask(size: usize) -> Array3<f32> {
        let mut mask = Array3::<f32>::zeros((size, size, 1));
        let quarter = size / 4;
        mask.slice_mut(s![quarter..size - quarter, quarter..size - quarter, ..])
            .fill(1.0);
        mask
    }

    #[test]
    fn sampled_params_respect_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        let config = AugmentConfig::default();
        for _ in 0..200 {
            let p = AugmentParams::sample(&mut rng, &config);
            assert!((0..360).contains(&p.rotation));
            assert!((-29..=29).contains(&p.shift0));
            assert!((-29..=29).contains(&p.shift1));
            assert!((-0.2..0.2).contains(&p.shear));
            assert!(p.zoom < 15);
        }
    }

    #[test]
    fn shift_zero_fills_vacated_pixels() {
        let img = image(4, 3);
        let down = shift(&img, 1, 0).unwrap();
        assert_eq!(down.slice(s![0, .., 0]).sum(), 0.0);
        assert_eq!(down[[1, 2, 0]], img[[0, 2, 0]]);

        let left = shift(&img, -2, 1).unwrap();
        assert_eq!(left[[3, 0, 0]], img[[3, 2, 0]]);
        assert_eq!(left.slice(s![.., 1.., 0]).sum(), 0.0);

        assert_eq!(shift(&img, 10, 1).unwrap().sum(), 0.0);
        assert!(shift(&img, 1, 2).is_err());
    }

    #[test]
    fn zero_rotation_and_shear_are_identities() {
        let img = image(5, 7);
        assert_eq!(rotate(&img, 0.0), img);
        assert_eq!(shear(&img, 0.0), img);
    }

    #[test]
    fn quarter_turn_is_counter_clockwise() {
        let mut img = Array3::<f32>::zeros((3, 3, 1));
        img[[0, 1, 0]] = 1.0;
        let turned = rotate(&img, 90.0);
        assert!((turned[[1, 0, 0]] - 1.0).abs() < 1e-4);
        assert!(turned[[0, 1, 0]].abs() < 1e-4);
    }

    #[test]
    fn shear_moves_lower_rows_sideways() {
        let img = Array3::from_shape_fn((10, 10, 1), |(_, c, _)| c as f32);
        let sheared = shear(&img, 0.1);
        let sin = 0.1f32.sin();
        // row 5 samples x - 5 sin(k), inside the image for x >= 1
        assert!((sheared[[5, 5, 0]] - (5.0 - 5.0 * sin)).abs() < 1e-3);
        assert_eq!(sheared[[0, 3, 0]], 3.0);
    }

    #[test]
    fn center_zoom_keeps_shape_and_magnifies() {
        let img = image(8, 8);
        let zoomed = center_zoom(&img, 2).unwrap();
        assert_eq!(zoomed.dim(), img.dim());
        let (lo, hi) = zoomed.fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        assert!(lo >= img[[2, 2, 0]] - 1e-6);
        assert!(hi <= img[[5, 5, 0]] + 1e-6);
        assert!(center_zoom(&img, 4).is_err());
    }

    #[test]
    fn labels_stay_binary_and_images_quantized() {
        let mut rng = StdRng::seed_from_u64(11);
        let x = image(64, 64);
        let y = square_mask(64);
        let (ax, ay) = augment(&x, &y, &mut rng, &AugmentConfig::default()).unwrap();

        assert_eq!(ax.dim(), x.dim());
        assert!(ay.iter().all(|&v| v == 0.0 || v == 1.0));
        assert!(ax.iter().all(|&v| ((v * 255.0).round() - v * 255.0).abs() < 1e-3));
    }

    #[test]
    fn same_seed_same_augmentation() {
        let x = image(32, 32);
        let y = square_mask(32);
        let config = AugmentConfig::default();
        let first = augment(&x, &y, &mut StdRng::seed_from_u64(3), &config).unwrap();
        let second = augment(&x, &y, &mut StdRng::seed_from_u64(3), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn image_and_label_share_geometry() {
        let mask = square_mask(32);
        let params = AugmentParams {
            rotation: 30,
            shift0: 5,
            shift1: -3,
            shear: 0.1,
            zoom: 2,
        };
        let image = augment_layers(&mask, &params, false).unwrap();
        let label = augment_layers(&mask, &params, true).unwrap();
        // quantization only blurs the decision within one 8-bit step of the cutoff
        let disagree = Zip::from(&image).and(&label).fold(0usize, |n, &i, &l| {
            let bright = i >= 128.0 / 255.0 - 1e-6;
            let dark = i <= 126.0 / 255.0 + 1e-6;
            n + usize::from((bright && l != 1.0) || (dark && l != 0.0))
        });
        assert_eq!(disagree, 0);
        assert!(label.sum() > 0.0);
    }

    #[test]
    fn heat_map_augmentation_is_binary() {
        let mut rng = StdRng::seed_from_u64(5);
        let heat = Array2::from_shape_fn((40, 40), |(r, c)| ((r + c) % 7) as f32 / 6.0)
            .insert_axis(Axis(2));
        let out = augment_heat_map(&heat, &mut rng, &AugmentConfig::default()).unwrap();
        assert!(out.iter().all(|&v| v == 0.0 || v == 1.0));
    }
}
