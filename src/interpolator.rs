use ndarray::ArrayView2;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Dimensions of a volume resampled to the finest of its voxel spacings.
    /// Both `spacing` and `original_dim` are ordered `(x, y, z)`.
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f32, f32, f32),
        original_dim: (usize, usize, usize),
    ) -> (usize, usize, usize) {
        let (x_spacing, y_spacing, z_spacing) = spacing;
        let min_spacing = x_spacing.min(y_spacing).min(z_spacing);
        if min_spacing.is_nan() || min_spacing <= 0.0 {
            return original_dim;
        }
        let inv_min_spacing = 1.0 / min_spacing;

        let new_x = (original_dim.0 as f32 * x_spacing * inv_min_spacing).round() as usize;
        let new_y = (original_dim.1 as f32 * y_spacing * inv_min_spacing).round() as usize;
        let new_z = (original_dim.2 as f32 * z_spacing * inv_min_spacing).round() as usize;

        (new_x.max(1), new_y.max(1), new_z.max(1))
    }

    /// Source coordinate of output index `dst` for a corner-aligned zoom,
    /// where the first and last samples of both grids coincide.
    #[inline]
    pub(crate) fn zoom_coordinate(dst: usize, in_len: usize, out_len: usize) -> f32 {
        if out_len > 1 {
            dst as f32 * (in_len as f32 - 1.0) / (out_len as f32 - 1.0)
        } else {
            0.0
        }
    }

    /// Source coordinate of output index `dst` for a resize treating samples
    /// as pixel centres.
    #[inline]
    pub(crate) fn resize_coordinate(dst: usize, in_len: usize, out_len: usize) -> f32 {
        (dst as f32 + 0.5) * in_len as f32 / out_len as f32 - 0.5
    }

    /// Reflect a coordinate into `[0, len - 1]` without repeating the edge sample.
    #[inline]
    pub(crate) fn mirror(coord: f32, len: usize) -> f32 {
        if len <= 1 {
            return 0.0;
        }
        let period = 2.0 * (len as f32 - 1.0);
        let folded = coord.abs() % period;
        if folded > len as f32 - 1.0 {
            period - folded
        } else {
            folded
        }
    }

    /// Bilinear sample at `(y, x)`, which must lie inside the slice.
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = (y.floor().max(0.0) as usize).min(height - 1);
        let x0 = (x.floor().max(0.0) as usize).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = (y - y0 as f32).clamp(0.0, 1.0);
        let dx = (x - x0 as f32).clamp(0.0, 1.0);
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }

    /// Bilinear sample at `(y, x)` where neighbours outside the slice read as `cval`.
    #[inline]
    pub(crate) fn bilinear_constant(slice: &ArrayView2<f32>, y: f32, x: f32, cval: f32) -> f32 {
        let (height, width) = slice.dim();
        let pixel = |r: f32, c: f32| -> f32 {
            if r < 0.0 || c < 0.0 || r >= height as f32 || c >= width as f32 {
                cval
            } else {
                slice[[r as usize, c as usize]]
            }
        };

        let (min_r, max_r) = (y.floor(), y.ceil());
        let (min_c, max_c) = (x.floor(), x.ceil());
        let dy = y - min_r;
        let dx = x - min_c;

        let top = (1.0 - dx) * pixel(min_r, min_c) + dx * pixel(min_r, max_c);
        let bottom = (1.0 - dx) * pixel(max_r, min_c) + dx * pixel(max_r, max_c);
        (1.0 - dy) * top + dy * bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bilinear_hits_grid_points_and_midpoints() {
        let slice = array![[0.0f32, 10.0], [20.0, 30.0]];
        let view = slice.view();
        assert_eq!(Interpolator::bilinear_interpolate(&view, 0.0, 0.0), 0.0);
        assert_eq!(Interpolator::bilinear_interpolate(&view, 1.0, 1.0), 30.0);
        assert!((Interpolator::bilinear_interpolate(&view, 0.5, 0.5) - 15.0).abs() < 1e-5);
    }

    #[test]
    fn constant_sampling_blends_with_cval_at_the_border() {
        let slice = array![[4.0f32, 4.0], [4.0, 4.0]];
        let view = slice.view();
        assert_eq!(Interpolator::bilinear_constant(&view, 0.0, 1.0, 0.0), 4.0);
        assert!((Interpolator::bilinear_constant(&view, 0.0, 1.5, 0.0) - 2.0).abs() < 1e-5);
        assert_eq!(Interpolator::bilinear_constant(&view, -3.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn mirror_reflects_without_repeating_edges() {
        assert_eq!(Interpolator::mirror(-0.25, 4), 0.25);
        assert_eq!(Interpolator::mirror(3.5, 4), 2.5);
        assert_eq!(Interpolator::mirror(1.0, 4), 1.0);
        assert_eq!(Interpolator::mirror(7.0, 1), 0.0);
    }

    #[test]
    fn isotropic_dimensions_follow_finest_spacing() {
        let dims = Interpolator::get_isotropic_dimensions((0.5, 0.5, 2.0), (10, 10, 4));
        assert_eq!(dims, (10, 10, 16));
    }
}
