use ndarray::{Array3, Array4};
use volume_prep::AugmentConfig;

/// Augmentation ranges that collapse every draw to zero, leaving only the
/// one-pixel centre zoom.
pub fn identity_augment() -> AugmentConfig {
    AugmentConfig {
        rotation: (0.0, 0.0),
        shift: (0.0, 0.0),
        shear: (0.0, 0.0),
        zoom: (0.0, 0.0),
    }
}

/// `n` constant images whose value encodes the sample index in 8-bit steps,
/// paired with all-ones labels.
pub fn tagged_samples(n: usize, size: usize) -> (Array4<f32>, Array4<f32>) {
    let x = Array4::from_shape_fn((n, size, size, 1), |(i, _, _, _)| (i as f32 + 0.5) / 255.0);
    let y = Array4::from_elem((n, size, size, 1), 1.0);
    (x, y)
}

/// Sample index recovered from an augmented tagged image.
pub fn tag_of(image: &ndarray::ArrayView3<f32>) -> usize {
    (image[[0, 0, 0]] * 255.0).round() as usize
}

/// A blob on a gradient, with a matching disc label.
pub fn phantom(size: usize) -> (Array3<f32>, Array3<f32>) {
    let center = size as f32 / 2.0;
    let radius = size as f32 / 4.0;
    let inside = |r: usize, c: usize| {
        let (dy, dx) = (r as f32 - center, c as f32 - center);
        dy * dy + dx * dx < radius * radius
    };
    let x = Array3::from_shape_fn((size, size, 1), |(r, c, _)| {
        let base = 0.3 * c as f32 / size as f32;
        if inside(r, c) { base + 0.6 } else { base }
    });
    let y = Array3::from_shape_fn((size, size, 1), |(r, c, _)| {
        if inside(r, c) { 1.0 } else { 0.0 }
    });
    (x, y)
}
