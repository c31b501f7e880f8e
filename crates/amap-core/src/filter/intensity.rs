//! Intensity range conversion.

use ndarray::Array3;

/// Normalise to `0..=65535` by the volume maximum and cast to `u16`.
///
/// An all-zero or all-negative volume maps to zeros.
pub fn scale_to_u16(volume: &Array3<f32>) -> Array3<u16> {
    let max = volume.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() || max <= 0.0 {
        return Array3::zeros(volume.raw_dim());
    }
    let factor = f32::from(u16::MAX) / max;
    volume.mapv(|v| (v * factor) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_to_full_range() {
        let v = Array3::from_shape_vec((1, 1, 3), vec![0.0, 0.5, 2.0]).unwrap();
        let out = scale_to_u16(&v);
        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[0, 0, 1]], 16383);
        assert_eq!(out[[0, 0, 2]], u16::MAX);
    }

    #[test]
    fn test_zero_volume() {
        let v = Array3::<f32>::zeros((2, 2, 2));
        assert!(scale_to_u16(&v).iter().all(|x| *x == 0));
    }
}
