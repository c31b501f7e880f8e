//! Axis operations on 3D arrays and the sample volume type.

use ndarray::{Array3, Axis};

use crate::orientation::AxisFlips;
use crate::spatial::VoxelSize;

/// Reorder axes so that axis `i` of the result is axis `axes[i]` of the input.
pub fn transpose<T: Clone>(data: Array3<T>, axes: [usize; 3]) -> Array3<T> {
    standardize(data.permuted_axes(axes))
}

/// Exchange two axes.
pub fn swap_axes<T: Clone>(mut data: Array3<T>, a: usize, b: usize) -> Array3<T> {
    data.swap_axes(a, b);
    standardize(data)
}

/// Reverse every axis flagged in `flips`.
pub fn flip<T: Clone>(mut data: Array3<T>, flips: AxisFlips) -> Array3<T> {
    if !flips.any() {
        return data;
    }
    for axis in flips.axes() {
        data.invert_axis(Axis(axis));
    }
    standardize(data)
}

/// Copy into row-major layout if the array is a strided view of its buffer.
fn standardize<T: Clone>(data: Array3<T>) -> Array3<T> {
    if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().into_owned()
    }
}

/// The sample brain after loading and axis normalization.
///
/// `data` is indexed `[x, y, z]`. `pixel_size` is the spacing the sample was
/// acquired at, `scale` the per-axis factor applied while loading to bring it
/// onto the atlas grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleVolume {
    pub data: Array3<f32>,
    pub pixel_size: VoxelSize,
    pub scale: [f64; 3],
}

impl SampleVolume {
    pub fn new(data: Array3<f32>, pixel_size: VoxelSize, scale: [f64; 3]) -> Self {
        Self {
            data,
            pixel_size,
            scale,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    /// Intensities as unsigned 16 bit, saturating at the type bounds.
    pub fn to_u16(&self) -> Array3<u16> {
        self.data.mapv(|v| v as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: (usize, usize, usize)) -> Array3<u32> {
        let n = shape.0 * shape.1 * shape.2;
        Array3::from_shape_vec(shape, (0..n as u32).collect()).unwrap()
    }

    #[test]
    fn test_transpose_shape_and_values() {
        let data = ramp((2, 3, 4));
        let t = transpose(data.clone(), [2, 0, 1]);
        assert_eq!(t.shape(), &[4, 2, 3]);
        assert_eq!(t[[3, 1, 2]], data[[1, 2, 3]]);
        assert!(t.is_standard_layout());
    }

    #[test]
    fn test_flip_reverses_axis() {
        let data = ramp((2, 3, 4));
        let f = flip(data.clone(), AxisFlips::new(false, true, false));
        assert_eq!(f[[0, 0, 0]], data[[0, 2, 0]]);
        assert_eq!(flip(f, AxisFlips::new(false, true, false)), data);
    }

    #[test]
    fn test_to_u16_saturates() {
        let data = Array3::from_shape_vec((1, 1, 3), vec![-5.0, 12.7, 70000.0]).unwrap();
        let sample = SampleVolume::new(data, VoxelSize::uniform(1.0), [1.0; 3]);
        assert_eq!(sample.to_u16().iter().copied().collect::<Vec<_>>(), vec![0, 12, 65535]);
    }
}
