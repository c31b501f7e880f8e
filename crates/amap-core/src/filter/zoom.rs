//! Volume resampling by per-axis zoom factors.

use ndarray::{Array3, Axis, Zip};

/// Output length of an axis of `len` voxels zoomed by `factor`.
///
/// Empty axes stay empty.
pub fn zoomed_len(len: usize, factor: f64) -> usize {
    if len == 0 {
        return 0;
    }
    ((len as f64 * factor).round() as usize).max(1)
}

/// Linear resampling of a volume by per-axis factors.
///
/// The first and last voxel of each axis map onto each other, so a factor
/// of one leaves the volume untouched.
pub fn zoom(volume: &Array3<f32>, factors: [f64; 3]) -> Array3<f32> {
    let mut current = volume.to_owned();
    for (axis, factor) in factors.iter().enumerate() {
        let len = current.len_of(Axis(axis));
        let out_len = zoomed_len(len, *factor);
        if out_len != len {
            current = resample_axis(&current, axis, out_len);
        }
    }
    current
}

fn resample_axis(volume: &Array3<f32>, axis: usize, out_len: usize) -> Array3<f32> {
    let in_len = volume.len_of(Axis(axis));
    let mut shape = volume.raw_dim();
    shape[axis] = out_len;
    let mut out = Array3::<f32>::zeros(shape);
    if in_len == 0 {
        return out;
    }

    let step = if out_len > 1 {
        (in_len.saturating_sub(1)) as f64 / (out_len - 1) as f64
    } else {
        0.0
    };

    Zip::from(out.lanes_mut(Axis(axis)))
        .and(volume.lanes(Axis(axis)))
        .for_each(|mut dst, src| {
            for (i, value) in dst.iter_mut().enumerate() {
                let position = i as f64 * step;
                let lower = (position.floor() as usize).min(in_len - 1);
                let upper = (lower + 1).min(in_len - 1);
                let t = (position - lower as f64) as f32;
                *value = src[lower] * (1.0 - t) + src[upper] * t;
            }
        });
    out
}

/// Nearest-neighbour resampling of a (label) volume to an exact shape.
///
/// Axes that are empty in the source stay empty.
pub fn resample_nearest<T: Copy>(volume: &Array3<T>, shape: [usize; 3]) -> Array3<T> {
    let src = volume.shape();
    let shape: [usize; 3] =
        std::array::from_fn(|axis| if src[axis] == 0 { 0 } else { shape[axis] });
    let index = |out: usize, axis: usize| -> usize {
        if shape[axis] <= 1 || src[axis] <= 1 {
            return 0;
        }
        let position = out as f64 * (src[axis] - 1) as f64 / (shape[axis] - 1) as f64;
        (position.round() as usize).min(src[axis] - 1)
    };
    Array3::from_shape_fn((shape[0], shape[1], shape[2]), |(x, y, z)| {
        volume[[index(x, 0), index(y, 1), index(z, 2)]]
    })
}
