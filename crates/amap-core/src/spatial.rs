//! Voxel size in micrometres.
//!
//! Configuration and the command line speak micrometres; NIfTI headers and
//! the engine speak millimetres. `VoxelSize` stores micrometres and converts
//! on demand.

use nalgebra::Vector3;
use serde::Deserialize;

/// Physical size of one voxel along x, y and z, in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "AxisTriple")]
pub struct VoxelSize(pub Vector3<f64>);

#[derive(Deserialize)]
struct AxisTriple {
    x: f64,
    y: f64,
    z: f64,
}

impl From<AxisTriple> for VoxelSize {
    fn from(t: AxisTriple) -> Self {
        Self::new(t.x, t.y, t.z)
    }
}

impl VoxelSize {
    /// Create a voxel size from per-axis micrometre values.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self(Vector3::new(x, y, z))
    }

    /// Same size along every axis.
    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value)
    }

    /// Build from millimetre values (as stored in NIfTI pixdim), rounding
    /// to three decimals of a micrometre.
    pub fn from_mm(x: f64, y: f64, z: f64) -> Self {
        Self::new(
            round_to(x * 1000.0, 3),
            round_to(y * 1000.0, 3),
            round_to(z * 1000.0, 3),
        )
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    /// Components as an array in axis order.
    pub fn to_array(&self) -> [f64; 3] {
        [self.0.x, self.0.y, self.0.z]
    }

    /// Voxel size in millimetres.
    pub fn to_mm(&self) -> Vector3<f64> {
        self.0 / 1000.0
    }

    /// Volume of one voxel in mm³.
    pub fn voxel_volume_mm3(&self) -> f64 {
        let mm = self.to_mm();
        mm.x * mm.y * mm.z
    }

    /// True when every component is zero, i.e. the header carried no spacing.
    pub fn is_degenerate(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// True when every component is finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|v| v.is_finite() && *v > 0.0)
    }

    /// Per-axis ratio `self / reference`, rounded to `decimals` places.
    pub fn scale_relative_to(&self, reference: &VoxelSize, decimals: u32) -> [f64; 3] {
        let mut scale = [0.0; 3];
        for (i, s) in scale.iter_mut().enumerate() {
            *s = round_to(self.0[i] / reference.0[i], decimals);
        }
        scale
    }

    /// Reorder components so that axis `i` of the result is axis `axes[i]` of `self`.
    pub fn permuted(&self, axes: [usize; 3]) -> Self {
        Self::new(self.0[axes[0]], self.0[axes[1]], self.0[axes[2]])
    }
}

/// Round half away from zero to a fixed number of decimals.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
