//! Homogeneous scale transform written as the affine of every saved volume.

use nalgebra::Matrix4;

use crate::spatial::VoxelSize;

/// 4x4 homogeneous matrix with the voxel size in millimetres on the diagonal.
pub fn scale_transform(voxel_size: &VoxelSize) -> Matrix4<f64> {
    Matrix4::new_nonuniform_scaling(&voxel_size.to_mm())
}

/// The first three rows of an affine, as NIfTI `srow_x/y/z`.
pub fn affine_rows(affine: &Matrix4<f64>) -> [[f32; 4]; 3] {
    let mut rows = [[0.0f32; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = affine[(r, c)] as f32;
        }
    }
    rows
}
