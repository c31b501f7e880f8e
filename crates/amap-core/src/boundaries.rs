//! Boundary image between segmented regions.

use ndarray::Array3;

/// Value written for boundary voxels.
pub const BOUNDARY_VALUE: u16 = u16::MAX;

/// Mark the inner boundary of every labelled region.
///
/// A voxel is a boundary voxel if it is labelled (non-zero) and at least one
/// of its six face neighbours inside the grid carries a different label.
/// Background voxels are never marked.
pub fn inner_boundaries(labels: &Array3<u32>) -> Array3<bool> {
    let (nx, ny, nz) = labels.dim();
    Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
        let label = labels[[x, y, z]];
        if label == 0 {
            return false;
        }
        let differs = |xx: usize, yy: usize, zz: usize| labels[[xx, yy, zz]] != label;
        (x > 0 && differs(x - 1, y, z))
            || (x + 1 < nx && differs(x + 1, y, z))
            || (y > 0 && differs(x, y - 1, z))
            || (y + 1 < ny && differs(x, y + 1, z))
            || (z > 0 && differs(x, y, z - 1))
            || (z + 1 < nz && differs(x, y, z + 1))
    })
}

/// Boundary image scaled to the full 16 bit range.
pub fn boundary_image(labels: &Array3<u32>) -> Array3<u16> {
    inner_boundaries(labels).mapv(|b| if b { BOUNDARY_VALUE } else { 0 })
}
