//! NIfTI-1 volume reading and writing.

use std::path::Path;

use amap_core::transform::affine_rows;
use amap_core::VoxelSize;
use anyhow::{Context, Result};
use nalgebra::Matrix4;
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

mod sealed {
    pub trait Sealed {}
}

/// Voxel types the pipeline stores in NIfTI files.
pub trait NiftiElement: sealed::Sealed + Copy + Send + Sync + 'static {
    #[doc(hidden)]
    fn read_dynamic(path: &Path) -> Result<ArrayD<Self>>;
    #[doc(hidden)]
    fn write_with_header(path: &Path, data: &Array3<Self>, header: &NiftiHeader) -> Result<()>;
}

macro_rules! nifti_element {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl NiftiElement for $t {
            fn read_dynamic(path: &Path) -> Result<ArrayD<Self>> {
                let object = ReaderOptions::new()
                    .read_file(path)
                    .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
                object
                    .into_volume()
                    .into_ndarray::<$t>()
                    .with_context(|| format!("Failed to decode voxels of {}", path.display()))
            }

            fn write_with_header(path: &Path, data: &Array3<Self>, header: &NiftiHeader) -> Result<()> {
                WriterOptions::new(path)
                    .reference_header(header)
                    .write_nifti(data)
                    .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
            }
        }
    )*};
}

nifti_element!(u8, u16, u32, f32, f64);

/// Read a 3D volume indexed `[x, y, z]`.
///
/// A 4D file with a single volume along the fourth axis is accepted.
pub fn read_volume<T: NiftiElement>(path: impl AsRef<Path>) -> Result<Array3<T>> {
    let path = path.as_ref();
    let mut data = T::read_dynamic(path)?;
    if data.ndim() == 4 && data.shape()[3] == 1 {
        data = data.index_axis_move(Axis(3), 0);
    }
    if data.ndim() != 3 {
        anyhow::bail!(
            "Expected a 3D volume in {}, found {} dimensions",
            path.display(),
            data.ndim()
        );
    }
    let volume = data
        .into_dimensionality::<Ix3>()
        .context("Failed to view volume as 3D")?;
    Ok(volume.as_standard_layout().into_owned())
}

/// Voxel size recorded in the header, in micrometres.
///
/// Returns `None` when the header carries no spacing (all zero).
pub fn read_voxel_size(path: impl AsRef<Path>) -> Result<Option<VoxelSize>> {
    let path = path.as_ref();
    let header = NiftiHeader::from_file(path)
        .with_context(|| format!("Failed to read NIfTI header {}", path.display()))?;
    let [x, y, z] = [header.pixdim[1], header.pixdim[2], header.pixdim[3]];
    let size = VoxelSize::from_mm(x as f64, y as f64, z as f64);
    Ok((!size.is_degenerate()).then_some(size))
}

/// Write a 3D volume with `voxel_size` as pixdim and `affine` as sform.
pub fn write_volume<T: NiftiElement>(
    path: impl AsRef<Path>,
    data: &Array3<T>,
    voxel_size: &VoxelSize,
    affine: &Matrix4<f64>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let header = header_for(voxel_size, affine);
    T::write_with_header(path, data, &header)?;
    tracing::debug!(path = %path.display(), shape = ?data.shape(), "Wrote volume");
    Ok(())
}

fn header_for(voxel_size: &VoxelSize, affine: &Matrix4<f64>) -> NiftiHeader {
    let mm = voxel_size.to_mm();
    let [srow_x, srow_y, srow_z] = affine_rows(affine);
    NiftiHeader {
        pixdim: [1.0, mm.x as f32, mm.y as f32, mm.z as f32, 1.0, 1.0, 1.0, 1.0],
        sform_code: 2,
        qform_code: 0,
        srow_x,
        srow_y,
        srow_z,
        // NIFTI_UNITS_MM
        xyzt_units: 2,
        ..NiftiHeader::default()
    }
}
