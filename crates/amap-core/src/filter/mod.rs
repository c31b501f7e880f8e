//! Intensity filters applied to the sample before registration.
//!
//! The plane filters run on `burn` tensors shaped `[planes, 1, rows, cols]`
//! so a whole volume is filtered in one pass; resampling helpers work on
//! `ndarray` volumes directly.

pub mod gaussian;
pub mod intensity;
pub mod morphology;
pub mod registration;
pub mod zoom;

pub use gaussian::GaussianFilter;
pub use morphology::Opening;
pub use registration::RegistrationFilter;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use ndarray::Array3;

use crate::error::{CoreError, Result};

/// Lay out an `[x, y, z]` volume as a batch of z-planes `[z, 1, x, y]`.
pub fn planes_to_tensor<B: Backend>(volume: &Array3<f32>, device: &B::Device) -> Tensor<B, 4> {
    let (nx, ny, nz) = volume.dim();
    let data: Vec<f32> = volume.view().permuted_axes([2, 0, 1]).iter().copied().collect();
    Tensor::<B, 4>::from_data(TensorData::new(data, [nz, 1, nx, ny]), device)
}

/// Inverse of [`planes_to_tensor`].
pub fn tensor_to_planes<B: Backend>(tensor: Tensor<B, 4>) -> Result<Array3<f32>> {
    let [nz, _, nx, ny] = tensor.dims();
    let data = tensor
        .into_data()
        .into_vec::<f32>()
        .map_err(|e| CoreError::filter(format!("Failed to read tensor data: {:?}", e)))?;
    let planes = Array3::from_shape_vec((nz, nx, ny), data)
        .map_err(|e| CoreError::filter(format!("Failed to rebuild volume: {}", e)))?;
    Ok(planes.permuted_axes([1, 2, 0]).as_standard_layout().into_owned())
}
