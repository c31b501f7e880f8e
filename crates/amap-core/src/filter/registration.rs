use burn::tensor::backend::Backend;
use ndarray::Array3;

use super::intensity::scale_to_u16;
use super::{planes_to_tensor, tensor_to_planes, GaussianFilter, Opening};
use crate::error::{CoreError, Result};

/// Filter chain that prepares a downsampled sample for registration.
///
/// Every z-plane is despeckled with a grey-level opening, then flattened by
/// dividing by its own Gaussian-smoothed copy (plus one), and the volume is
/// finally rescaled to the full 16-bit range.
pub struct RegistrationFilter<B: Backend> {
    device: B::Device,
    despeckle_radius: usize,
    flatfield_sigma: f64,
}

impl<B: Backend> RegistrationFilter<B> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            despeckle_radius: 2,
            flatfield_sigma: 5.0,
        }
    }

    pub fn with_despeckle_radius(mut self, radius: usize) -> Self {
        self.despeckle_radius = radius;
        self
    }

    pub fn with_flatfield_sigma(mut self, sigma: f64) -> Self {
        self.flatfield_sigma = sigma;
        self
    }

    pub fn apply(&self, volume: &Array3<f32>) -> Result<Array3<u16>> {
        if volume.is_empty() {
            return Err(CoreError::filter("Cannot filter an empty volume"));
        }
        tracing::debug!(
            shape = ?volume.shape(),
            radius = self.despeckle_radius,
            sigma = self.flatfield_sigma,
            "Filtering sample for registration"
        );

        let planes = planes_to_tensor::<B>(volume, &self.device);
        let despeckled = Opening::<B>::new(self.despeckle_radius).apply(planes);
        let background = GaussianFilter::<B>::new(self.flatfield_sigma).apply(despeckled.clone());
        let flattened = despeckled.div(background.add_scalar(1.0));

        let filtered = tensor_to_planes(flattened)?;
        Ok(scale_to_u16(&filtered))
    }
}
