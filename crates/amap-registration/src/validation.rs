//! Range checks for engine parameters and run inputs.

use amap_core::VoxelSize;

use crate::error::{RegistrationError, Result};

/// Validate a pyramid: at least one level, and no more levels used than built.
pub fn validate_pyramid_steps(name: &str, total: u32, used: u32) -> Result<()> {
    if total == 0 {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: number of pyramid steps must be positive"
        )));
    }
    if used == 0 {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: number of used pyramid steps must be positive"
        )));
    }
    if used > total {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: used steps {used} exceed total steps {total}"
        )));
    }
    Ok(())
}

/// Validate a joint histogram bin count.
pub fn validate_histogram_bins(name: &str, bins: u32) -> Result<()> {
    if bins < 2 {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: number of bins must be at least 2, got {bins}"
        )));
    }
    if bins > 1024 {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: number of bins too large: {bins}"
        )));
    }
    Ok(())
}

/// Validate the bending energy weight, a fraction of the cost function.
pub fn validate_bending_energy(weight: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&weight) {
        return Err(RegistrationError::invalid_parameter(format!(
            "bending energy weight must be within [0, 1], got {weight}"
        )));
    }
    Ok(())
}

/// Validate a control point spacing; negative values are voxels, positive mm.
pub fn validate_grid_spacing(spacing: i32) -> Result<()> {
    if spacing == 0 {
        return Err(RegistrationError::invalid_parameter(
            "grid spacing must be non-zero",
        ));
    }
    Ok(())
}

/// Validate a smoothing sigma; negative values are voxels, positive mm.
pub fn validate_smoothing_sigma(name: &str, sigma: f64) -> Result<()> {
    if !sigma.is_finite() {
        return Err(RegistrationError::invalid_parameter(format!(
            "{name}: smoothing sigma must be finite"
        )));
    }
    Ok(())
}

/// Interpolation orders the resampler understands.
pub const INTERPOLATION_ORDERS: [u32; 4] = [0, 1, 3, 4];

pub fn validate_interpolation_order(order: u32) -> Result<()> {
    if !INTERPOLATION_ORDERS.contains(&order) {
        return Err(RegistrationError::invalid_parameter(format!(
            "interpolation order must be one of {INTERPOLATION_ORDERS:?}, got {order}"
        )));
    }
    Ok(())
}

/// Validate a voxel size given on the command line or in configuration.
pub fn validate_voxel_size(name: &str, size: &VoxelSize) -> Result<()> {
    if !size.is_valid() {
        return Err(RegistrationError::invalid_configuration(format!(
            "{name} voxel size must be positive, got {:?}",
            size.to_array()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_steps() {
        assert!(validate_pyramid_steps("affine", 6, 5).is_ok());
        assert!(validate_pyramid_steps("affine", 6, 6).is_ok());
        assert!(matches!(
            validate_pyramid_steps("affine", 6, 7),
            Err(RegistrationError::InvalidParameter(_))
        ));
        assert!(validate_pyramid_steps("affine", 0, 0).is_err());
        assert!(validate_pyramid_steps("affine", 3, 0).is_err());
    }

    #[test]
    fn test_histogram_bins() {
        assert!(validate_histogram_bins("reference", 128).is_ok());
        assert!(validate_histogram_bins("reference", 1).is_err());
        assert!(validate_histogram_bins("reference", 2048).is_err());
    }

    #[test]
    fn test_bending_energy() {
        assert!(validate_bending_energy(0.95).is_ok());
        assert!(validate_bending_energy(1.5).is_err());
        assert!(validate_bending_energy(f64::NAN).is_err());
    }

    #[test]
    fn test_interpolation_order() {
        assert!(validate_interpolation_order(0).is_ok());
        assert!(validate_interpolation_order(2).is_err());
    }

    #[test]
    fn test_voxel_size() {
        assert!(validate_voxel_size("sample", &VoxelSize::uniform(10.0)).is_ok());
        assert!(validate_voxel_size("sample", &VoxelSize::new(10.0, 0.0, 5.0)).is_err());
    }
}
