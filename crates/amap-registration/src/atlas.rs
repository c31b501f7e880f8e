//! The reference atlas as used by one registration run.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};

use amap_core::transform::scale_transform;
use amap_core::{AtlasConfig, AtlasElement, AtlasVolumeSet, AxisFlips, Orientation, Structures, VoxelSize};
use amap_io::{read_structures, read_volume, read_voxel_size, write_volume};
use nalgebra::Matrix4;
use ndarray::Array3;

use crate::error::{RegistrationError, Result};

/// Atlas configuration plus, once loaded, its volumes.
///
/// Geometry changes apply to annotation, reference brain and hemispheres
/// together.
#[derive(Debug)]
pub struct AtlasModel {
    config: AtlasConfig,
    native_orientation: Orientation,
    destination: Option<PathBuf>,
    volumes: Option<AtlasVolumeSet>,
    pixel_sizes: OnceCell<VoxelSize>,
}

impl AtlasModel {
    /// Fails when the configured native orientation is not supported.
    pub fn new(config: AtlasConfig) -> Result<Self> {
        let native_orientation = config.native_orientation()?;
        Ok(Self {
            config,
            native_orientation,
            destination: None,
            volumes: None,
            pixel_sizes: OnceCell::new(),
        })
    }

    /// Directory the atlas copies are persisted to.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn native_orientation(&self) -> Orientation {
        self.native_orientation
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    fn existing_path(&self, element: AtlasElement) -> Result<PathBuf> {
        let path = self.config.element_path(element);
        if !path.exists() {
            return Err(RegistrationError::MissingAtlasFile(path));
        }
        Ok(path)
    }

    /// Read annotation, reference brain and hemispheres from the atlas folder.
    pub fn load(&mut self) -> Result<()> {
        let annotation_path = self.existing_path(AtlasElement::Annotation)?;
        let brain_path = self.existing_path(AtlasElement::Brain)?;
        let hemispheres_path = self.existing_path(AtlasElement::Hemispheres)?;

        tracing::info!(folder = %self.config.base_folder().display(), "Loading atlas");
        let annotation: Array3<u32> = read_volume(&annotation_path)?;
        let brain: Array3<f32> = read_volume(&brain_path)?;
        let hemispheres: Array3<u32> = read_volume(&hemispheres_path)?;

        let voxel_size = self.pixel_sizes()?;
        self.volumes = Some(AtlasVolumeSet::new(annotation, brain, hemispheres, voxel_size)?);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.volumes.is_some()
    }

    /// Native voxel size in µm.
    ///
    /// Taken from the annotation header when it records a spacing, from the
    /// configuration otherwise. Evaluated once.
    pub fn pixel_sizes(&self) -> Result<VoxelSize> {
        if let Some(size) = self.pixel_sizes.get() {
            return Ok(*size);
        }
        let annotation = self.existing_path(AtlasElement::Annotation)?;
        let size = match read_voxel_size(&annotation)? {
            Some(size) => size,
            None => {
                tracing::debug!("Annotation header has no spacing, using configured pixel size");
                self.config.pixel_size
            }
        };
        Ok(*self.pixel_sizes.get_or_init(|| size))
    }

    /// Homogeneous scale matrix of the native voxel size in mm.
    pub fn scale_transform(&self) -> Result<Matrix4<f64>> {
        Ok(scale_transform(&self.pixel_sizes()?))
    }

    pub fn volumes(&self) -> Result<&AtlasVolumeSet> {
        self.volumes.as_ref().ok_or(RegistrationError::AtlasNotLoaded)
    }

    fn update(&mut self, f: impl FnOnce(AtlasVolumeSet) -> AtlasVolumeSet) -> Result<()> {
        let volumes = self.volumes.take().ok_or(RegistrationError::AtlasNotLoaded)?;
        self.volumes = Some(f(volumes));
        Ok(())
    }

    /// Bring the atlas into a sample acquired in `orientation`.
    pub fn reorient_to_sample(&mut self, orientation: Orientation) -> Result<()> {
        self.update(|v| v.reoriented_to_sample(orientation))
    }

    /// Undo [`reorient_to_sample`](Self::reorient_to_sample).
    pub fn restore_from_sample(&mut self, orientation: Orientation) -> Result<()> {
        self.update(|v| v.restored_from_sample(orientation))
    }

    pub fn flip(&mut self, flips: AxisFlips) -> Result<()> {
        if !flips.any() {
            return Ok(());
        }
        tracing::debug!(?flips, "Flipping atlas");
        self.update(|v| v.flipped(flips))
    }

    /// Write the three volumes under their configured names in the
    /// destination directory. Returns the written paths.
    ///
    /// The copies carry the native voxel size and scale transform whatever
    /// the current orientation, as the downsampled sample does.
    pub fn persist(&self) -> Result<Vec<PathBuf>> {
        let destination = self
            .destination
            .as_deref()
            .ok_or(RegistrationError::DestinationUndefined)?;
        let volumes = self.volumes()?;
        let voxel_size = &self.pixel_sizes()?;
        let affine = self.scale_transform()?;

        let annotation = self.config.destination_path(destination, AtlasElement::Annotation);
        let brain = self.config.destination_path(destination, AtlasElement::Brain);
        let hemispheres = self.config.destination_path(destination, AtlasElement::Hemispheres);
        write_volume(&annotation, volumes.annotation(), voxel_size, &affine)?;
        write_volume(&brain, volumes.brain(), voxel_size, &affine)?;
        write_volume(&hemispheres, volumes.hemispheres(), voxel_size, &affine)?;
        tracing::info!(destination = %destination.display(), "Saved atlas copies");
        Ok(vec![annotation, brain, hemispheres])
    }

    /// Structure hierarchy shipped with the atlas.
    pub fn structures(&self) -> Result<Structures> {
        let path = self.existing_path(AtlasElement::Structures)?;
        Ok(read_structures(path)?)
    }

    pub fn left_hemisphere_value(&self) -> u32 {
        self.config.left_hemisphere_value
    }

    pub fn right_hemisphere_value(&self) -> u32 {
        self.config.right_hemisphere_value
    }
}
