//! Atlas configuration and the co-registered atlas volume set.

use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::orientation::{invert_permutation, AxisFlips, Orientation};
use crate::spatial::VoxelSize;
use crate::volume;

/// The only native atlas orientation the pipeline knows how to reorient from.
pub const SUPPORTED_ATLAS_ORIENTATION: Orientation = Orientation::Horizontal;

/// The files that make up an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtlasElement {
    /// Label volume, one structure id per voxel.
    Annotation,
    /// Average reference brain used as the registration template.
    Brain,
    /// Hemisphere label volume.
    Hemispheres,
    /// Structure hierarchy table.
    Structures,
}

impl AtlasElement {
    /// Elements that are volumes, in load order.
    pub const VOLUMES: [AtlasElement; 3] = [
        AtlasElement::Annotation,
        AtlasElement::Brain,
        AtlasElement::Hemispheres,
    ];
}

/// `[atlas]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtlasConfig {
    pub base_folder: PathBuf,
    #[serde(rename = "atlas_name")]
    pub annotation_name: String,
    pub brain_name: String,
    pub hemispheres_name: String,
    pub structures_name: String,
    pub left_hemisphere_value: u32,
    pub right_hemisphere_value: u32,
    pub orientation: String,
    pub pixel_size: VoxelSize,
}

impl AtlasConfig {
    /// Parse and check the native orientation tag.
    pub fn native_orientation(&self) -> Result<Orientation> {
        let orientation: Orientation = self
            .orientation
            .parse()
            .map_err(|_| CoreError::UnsupportedAtlasOrientation(self.orientation.clone()))?;
        if orientation != SUPPORTED_ATLAS_ORIENTATION {
            return Err(CoreError::UnsupportedAtlasOrientation(self.orientation.clone()));
        }
        Ok(orientation)
    }

    /// Base folder with a leading `~` expanded against `$HOME`.
    pub fn base_folder(&self) -> PathBuf {
        expand_home(&self.base_folder)
    }

    pub fn file_name(&self, element: AtlasElement) -> &str {
        match element {
            AtlasElement::Annotation => &self.annotation_name,
            AtlasElement::Brain => &self.brain_name,
            AtlasElement::Hemispheres => &self.hemispheres_name,
            AtlasElement::Structures => &self.structures_name,
        }
    }

    /// Location of an element inside the installed atlas.
    pub fn element_path(&self, element: AtlasElement) -> PathBuf {
        self.base_folder().join(self.file_name(element))
    }

    /// Location of an element's working copy inside `destination`.
    pub fn destination_path(&self, destination: &Path, element: AtlasElement) -> PathBuf {
        destination.join(self.file_name(element))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

/// Annotation, reference brain and hemisphere volumes, always on one grid.
///
/// Every geometric operation consumes the set and returns it, so the three
/// volumes can only ever be transformed together.
#[derive(Debug, Clone, PartialEq)]
pub struct AtlasVolumeSet {
    annotation: Array3<u32>,
    brain: Array3<f32>,
    hemispheres: Array3<u32>,
    voxel_size: VoxelSize,
}

impl AtlasVolumeSet {
    /// Group three volumes, failing if their shapes differ.
    pub fn new(
        annotation: Array3<u32>,
        brain: Array3<f32>,
        hemispheres: Array3<u32>,
        voxel_size: VoxelSize,
    ) -> Result<Self> {
        let expected = annotation.shape();
        for actual in [brain.shape(), hemispheres.shape()] {
            if actual != expected {
                return Err(CoreError::shape_mismatch(expected, actual));
            }
        }
        Ok(Self {
            annotation,
            brain,
            hemispheres,
            voxel_size,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.annotation.shape();
        [s[0], s[1], s[2]]
    }

    pub fn annotation(&self) -> &Array3<u32> {
        &self.annotation
    }

    pub fn brain(&self) -> &Array3<f32> {
        &self.brain
    }

    pub fn hemispheres(&self) -> &Array3<u32> {
        &self.hemispheres
    }

    pub fn voxel_size(&self) -> &VoxelSize {
        &self.voxel_size
    }

    /// Reorder the axes of all three volumes.
    pub fn transposed(self, axes: [usize; 3]) -> Self {
        Self {
            annotation: volume::transpose(self.annotation, axes),
            brain: volume::transpose(self.brain, axes),
            hemispheres: volume::transpose(self.hemispheres, axes),
            voxel_size: self.voxel_size.permuted(axes),
        }
    }

    /// Exchange axes 0 and 1 of all three volumes.
    pub fn rows_columns_swapped(self) -> Self {
        Self {
            annotation: volume::swap_axes(self.annotation, 0, 1),
            brain: volume::swap_axes(self.brain, 0, 1),
            hemispheres: volume::swap_axes(self.hemispheres, 0, 1),
            voxel_size: self.voxel_size.permuted([1, 0, 2]),
        }
    }

    /// Reverse the flagged axes of all three volumes.
    pub fn flipped(self, flips: AxisFlips) -> Self {
        Self {
            annotation: volume::flip(self.annotation, flips),
            brain: volume::flip(self.brain, flips),
            hemispheres: volume::flip(self.hemispheres, flips),
            voxel_size: self.voxel_size,
        }
    }

    /// Bring a horizontal atlas into the sample's orientation.
    ///
    /// The permutation is followed by a row/column swap because the
    /// permutation table is expressed in the loader's row-major convention.
    pub fn reoriented_to_sample(self, orientation: Orientation) -> Self {
        tracing::debug!(%orientation, "reorienting atlas volumes to sample");
        self.transposed(orientation.atlas_transposition())
            .rows_columns_swapped()
    }

    /// Undo [`reoriented_to_sample`](Self::reoriented_to_sample).
    pub fn restored_from_sample(self, orientation: Orientation) -> Self {
        self.rows_columns_swapped()
            .transposed(invert_permutation(orientation.atlas_transposition()))
    }

    pub fn into_parts(self) -> (Array3<u32>, Array3<f32>, Array3<u32>, VoxelSize) {
        (self.annotation, self.brain, self.hemispheres, self.voxel_size)
    }
}
