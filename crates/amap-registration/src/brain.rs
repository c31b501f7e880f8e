//! Sample loading, downsampling to atlas resolution, and filtering.

use std::path::Path;

use amap_core::filter::RegistrationFilter;
use amap_core::volume::swap_axes;
use amap_core::{AxisFlips, Orientation, SampleVolume, VoxelSize};
use amap_io::{load_sample, write_volume, LoadOptions, SampleSource};
use burn_ndarray::NdArray;
use ndarray::Array3;

use crate::atlas::AtlasModel;
use crate::error::{RegistrationError, Result};
use crate::validation::validate_voxel_size;

type FilterBackend = NdArray<f32>;

/// Decimal places kept in the sample-to-atlas scale factors.
const SCALE_DECIMALS: u32 = 5;

/// Brings a sample onto the atlas grid and the atlas into the sample's
/// orientation.
#[derive(Debug)]
pub struct BrainProcessor {
    atlas: AtlasModel,
    source: SampleSource,
    pixel_size: VoxelSize,
    orientation: Orientation,
    scale: [f64; 3],
    load_options: LoadOptions,
    sample: Option<SampleVolume>,
}

impl BrainProcessor {
    /// `pixel_size` is the sample's voxel size in µm along x, y and z.
    pub fn new(
        atlas: AtlasModel,
        source: SampleSource,
        pixel_size: VoxelSize,
        orientation: Orientation,
    ) -> Result<Self> {
        validate_voxel_size("sample", &pixel_size)?;
        let atlas_size = atlas.pixel_sizes()?;
        let scale = pixel_size.scale_relative_to(&atlas_size, SCALE_DECIMALS);
        tracing::debug!(?scale, "Sample to atlas scale");
        Ok(Self {
            atlas,
            source,
            pixel_size,
            orientation,
            scale,
            load_options: LoadOptions::default(),
            sample: None,
        })
    }

    pub fn with_load_options(mut self, options: LoadOptions) -> Self {
        self.load_options = options;
        self
    }

    pub fn scale(&self) -> [f64; 3] {
        self.scale
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn atlas(&self) -> &AtlasModel {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut AtlasModel {
        &mut self.atlas
    }

    pub fn into_atlas(self) -> AtlasModel {
        self.atlas
    }

    pub fn sample(&self) -> Result<&SampleVolume> {
        self.sample
            .as_ref()
            .ok_or_else(|| RegistrationError::missing_input("sample has not been loaded"))
    }

    /// Load and downsample the sample into `[x, y, z]` order.
    pub fn load(&mut self) -> Result<()> {
        tracing::info!(planes = ?self.source.plane_count(), "Loading sample");
        // The x, y and z factors scale the loader's row, column and plane
        // axes. Rows end up on the second axis after the swap.
        let raw = load_sample(&self.source, self.scale, self.load_options)
            .map_err(|e| RegistrationError::missing_input(format!("{e:#}")))?;
        let data = swap_axes(raw, 0, 1);
        tracing::info!(shape = ?data.shape(), "Sample downsampled to atlas resolution");
        self.sample = Some(SampleVolume::new(data, self.pixel_size, self.scale));
        Ok(())
    }

    /// Despeckled, flat-fielded and rescaled copy of the sample.
    pub fn filter(&self) -> Result<Array3<u16>> {
        let sample = self.sample()?;
        let filter = RegistrationFilter::<FilterBackend>::new(Default::default());
        Ok(filter.apply(&sample.data)?)
    }

    pub fn flip_atlas(&mut self, flips: AxisFlips) -> Result<()> {
        self.atlas.flip(flips)
    }

    /// Reorient the atlas from its native orientation to the sample's.
    pub fn swap_atlas_orientation_to_self(&mut self) -> Result<()> {
        self.atlas.reorient_to_sample(self.orientation)
    }

    /// Save the downsampled sample in the atlas frame.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let sample = self.sample()?;
        self.save_volume(path.as_ref(), &sample.to_u16())
    }

    /// Save a volume on the downsampled sample grid in the atlas frame.
    pub fn save_volume(&self, path: &Path, data: &Array3<u16>) -> Result<()> {
        let atlas_size = self.atlas.pixel_sizes()?;
        let affine = self.atlas.scale_transform()?;
        write_volume(path, data, &atlas_size, &affine)?;
        Ok(())
    }
}
