//! Engine parameters and their command line rendering.

use std::fmt;

use serde::Deserialize;

use crate::error::Result;
use crate::validation;

/// Knobs of the affine, freeform and resampling engine stages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrationParameters {
    /// Pyramid levels built for the affine stage.
    pub affine_n_steps: u32,
    /// Pyramid levels actually used by the affine stage.
    pub affine_use_n_steps: u32,
    pub freeform_n_steps: u32,
    pub freeform_use_n_steps: u32,
    /// Weight of the bending energy penalty.
    pub bending_energy_weight: f64,
    /// Control point spacing along x; negative means voxels.
    pub grid_spacing: i32,
    /// Smoothing of the reference image; negative means voxels.
    pub smoothing_sigma_reference: f64,
    /// Smoothing of the floating image; negative means voxels.
    pub smoothing_sigma_floating: f64,
    pub histogram_n_bins_reference: u32,
    pub histogram_n_bins_floating: u32,
    /// Resampling order used to carry labels onto the sample.
    pub segmentation_interpolation: u32,
}

impl Default for RegistrationParameters {
    fn default() -> Self {
        Self {
            affine_n_steps: 6,
            affine_use_n_steps: 5,
            freeform_n_steps: 6,
            freeform_use_n_steps: 4,
            bending_energy_weight: 0.95,
            grid_spacing: -10,
            smoothing_sigma_reference: -1.0,
            smoothing_sigma_floating: -1.0,
            histogram_n_bins_reference: 128,
            histogram_n_bins_floating: 128,
            segmentation_interpolation: 0,
        }
    }
}

impl RegistrationParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_affine_steps(mut self, total: u32, used: u32) -> Self {
        self.affine_n_steps = total;
        self.affine_use_n_steps = used;
        self
    }

    pub fn with_freeform_steps(mut self, total: u32, used: u32) -> Self {
        self.freeform_n_steps = total;
        self.freeform_use_n_steps = used;
        self
    }

    pub fn with_bending_energy_weight(mut self, weight: f64) -> Self {
        self.bending_energy_weight = weight;
        self
    }

    pub fn with_grid_spacing(mut self, spacing: i32) -> Self {
        self.grid_spacing = spacing;
        self
    }

    pub fn with_smoothing(mut self, reference: f64, floating: f64) -> Self {
        self.smoothing_sigma_reference = reference;
        self.smoothing_sigma_floating = floating;
        self
    }

    pub fn with_histogram_bins(mut self, reference: u32, floating: u32) -> Self {
        self.histogram_n_bins_reference = reference;
        self.histogram_n_bins_floating = floating;
        self
    }

    pub fn with_segmentation_interpolation(mut self, order: u32) -> Self {
        self.segmentation_interpolation = order;
        self
    }

    /// Check every parameter the engine will see.
    pub fn validate(&self) -> Result<()> {
        validation::validate_pyramid_steps("affine", self.affine_n_steps, self.affine_use_n_steps)?;
        validation::validate_pyramid_steps(
            "freeform",
            self.freeform_n_steps,
            self.freeform_use_n_steps,
        )?;
        validation::validate_bending_energy(self.bending_energy_weight)?;
        validation::validate_grid_spacing(self.grid_spacing)?;
        validation::validate_smoothing_sigma("reference", self.smoothing_sigma_reference)?;
        validation::validate_smoothing_sigma("floating", self.smoothing_sigma_floating)?;
        validation::validate_histogram_bins("reference", self.histogram_n_bins_reference)?;
        validation::validate_histogram_bins("floating", self.histogram_n_bins_floating)?;
        validation::validate_interpolation_order(self.segmentation_interpolation)?;
        Ok(())
    }

    /// `-ln <total> -lp <used>`
    pub fn affine_flags(&self) -> Result<EngineFlags> {
        validation::validate_pyramid_steps("affine", self.affine_n_steps, self.affine_use_n_steps)?;
        Ok(EngineFlags::new()
            .with("-ln", self.affine_n_steps)
            .with("-lp", self.affine_use_n_steps))
    }

    /// `-ln -lp -sx -be -smooR -smooF --rbn --fbn`
    pub fn freeform_flags(&self) -> Result<EngineFlags> {
        validation::validate_pyramid_steps(
            "freeform",
            self.freeform_n_steps,
            self.freeform_use_n_steps,
        )?;
        Ok(EngineFlags::new()
            .with("-ln", self.freeform_n_steps)
            .with("-lp", self.freeform_use_n_steps)
            .with("-sx", self.grid_spacing)
            .with("-be", self.bending_energy_weight)
            .with("-smooR", self.smoothing_sigma_reference)
            .with("-smooF", self.smoothing_sigma_floating)
            .with("--rbn", self.histogram_n_bins_reference)
            .with("--fbn", self.histogram_n_bins_floating))
    }

    /// `-inter <order>`
    pub fn segmentation_flags(&self) -> EngineFlags {
        EngineFlags::new().with("-inter", self.segmentation_interpolation)
    }
}

/// Value of one engine flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlagValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Int(v) => write!(f, "{v}"),
            // Whole floats keep one decimal so -0.0 and -1.0 stay floats.
            FlagValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            FlagValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<u32> for FlagValue {
    fn from(v: u32) -> Self {
        FlagValue::Int(v.into())
    }
}

impl From<i32> for FlagValue {
    fn from(v: i32) -> Self {
        FlagValue::Int(v.into())
    }
}

impl From<usize> for FlagValue {
    fn from(v: usize) -> Self {
        FlagValue::Int(v as i64)
    }
}

impl From<f64> for FlagValue {
    fn from(v: f64) -> Self {
        FlagValue::Float(v)
    }
}

/// Ordered engine flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineFlags(Vec<(&'static str, FlagValue)>);

impl EngineFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: &'static str, value: impl Into<FlagValue>) -> Self {
        self.0.push((flag, value.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FlagValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every pair as `"<flag> <value> "`, concatenated.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|(flag, value)| format!("{flag} {value} "))
            .collect()
    }

    /// Flags and values as separate process arguments.
    pub fn to_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(flag, value)| [flag.to_string(), value.to_string()])
            .collect()
    }
}

impl fmt::Display for EngineFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
