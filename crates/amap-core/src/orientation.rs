//! Anatomical orientation tags and axis flips.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Anatomical plane the sample was imaged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Horizontal,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "horizontal",
            Orientation::Coronal => "coronal",
            Orientation::Sagittal => "sagittal",
        }
    }

    /// Axis permutation that brings a horizontal atlas into this orientation.
    pub fn atlas_transposition(&self) -> [usize; 3] {
        match self {
            Orientation::Horizontal => [1, 0, 2],
            Orientation::Coronal => [2, 0, 1],
            Orientation::Sagittal => [2, 1, 0],
        }
    }

    /// Flips that move the reoriented atlas into the NIfTI convention
    /// (origin at the most ventral, posterior, left voxel).
    pub fn standard_flips(&self) -> AxisFlips {
        match self {
            Orientation::Horizontal | Orientation::Coronal => AxisFlips::new(true, true, false),
            Orientation::Sagittal => AxisFlips::new(false, true, false),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Orientation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" => Ok(Orientation::Horizontal),
            "coronal" => Ok(Orientation::Coronal),
            "sagittal" => Ok(Orientation::Sagittal),
            _ => Err(CoreError::UnknownOrientation(s.to_string())),
        }
    }
}

/// Which of the three spatial axes to reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisFlips(pub [bool; 3]);

impl AxisFlips {
    pub fn new(x: bool, y: bool, z: bool) -> Self {
        Self([x, y, z])
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|f| *f)
    }

    /// Indices of the axes to reverse, in ascending order.
    pub fn axes(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(axis, flip)| flip.then_some(axis))
    }
}

/// Inverse of an axis permutation, so that `p` followed by `invert_permutation(p)` is the identity.
pub fn invert_permutation(axes: [usize; 3]) -> [usize; 3] {
    let mut inverse = [0; 3];
    for (new_pos, &old_pos) in axes.iter().enumerate() {
        inverse[old_pos] = new_pos;
    }
    inverse
}
