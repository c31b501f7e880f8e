//! Geometry and image primitives for registering a reference atlas onto a
//! sample brain.
//!
//! Everything in this crate is pure: no filesystem access and no process
//! spawning. Reading and writing volumes lives in `amap-io`, orchestration
//! lives in `amap-registration`.

pub mod atlas;
pub mod boundaries;
pub mod error;
pub mod filter;
pub mod orientation;
pub mod spatial;
pub mod structures;
pub mod transform;
pub mod volume;

pub use atlas::{AtlasConfig, AtlasElement, AtlasVolumeSet};
pub use error::{CoreError, Result};
pub use orientation::{AxisFlips, Orientation};
pub use spatial::VoxelSize;
pub use structures::{Hemisphere, Structure, StructureVolume, Structures};
pub use volume::SampleVolume;
