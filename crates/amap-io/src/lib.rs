//! File formats used by the registration pipeline.
//!
//! Volumes are NIfTI-1, samples are either a NIfTI file or a stack of 2D
//! planes, and structure metadata and results are CSV tables. Errors are
//! `anyhow` with context; callers wrap them into their own error types.

pub mod nifti_io;
pub mod stack;
pub mod structures;
pub mod table;

pub use nifti_io::{read_volume, read_voxel_size, write_volume, NiftiElement};
pub use stack::{available_workers, load_sample, LoadOptions, SampleSource};
pub use structures::read_structures;
pub use table::{read_volumes_table, write_volumes_table};
