//! Error types for atlas geometry and filtering.

use thiserror::Error;

/// Errors raised by the pure geometry and filter layer.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Orientation tag not recognised.
    #[error("Unknown orientation '{0}', expected one of: horizontal, coronal, sagittal")]
    UnknownOrientation(String),

    /// The atlas declares a native orientation that is not supported.
    #[error("Unsupported atlas orientation '{0}', only horizontal atlases are supported")]
    UnsupportedAtlasOrientation(String),

    /// Volumes that must share a grid do not.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Error in the intensity filter chain.
    #[error("Filter error: {0}")]
    FilterError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a filter error.
    pub fn filter(msg: impl Into<String>) -> Self {
        Self::FilterError(msg.into())
    }

    /// Create a shape mismatch error from two grid shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
