//! Error types for the data layer.

use glam::UVec3;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Brick-grid shape exceeds the pointer encoding capacity.
    #[error("brick grid of {n_bricks} bricks exceeds maximum of {max} per axis")]
    CapacityExceeded { n_bricks: UVec3, max: u32 },

    /// Invalid input data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
