//! Volumetric grid representations for the volgrid data layer.
//!
//! Scalar 3D density fields enter through the [`Grid`] contract and are
//! re-represented in compact, lookup-friendly forms:
//! - [`DenseGrid`]: full-resolution 8-bit voxels over one global range
//! - [`BrickGrid`]: 8x8x8 bricks behind an indirection table, quantized
//!   per brick over a dilated local range, with a min/max mipmap pyramid
//!   for empty-space skipping
//!
//! [`convert`] moves between representations without ever downcasting on
//! the caller's side.

pub mod brick;
pub mod convert;
pub mod dense;
pub mod grid;
pub mod pack;

pub use brick::{BrickGrid, BRICK_BITS, BRICK_SIZE, BRICK_VOXELS, DILATION, MIPMAP_LEVELS};
pub use convert::{convert, to_brick_grid, to_dense_grid, GridFormat};
pub use dense::DenseGrid;
pub use grid::Grid;
pub use pack::{BITS_PER_AXIS, MAX_BRICKS_PER_AXIS};
pub use volgrid_core::{Error, Result, Vol3};
