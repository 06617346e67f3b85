//! Conversion between grid representations.
//!
//! The sole polymorphic entry point of the data layer: a grid that
//! already has the requested representation is returned unchanged with
//! shared ownership, anything else is rebuilt by reading the source
//! through the grid contract.

use std::sync::Arc;

use volgrid_core::Result;

use crate::brick::BrickGrid;
use crate::dense::DenseGrid;
use crate::grid::Grid;

/// The fixed set of conversion targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridFormat {
    Dense,
    Brick,
}

/// Return the grid as a dense grid, converting if necessary (costly).
pub fn to_dense_grid(grid: Arc<dyn Grid>) -> Arc<DenseGrid> {
    match Arc::clone(&grid).into_any().downcast::<DenseGrid>() {
        Ok(dense) => dense,
        Err(_) => Arc::new(DenseGrid::from_grid(grid.as_ref())),
    }
}

/// Return the grid as a brick grid, converting if necessary (costly).
pub fn to_brick_grid(grid: Arc<dyn Grid>) -> Result<Arc<BrickGrid>> {
    match Arc::clone(&grid).into_any().downcast::<BrickGrid>() {
        Ok(brick) => Ok(brick),
        Err(_) => Ok(Arc::new(BrickGrid::from_grid(grid.as_ref())?)),
    }
}

/// Construct (or pass through) the representation named by `format`.
pub fn convert(grid: Arc<dyn Grid>, format: GridFormat) -> Result<Arc<dyn Grid>> {
    match format {
        GridFormat::Dense => Ok(to_dense_grid(grid)),
        GridFormat::Brick => Ok(to_brick_grid(grid)?),
    }
}
