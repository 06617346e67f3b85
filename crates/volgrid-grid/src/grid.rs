//! The capability contract shared by every volumetric representation.

use std::any::Any;
use std::sync::Arc;

use glam::{Mat4, UVec3, Vec3, Vec4};
use volgrid_core::math::Aabb;

/// A scalar 3D density field addressed on the non-negative integer
/// lattice with origin zero.
///
/// Representations are fully populated at construction and read-only
/// afterwards; `lookup` must be safe for concurrent callers so builders
/// can sample a source from many threads at once.
pub trait Grid: Send + Sync {
    /// Index-space voxel fetch.
    ///
    /// Out-of-bounds coordinates are never fatal. Dense and brick grids
    /// return 0; other representations may return a background value.
    fn lookup(&self, at: UVec3) -> f32;

    /// Global (minorant, majorant) over all addressable voxels, active or
    /// not.
    fn extrema(&self) -> (f32, f32);

    /// Size of the addressable index-space box.
    fn extent(&self) -> UVec3;

    /// Number of active voxels.
    fn active_voxels(&self) -> usize;

    /// Bytes required to store this grid.
    fn memory_usage(&self) -> usize;

    /// Index- to world-space transform (model matrix).
    fn transform(&self) -> Mat4;

    /// Concrete-type access, used by the conversion façade.
    fn as_any(&self) -> &dyn Any;

    /// Concrete-type recovery of a shared grid, used by the conversion
    /// façade.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Whether the grid holds no active voxels.
    fn is_empty(&self) -> bool {
        self.active_voxels() == 0
    }

    /// Transform from index- to world-space.
    fn to_world(&self, index: Vec4) -> Vec4 {
        self.transform() * index
    }

    /// Transform from world- to index-space.
    fn to_index(&self, world: Vec4) -> Vec4 {
        self.transform().inverse() * world
    }

    /// World-space box spanned by the index-space extent.
    fn world_aabb(&self) -> Aabb {
        let min = self.to_world(Vec4::new(0.0, 0.0, 0.0, 1.0));
        let max = self.to_world(self.extent().as_vec3().extend(1.0));
        Aabb::new(min.truncate(), max.truncate())
    }

    /// World-space fetch from the containing index cell.
    fn lookup_world(&self, pos: Vec3) -> f32 {
        let index = self.to_index(pos.extend(1.0)).truncate().floor();
        if index.cmplt(Vec3::ZERO).any() {
            return 0.0;
        }
        self.lookup(index.as_uvec3())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FieldGrid;
    use approx::assert_relative_eq;

    fn scaled_grid() -> FieldGrid {
        let mut grid = FieldGrid::new(UVec3::splat(4), (0.0, 1.0), |at| {
            if at.cmplt(UVec3::splat(4)).all() {
                1.0
            } else {
                0.0
            }
        });
        grid.transform = Mat4::from_scale(Vec3::splat(2.0)) * Mat4::from_translation(Vec3::X);
        grid
    }

    #[test]
    fn world_index_roundtrip() {
        let grid = scaled_grid();
        let index = Vec4::new(1.0, 2.0, 3.0, 1.0);
        let back = grid.to_index(grid.to_world(index));
        assert_relative_eq!(back.x, index.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, index.y, epsilon = 1e-5);
        assert_relative_eq!(back.z, index.z, epsilon = 1e-5);
        assert_relative_eq!(back.w, index.w, epsilon = 1e-5);
    }

    #[test]
    fn world_aabb_spans_the_extent() {
        let grid = scaled_grid();
        let aabb = grid.world_aabb();
        assert_relative_eq!(aabb.min.x, 2.0, epsilon = 1e-5);
        assert_relative_eq!(aabb.max.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(aabb.size().y, 8.0, epsilon = 1e-5);
    }

    #[test]
    fn world_lookup_hits_the_containing_cell() {
        let grid = scaled_grid();
        // world x = 4.1 maps to index x = 1.05
        assert_eq!(grid.lookup_world(Vec3::new(4.1, 0.5, 0.5)), 1.0);
        // in front of the grid origin
        assert_eq!(grid.lookup_world(Vec3::new(1.0, 0.5, 0.5)), 0.0);
        // beyond the extent
        assert_eq!(grid.lookup_world(Vec3::new(100.0, 0.5, 0.5)), 0.0);
    }

    #[test]
    fn default_emptiness_follows_active_voxels() {
        let grid = FieldGrid::new(UVec3::ZERO, (0.0, 0.0), |_| 0.0);
        assert!(grid.is_empty());
        assert!(!scaled_grid().is_empty());
    }
}
