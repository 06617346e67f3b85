//! Math utilities for index- and world-space queries.

use glam::{UVec3, Vec3};

/// Component-wise ceiling division.
#[inline]
pub fn div_round_up(num: UVec3, denom: UVec3) -> UVec3 {
    (num + denom - UVec3::ONE) / denom
}

/// Number of cells in an extent, widened to usize before multiplying.
///
/// A u32 product overflows already for a 2048^3 volume.
#[inline]
pub fn volume(extent: UVec3) -> usize {
    extent.x as usize * extent.y as usize * extent.z as usize
}

/// Axis-Aligned Bounding Box in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if a point is inside the AABB
    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}
