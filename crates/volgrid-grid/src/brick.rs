//! Brick-compressed sparse voxel grid.
//!
//! A two-level indirection from a coarse brick grid into a packed atlas:
//! per brick, the indirection table holds an encoded atlas pointer (or 0
//! for empty), the range table holds the local (min, max) as two
//! half-floats, and the atlas stores 8x8x8 voxels quantized to 8 bits
//! over that local range. A min/max mipmap pyramid over the range table
//! supports empty-space skipping at coarser scales.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{IVec3, Mat4, UVec3};
use rayon::prelude::*;
use tracing::debug;

use volgrid_core::math::{div_round_up, volume};
use volgrid_core::{Error, Result, Vol3};

use crate::grid::Grid;
use crate::pack::{
    decode_ptr, decode_range, decode_voxel, encode_ptr, encode_range, encode_voxel,
    MAX_BRICKS_PER_AXIS,
};

/// Brick edge length in voxels.
pub const BRICK_SIZE: u32 = 8;
/// log2 of the brick edge, for shift/mask addressing.
pub const BRICK_BITS: u32 = 3;
/// Total voxels per brick.
pub const BRICK_VOXELS: u32 = BRICK_SIZE * BRICK_SIZE * BRICK_SIZE;
/// Number of min/max mipmap levels over the range table.
pub const MIPMAP_LEVELS: u32 = 3;
/// Halo width in voxels around a brick when estimating its value range.
///
/// The halo keeps reconstruction filters sampling near brick borders
/// bounded by the stored range.
pub const DILATION: i32 = 2;

/// Sparse voxel grid of 8-bit bricks behind an indirection table.
///
/// Built once from a source grid and immutable afterwards; holds no
/// reference back to its source.
#[derive(Debug)]
pub struct BrickGrid {
    transform: Mat4,
    n_bricks: UVec3,
    min_maj: (f32, f32),
    brick_count: usize,
    indirection: Vol3<u32>,
    range: Vol3<u32>,
    atlas: Vol3<u8>,
    range_mipmaps: Vec<Vol3<u32>>,
}

/// Brick coordinate of a flat brick id, X-major.
#[inline]
fn unlinearize(idx: usize, shape: UVec3) -> UVec3 {
    let sx = shape.x as usize;
    let sy = shape.y as usize;
    UVec3::new(
        (idx % sx) as u32,
        ((idx / sx) % sy) as u32,
        (idx / (sx * sy)) as u32,
    )
}

/// Minorant and majorant over a brick dilated by [`DILATION`] voxels.
///
/// Negative halo samples wrap to far out-of-range coordinates and resolve
/// through the source's out-of-bounds lookup policy.
fn dilated_range(source: &dyn Grid, brick: UVec3) -> (f32, f32) {
    let base = (brick * BRICK_SIZE).as_ivec3();
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for z in -DILATION..BRICK_SIZE as i32 + DILATION {
        for y in -DILATION..BRICK_SIZE as i32 + DILATION {
            for x in -DILATION..BRICK_SIZE as i32 + DILATION {
                let value = source.lookup((base + IVec3::new(x, y, z)).as_uvec3());
                lo = lo.min(value);
                hi = hi.max(value);
            }
        }
    }
    (lo, hi)
}

impl BrickGrid {
    /// Build a brick grid by sampling `source` through the grid contract.
    ///
    /// Fails with [`Error::CapacityExceeded`] before any parallel work if
    /// the brick grid would not fit the pointer encoding.
    pub fn from_grid(source: &dyn Grid) -> Result<Self> {
        let alignment = UVec3::splat(1 << MIPMAP_LEVELS);
        let n_bricks = div_round_up(
            div_round_up(source.extent(), UVec3::splat(BRICK_SIZE)),
            alignment,
        ) * alignment;
        if n_bricks.cmpge(UVec3::splat(MAX_BRICKS_PER_AXIS)).any() {
            return Err(Error::CapacityExceeded {
                n_bricks,
                max: MAX_BRICKS_PER_AXIS,
            });
        }

        let mut indirection = Vol3::<u32>::new(n_bricks);
        let mut range = Vol3::<u32>::new(n_bricks);
        let mut atlas = Vol3::<u8>::new(n_bricks * BRICK_SIZE);

        // Range pass: per-brick extrema and atlas pointers, parallel over
        // Z-slices of the brick grid. The counter hands out unique atlas
        // ids and is the only cross-thread synchronization.
        let counter = AtomicUsize::new(0);
        let bricks_per_slab = (n_bricks.x * n_bricks.y) as usize;
        if bricks_per_slab > 0 {
            indirection
                .as_mut_slice()
                .par_chunks_mut(bricks_per_slab)
                .zip(range.as_mut_slice().par_chunks_mut(bricks_per_slab))
                .enumerate()
                .for_each(|(bz, (indirection_slab, range_slab))| {
                    for by in 0..n_bricks.y {
                        for bx in 0..n_bricks.x {
                            let brick = UVec3::new(bx, by, bz as u32);
                            let (lo, hi) = dilated_range(source, brick);
                            let cell = (by * n_bricks.x + bx) as usize;
                            range_slab[cell] = encode_range(lo, hi);
                            // empty bricks keep the zero pointer
                            if hi == lo {
                                continue;
                            }
                            let id = counter.fetch_add(1, Ordering::Relaxed);
                            indirection_slab[cell] = encode_ptr(unlinearize(id, n_bricks));
                        }
                    }
                });
        }
        let brick_count = counter.into_inner();

        // Shrink the atlas to the bricks actually allocated.
        if bricks_per_slab > 0 {
            atlas.prune(BRICK_SIZE * brick_count.div_ceil(bricks_per_slab) as u32);
        }

        // id -> (brick, decoded range) table for the atlas pass. A brick
        // whose range collapsed under half-float rounding reads back as
        // its minorant and needs no atlas data.
        let mut allocated: Vec<Option<(UVec3, f32, f32)>> = vec![None; brick_count];
        for (idx, &cell) in range.as_slice().iter().enumerate() {
            let (lo, hi) = decode_range(cell);
            if hi == lo {
                continue;
            }
            let id = indirection.linear_index(decode_ptr(indirection.as_slice()[idx]));
            allocated[id] = Some((unlinearize(idx, n_bricks), lo, hi));
        }

        // Atlas pass: quantize each allocated brick against its decoded
        // stored range, parallel over Z-slices of the atlas. Every brick
        // intersects eight slices; writes are disjoint within each.
        let atlas_stride = atlas.stride();
        let voxels_per_slab = (atlas_stride.x * atlas_stride.y) as usize;
        if voxels_per_slab > 0 && brick_count > 0 {
            atlas
                .as_mut_slice()
                .par_chunks_mut(voxels_per_slab)
                .enumerate()
                .for_each(|(z, slab)| {
                    let dz = z as u32 & (BRICK_SIZE - 1);
                    let first = (z >> BRICK_BITS) * bricks_per_slab;
                    let last = (first + bricks_per_slab).min(brick_count);
                    for id in first..last {
                        let Some((brick, lo, hi)) = allocated[id] else {
                            continue;
                        };
                        let ptr = unlinearize(id, n_bricks) * BRICK_SIZE;
                        for y in 0..BRICK_SIZE {
                            let row = ((ptr.y + y) * atlas_stride.x + ptr.x) as usize;
                            for x in 0..BRICK_SIZE {
                                let value =
                                    source.lookup(brick * BRICK_SIZE + UVec3::new(x, y, dz));
                                slab[row + x as usize] = encode_voxel(value, lo, hi);
                            }
                        }
                    }
                });
        }

        // Min/max mipmap pyramid over the range table. Levels build in
        // order; each level is parallel over its Z-slices.
        let mut range_mipmaps: Vec<Vol3<u32>> = Vec::with_capacity(MIPMAP_LEVELS as usize);
        for level in 0..MIPMAP_LEVELS as usize {
            let mip_shape = n_bricks / (1 << (level + 1));
            let mut mip = Vol3::<u32>::new(mip_shape);
            let source_table = if level == 0 {
                &range
            } else {
                &range_mipmaps[level - 1]
            };
            let cells_per_slab = (mip_shape.x * mip_shape.y) as usize;
            if cells_per_slab > 0 {
                mip.as_mut_slice()
                    .par_chunks_mut(cells_per_slab)
                    .enumerate()
                    .for_each(|(bz, slab)| {
                        for by in 0..mip_shape.y {
                            for bx in 0..mip_shape.x {
                                let cell = UVec3::new(bx, by, bz as u32);
                                let mut lo = f32::INFINITY;
                                let mut hi = f32::NEG_INFINITY;
                                for corner in 0..8u32 {
                                    let offset =
                                        UVec3::new(corner & 1, (corner >> 1) & 1, corner >> 2);
                                    let (child_lo, child_hi) =
                                        decode_range(source_table[cell * 2 + offset]);
                                    lo = lo.min(child_lo);
                                    hi = hi.max(child_hi);
                                }
                                slab[(by * mip_shape.x + bx) as usize] = encode_range(lo, hi);
                            }
                        }
                    });
            }
            range_mipmaps.push(mip);
        }

        debug!(
            "built brick grid: {} of {} bricks allocated, atlas {}x{}x{}",
            brick_count,
            volume(n_bricks),
            atlas_stride.x,
            atlas_stride.y,
            atlas_stride.z
        );

        Ok(Self {
            transform: source.transform(),
            n_bricks,
            min_maj: source.extrema(),
            brick_count,
            indirection,
            range,
            atlas,
            range_mipmaps,
        })
    }

    /// Brick-grid shape.
    pub fn n_bricks(&self) -> UVec3 {
        self.n_bricks
    }

    /// Number of allocated (non-empty) bricks.
    pub fn brick_count(&self) -> usize {
        self.brick_count
    }

    /// Pointer table; 0 marks an empty brick.
    pub fn indirection(&self) -> &Vol3<u32> {
        &self.indirection
    }

    /// Per-brick half-float (min, max) table.
    pub fn range(&self) -> &Vol3<u32> {
        &self.range
    }

    /// Packed brick atlas, pruned in Z to the allocated bricks.
    pub fn atlas(&self) -> &Vol3<u8> {
        &self.atlas
    }

    /// Min/max mipmap pyramid over the range table, finest level first.
    pub fn range_mipmaps(&self) -> &[Vol3<u32>] {
        &self.range_mipmaps
    }

    /// Decoded (min, max) of a single brick.
    pub fn brick_range(&self, brick: UVec3) -> (f32, f32) {
        decode_range(self.range[brick])
    }

    /// Replace the index- to world-space transform.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }
}

impl Grid for BrickGrid {
    fn lookup(&self, at: UVec3) -> f32 {
        let brick = at >> BRICK_BITS;
        if brick.cmpge(self.n_bricks).any() {
            return 0.0;
        }
        let (lo, hi) = decode_range(self.range[brick]);
        // empty bricks have no atlas storage behind them
        if hi == lo {
            return lo;
        }
        let ptr = decode_ptr(self.indirection[brick]);
        let voxel = (ptr << BRICK_BITS) + (at & UVec3::splat(BRICK_SIZE - 1));
        decode_voxel(self.atlas[voxel], lo, hi)
    }

    fn extrema(&self) -> (f32, f32) {
        self.min_maj
    }

    fn extent(&self) -> UVec3 {
        self.n_bricks * BRICK_SIZE
    }

    fn active_voxels(&self) -> usize {
        self.brick_count * BRICK_VOXELS as usize
    }

    fn memory_usage(&self) -> usize {
        4 * self.indirection.len()
            + 4 * self.range.len()
            + self.atlas.len()
            + self
                .range_mipmaps
                .iter()
                .map(|mip| 4 * mip.len())
                .sum::<usize>()
    }

    fn transform(&self) -> Mat4 {
        self.transform
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FieldGrid;
    use std::collections::HashSet;

    /// Sixteenth-step field defined on the whole lattice; every value is
    /// exactly representable as a half-float.
    fn busy_field(at: UVec3) -> f32 {
        (at.x
            .wrapping_mul(3)
            .wrapping_add(at.y.wrapping_mul(5))
            .wrapping_add(at.z.wrapping_mul(7))
            % 16) as f32
            / 16.0
    }

    fn busy_grid() -> FieldGrid {
        FieldGrid::new(UVec3::splat(32), (0.0, 15.0 / 16.0), busy_field)
    }

    #[test]
    fn all_zero_source_allocates_nothing() {
        let source = FieldGrid::new(UVec3::splat(16), (0.0, 0.0), |_| 0.0);
        let grid = BrickGrid::from_grid(&source).unwrap();

        assert_eq!(grid.n_bricks(), UVec3::splat(8));
        assert_eq!(grid.brick_count(), 0);
        assert_eq!(grid.active_voxels(), 0);
        assert!(grid.indirection().as_slice().iter().all(|&cell| cell == 0));
        assert!(grid
            .range()
            .as_slice()
            .iter()
            .all(|&cell| decode_range(cell) == (0.0, 0.0)));
        assert_eq!(grid.atlas().stride(), UVec3::new(64, 64, 0));
        assert!(grid.atlas().is_empty());
        for z in 0..64 {
            for y in 0..64 {
                for x in 0..64 {
                    assert_eq!(grid.lookup(UVec3::new(x, y, z)), 0.0);
                }
            }
        }
    }

    #[test]
    fn constant_source_reads_back_everywhere() {
        let source = FieldGrid::new(UVec3::splat(24), (0.5, 0.5), |_| 0.5);
        let grid = BrickGrid::from_grid(&source).unwrap();

        assert_eq!(grid.brick_count(), 0);
        assert_eq!(grid.extrema(), (0.5, 0.5));
        assert!(grid
            .range()
            .as_slice()
            .iter()
            .all(|&cell| decode_range(cell) == (0.5, 0.5)));
        for z in 0..24 {
            for y in 0..24 {
                for x in 0..24 {
                    assert_eq!(grid.lookup(UVec3::new(x, y, z)), 0.5);
                }
            }
        }
    }

    #[test]
    fn single_brick_source() {
        // The value region stays DILATION voxels clear of the first brick
        // border, so no neighboring brick sees it through its halo.
        let source = FieldGrid::new(UVec3::splat(16), (0.0, 1.0), |at| {
            if at.cmpge(UVec3::splat(2)).all() && at.cmplt(UVec3::splat(6)).all() {
                1.0
            } else {
                0.0
            }
        });
        let grid = BrickGrid::from_grid(&source).unwrap();

        assert_eq!(grid.brick_count(), 1);
        assert_eq!(grid.active_voxels(), BRICK_VOXELS as usize);
        assert_eq!(grid.brick_range(UVec3::ZERO), (0.0, 1.0));
        assert_eq!(grid.lookup(UVec3::splat(3)), 1.0);
        assert_eq!(grid.lookup(UVec3::splat(5)), 1.0);
        assert_eq!(grid.lookup(UVec3::splat(7)), 0.0);
        assert_eq!(grid.lookup(UVec3::splat(10)), 0.0);
        // one brick fills one atlas slab
        assert_eq!(grid.atlas().stride(), UVec3::new(64, 64, 8));
    }

    #[test]
    fn capacity_failure_is_eager() {
        let source = FieldGrid::new(UVec3::new(8192, 8, 8), (0.0, 1.0), |_| 0.0);
        let err = BrickGrid::from_grid(&source).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }

    #[test]
    fn reconstruction_error_is_bounded_by_the_brick_range() {
        let source = busy_grid();
        let grid = BrickGrid::from_grid(&source).unwrap();

        for z in 0..32 {
            for y in 0..32 {
                for x in 0..32 {
                    let at = UVec3::new(x, y, z);
                    let (lo, hi) = grid.brick_range(at >> BRICK_BITS);
                    let bound = (hi - lo) / 255.0 + 1e-6;
                    assert!((grid.lookup(at) - source.lookup(at)).abs() <= bound);
                }
            }
        }
    }

    #[test]
    fn pointers_are_unique_and_inside_the_pruned_atlas() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();

        let mut seen = HashSet::new();
        for idx in 0..grid.indirection().len() {
            let (lo, hi) = decode_range(grid.range().as_slice()[idx]);
            if hi == lo {
                continue;
            }
            let ptr = decode_ptr(grid.indirection().as_slice()[idx]);
            assert!(seen.insert(ptr.to_array()));
            let corner = ptr * BRICK_SIZE + UVec3::splat(BRICK_SIZE - 1);
            assert!(corner.cmplt(grid.atlas().stride()).all());
        }
        assert_eq!(seen.len(), grid.brick_count());
    }

    #[test]
    fn atlas_is_pruned_to_the_allocated_bricks() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();

        let n = grid.n_bricks();
        let slabs = grid
            .brick_count()
            .div_ceil((n.x * n.y) as usize);
        let stride = grid.atlas().stride();
        assert_eq!(stride.z as usize, BRICK_SIZE as usize * slabs);
        assert_eq!(
            grid.atlas().len(),
            (n.x * BRICK_SIZE) as usize * (n.y * BRICK_SIZE) as usize * stride.z as usize
        );
    }

    #[test]
    fn empty_bricks_read_back_as_their_constant() {
        // 0.25 in the first brick column, 0.75 everywhere else; bricks at
        // bx >= 2 never see the boundary through their halo and stay
        // empty.
        let source = FieldGrid::new(
            UVec3::new(32, 8, 8),
            (0.25, 0.75),
            |at| if at.x < 8 { 0.25 } else { 0.75 },
        );
        let grid = BrickGrid::from_grid(&source).unwrap();

        // bx 0 and 1 allocate across the whole aligned 8x8 brick slab
        assert_eq!(grid.brick_count(), 128);
        for bz in 0..8 {
            for by in 0..8 {
                for bx in 2..8 {
                    let brick = UVec3::new(bx, by, bz);
                    assert_eq!(grid.indirection()[brick], 0);
                    assert_eq!(grid.brick_range(brick), (0.75, 0.75));
                }
            }
        }
        assert_eq!(grid.lookup(UVec3::new(20, 3, 3)), 0.75);
        assert_eq!(grid.lookup(UVec3::new(3, 3, 3)), 0.25);
        assert_eq!(grid.lookup(UVec3::new(12, 3, 3)), 0.75);
    }

    #[test]
    fn mipmap_levels_halve_and_coarsen_the_range_table() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();
        let levels = grid.range_mipmaps();
        assert_eq!(levels.len(), MIPMAP_LEVELS as usize);

        let mut source_table = grid.range();
        for mip in levels {
            assert_eq!(mip.stride() * 2, source_table.stride());
            for idx in 0..mip.len() {
                let cell = mip.linear_coord(idx);
                let mut lo = f32::INFINITY;
                let mut hi = f32::NEG_INFINITY;
                for corner in 0..8u32 {
                    let offset = UVec3::new(corner & 1, (corner >> 1) & 1, corner >> 2);
                    let (child_lo, child_hi) = decode_range(source_table[cell * 2 + offset]);
                    lo = lo.min(child_lo);
                    hi = hi.max(child_hi);
                }
                assert_eq!(decode_range(mip.as_slice()[idx]), (lo, hi));
            }
            source_table = mip;
        }
    }

    #[test]
    fn coarsest_mipmap_covers_the_global_range() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();
        let coarsest = grid.range_mipmaps().last().unwrap();
        assert_eq!(coarsest.stride(), UVec3::ONE);

        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &cell in grid.range().as_slice() {
            let (child_lo, child_hi) = decode_range(cell);
            lo = lo.min(child_lo);
            hi = hi.max(child_hi);
        }
        assert_eq!(decode_range(coarsest.as_slice()[0]), (lo, hi));
    }

    #[test]
    fn lookup_outside_the_brick_grid_is_zero() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();
        assert_eq!(grid.extent(), UVec3::splat(64));
        assert_eq!(grid.lookup(UVec3::new(64, 0, 0)), 0.0);
        assert_eq!(grid.lookup(UVec3::splat(1000)), 0.0);
    }

    #[test]
    fn introspection_matches_the_tables() {
        let grid = BrickGrid::from_grid(&busy_grid()).unwrap();

        assert_eq!(grid.extrema(), (0.0, 15.0 / 16.0));
        assert_eq!(
            grid.active_voxels(),
            grid.brick_count() * BRICK_VOXELS as usize
        );
        let mipmap_bytes: usize = grid.range_mipmaps().iter().map(|mip| 4 * mip.len()).sum();
        assert_eq!(
            grid.memory_usage(),
            4 * grid.indirection().len() + 4 * grid.range().len() + grid.atlas().len()
                + mipmap_bytes
        );
    }

    #[test]
    fn conversion_keeps_the_source_transform() {
        let mut source = busy_grid();
        source.transform = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let grid = BrickGrid::from_grid(&source).unwrap();
        assert_eq!(grid.transform(), source.transform);
    }
}
