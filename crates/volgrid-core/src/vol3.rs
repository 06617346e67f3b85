//! Linear-storage 3D container.
//!
//! `Vol3` owns a flat buffer addressed as an X-fastest, Z-slowest grid. It
//! is the backing store for the indirection, range, and atlas buffers of
//! the grid representations, all of which are uploaded to the GPU as-is.

use bytemuck::Pod;
use glam::UVec3;
use std::ops::{Index, IndexMut};

use crate::math::volume;

/// A 3D buffer over contiguous storage.
///
/// Element `(x, y, z)` lives at flat index `z*sx*sy + y*sx + x`. The flat
/// length always equals the product of the stride components.
#[derive(Clone, Debug, Default)]
pub struct Vol3<T> {
    stride: UVec3,
    data: Vec<T>,
}

impl<T: Clone + Default> Vol3<T> {
    /// Create a buffer of the given shape with default-initialized elements.
    pub fn new(stride: UVec3) -> Self {
        Self {
            stride,
            data: vec![T::default(); volume(stride)],
        }
    }

    /// Replace the shape and reallocate storage.
    ///
    /// Previous contents are not preserved semantically.
    pub fn resize(&mut self, stride: UVec3) {
        self.stride = stride;
        self.data.resize(volume(stride), T::default());
    }

    /// Set the Z dimension to `slices` without moving elements.
    ///
    /// Shrinking truncates the flat buffer; X/Y stay untouched, so all
    /// surviving elements keep their coordinates.
    pub fn prune(&mut self, slices: u32) {
        self.stride.z = slices;
        self.data.resize(volume(self.stride), T::default());
    }
}

impl<T> Vol3<T> {
    /// Shape of the buffer.
    #[inline]
    pub fn stride(&self) -> UVec3 {
        self.stride
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat index of a coordinate.
    #[inline]
    pub fn linear_index(&self, at: UVec3) -> usize {
        (at.z as usize * self.stride.y as usize + at.y as usize) * self.stride.x as usize
            + at.x as usize
    }

    /// Coordinate of a flat index.
    #[inline]
    pub fn linear_coord(&self, idx: usize) -> UVec3 {
        let sx = self.stride.x as usize;
        let sy = self.stride.y as usize;
        UVec3::new(
            (idx % sx) as u32,
            ((idx / sx) % sy) as u32,
            (idx / (sx * sy)) as u32,
        )
    }

    /// Checked element access.
    #[inline]
    pub fn get(&self, at: UVec3) -> Option<&T> {
        if at.cmpge(self.stride).any() {
            return None;
        }
        self.data.get(self.linear_index(at))
    }

    /// The flat storage.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The flat storage, mutable. Callers partition this for parallel fills.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: Pod> Vol3<T> {
    /// The flat storage as raw bytes, e.g. for GPU upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

impl<T> Index<UVec3> for Vol3<T> {
    type Output = T;

    /// Unchecked in the coordinate sense: out-of-shape coordinates may
    /// alias another cell or panic on the flat bound. Callers clamp.
    #[inline]
    fn index(&self, at: UVec3) -> &T {
        &self.data[self.linear_index(at)]
    }
}

impl<T> IndexMut<UVec3> for Vol3<T> {
    #[inline]
    fn index_mut(&mut self, at: UVec3) -> &mut T {
        let idx = self.linear_index(at);
        &mut self.data[idx]
    }
}
