//! Dense grid: full-resolution 8-bit quantization over one global range.

use std::any::Any;
use std::sync::Arc;

use glam::{Mat4, UVec3};
use rayon::prelude::*;
use tracing::debug;

use volgrid_core::math::volume;
use volgrid_core::{Error, Result, Vol3};

use crate::grid::Grid;
use crate::pack::{decode_voxel, encode_voxel};

/// A contiguous 8-bit grid quantized over a single global (min, max)
/// range.
///
/// The grid exclusively owns its storage and is immutable once built.
pub struct DenseGrid {
    transform: Mat4,
    shape: UVec3,
    min_value: f32,
    max_value: f32,
    voxels: Vol3<u8>,
}

impl DenseGrid {
    /// Quantize any grid read through the contract, parallel over
    /// Z-slices.
    pub fn from_grid(source: &dyn Grid) -> Self {
        let shape = source.extent();
        let (min_value, max_value) = source.extrema();
        let mut voxels = Vol3::new(shape);
        let slice_len = (shape.x * shape.y) as usize;
        if slice_len > 0 {
            voxels
                .as_mut_slice()
                .par_chunks_mut(slice_len)
                .enumerate()
                .for_each(|(z, slice)| {
                    for y in 0..shape.y {
                        for x in 0..shape.x {
                            let value = source.lookup(UVec3::new(x, y, z as u32));
                            slice[(y * shape.x + x) as usize] =
                                encode_voxel(value, min_value, max_value);
                        }
                    }
                });
        }
        Self {
            transform: source.transform(),
            shape,
            min_value,
            max_value,
            voxels,
        }
    }

    /// Adopt an 8-bit slab in X-fastest order; stored bytes are read back
    /// over the range [0, 1].
    pub fn from_u8_slab(shape: UVec3, data: &[u8]) -> Result<Self> {
        if data.len() != volume(shape) {
            return Err(Error::InvalidData(format!(
                "slab of {} bytes does not match shape {shape}",
                data.len()
            )));
        }
        let mut voxels = Vol3::new(shape);
        voxels.as_mut_slice().copy_from_slice(data);
        Ok(Self {
            transform: Mat4::IDENTITY,
            shape,
            min_value: 0.0,
            max_value: 1.0,
            voxels,
        })
    }

    /// Quantize a float slab in X-fastest order over its global range.
    ///
    /// A constant slab quantizes to 0 everywhere and reads back as the
    /// constant.
    pub fn from_f32_slab(shape: UVec3, data: &[f32]) -> Result<Self> {
        if data.len() != volume(shape) {
            return Err(Error::InvalidData(format!(
                "slab of {} floats does not match shape {shape}",
                data.len()
            )));
        }
        let slice_len = (shape.x * shape.y) as usize;
        let mut min_value = f32::INFINITY;
        let mut max_value = f32::NEG_INFINITY;
        if slice_len > 0 {
            // per-slice extrema, reduced sequentially
            let extrema: Vec<(f32, f32)> = data
                .par_chunks(slice_len)
                .map(|slice| {
                    slice
                        .iter()
                        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &value| {
                            (lo.min(value), hi.max(value))
                        })
                })
                .collect();
            for (lo, hi) in extrema {
                min_value = min_value.min(lo);
                max_value = max_value.max(hi);
            }
        }
        if min_value > max_value {
            // no voxels at all
            min_value = 0.0;
            max_value = 0.0;
        }
        let mut voxels = Vol3::new(shape);
        if slice_len > 0 {
            voxels
                .as_mut_slice()
                .par_chunks_mut(slice_len)
                .zip(data.par_chunks(slice_len))
                .for_each(|(dst, src)| {
                    for (voxel, &value) in dst.iter_mut().zip(src) {
                        *voxel = encode_voxel(value, min_value, max_value);
                    }
                });
        }
        debug!(
            "quantized {}x{}x{} float slab over [{}, {}]",
            shape.x, shape.y, shape.z, min_value, max_value
        );
        Ok(Self {
            transform: Mat4::IDENTITY,
            shape,
            min_value,
            max_value,
            voxels,
        })
    }

    /// Replace the index- to world-space transform.
    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// The quantized voxel bytes, e.g. for GPU upload.
    pub fn voxels(&self) -> &Vol3<u8> {
        &self.voxels
    }
}

impl Grid for DenseGrid {
    fn lookup(&self, at: UVec3) -> f32 {
        if at.cmpge(self.shape).any() {
            return 0.0;
        }
        decode_voxel(self.voxels[at], self.min_value, self.max_value)
    }

    fn extrema(&self) -> (f32, f32) {
        (self.min_value, self.max_value)
    }

    fn extent(&self) -> UVec3 {
        self.shape
    }

    fn active_voxels(&self) -> usize {
        self.voxels.len()
    }

    fn memory_usage(&self) -> usize {
        self.voxels.len()
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
