//! Bit-packing codecs shared by the grid representations.
//!
//! Three pure codecs: per-brick (min, max) ranges packed as two
//! half-floats, atlas brick pointers packed as three 10-bit fields, and
//! 8-bit voxel values quantized over a local range.

use glam::UVec3;
use half::f16;

/// Bits per axis in an encoded atlas pointer.
pub const BITS_PER_AXIS: u32 = 10;
/// Upper bound on atlas bricks per axis.
pub const MAX_BRICKS_PER_AXIS: u32 = 1 << BITS_PER_AXIS;

/// Pack a (minorant, majorant) pair into two half-floats.
///
/// The minorant occupies the low 16 bits. Half precision is an accepted
/// lossy encoding for range metadata.
#[inline]
pub fn encode_range(lo: f32, hi: f32) -> u32 {
    u32::from(f16::from_f32(lo).to_bits()) | (u32::from(f16::from_f32(hi).to_bits()) << 16)
}

/// Unpack a (minorant, majorant) pair.
#[inline]
pub fn decode_range(data: u32) -> (f32, f32) {
    (
        f16::from_bits((data & 0xFFFF) as u16).to_f32(),
        f16::from_bits((data >> 16) as u16).to_f32(),
    )
}

/// Pack an atlas brick coordinate.
///
/// Axis fields sit above a 2-bit unused field, `z` lowest. The encoded
/// value 0 doubles as the empty-brick marker in the indirection table;
/// the brick legitimately stored at atlas origin also encodes to 0 and is
/// disambiguated through its range (empty iff min equals max).
#[inline]
pub fn encode_ptr(ptr: UVec3) -> u32 {
    debug_assert!(ptr.cmplt(UVec3::splat(MAX_BRICKS_PER_AXIS)).all());
    let masked = ptr & UVec3::splat(MAX_BRICKS_PER_AXIS - 1);
    (masked.x << (2 + 2 * BITS_PER_AXIS)) | (masked.y << (2 + BITS_PER_AXIS)) | (masked.z << 2)
}

/// Unpack an atlas brick coordinate.
#[inline]
pub fn decode_ptr(data: u32) -> UVec3 {
    UVec3::new(
        (data >> (2 + 2 * BITS_PER_AXIS)) & (MAX_BRICKS_PER_AXIS - 1),
        (data >> (2 + BITS_PER_AXIS)) & (MAX_BRICKS_PER_AXIS - 1),
        (data >> 2) & (MAX_BRICKS_PER_AXIS - 1),
    )
}

/// Quantize a value to 8 bits over `[lo, hi]`, clamping.
///
/// A degenerate range encodes to 0, which `decode_voxel` reconstructs as
/// `lo`.
#[inline]
pub fn encode_voxel(value: f32, lo: f32, hi: f32) -> u8 {
    if hi <= lo {
        return 0;
    }
    let norm = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    (255.0 * norm).round() as u8
}

/// Reconstruct a value from its 8-bit quantization over `[lo, hi]`.
#[inline]
pub fn decode_voxel(data: u8, lo: f32, hi: f32) -> f32 {
    lo + f32::from(data) * (1.0 / 255.0) * (hi - lo)
}
