//! Byte-level transforms: XOR, circular bit rotation, modular mask addition.
//!
//! Every function is pure and returns a freshly allocated
//! [`PixelBuffer`]; inputs are never modified.

use crate::operation::RotateBits;
use crate::types::PixelBuffer;

/// XOR two buffers byte by byte.
///
/// Returns `None` if the buffers differ in length.
#[must_use = "returns the XORed buffer"]
pub fn xor_buffers(a: &PixelBuffer, b: &PixelBuffer) -> Option<PixelBuffer> {
    if a.len() != b.len() {
        return None;
    }
    let data = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(x, y)| x ^ y)
        .collect();
    Some(a.with_bytes(data))
}

/// Rotate every byte left by `bits`.
///
/// A rotation by 8 is the identity, which `u8::rotate_left` already
/// guarantees (the shift amount is taken modulo the bit width).
#[must_use = "returns the rotated buffer"]
pub fn rotate_left(buf: &PixelBuffer, bits: RotateBits) -> PixelBuffer {
    let n = u32::from(bits.get());
    buf.with_bytes(buf.as_bytes().iter().map(|b| b.rotate_left(n)).collect())
}

/// Rotate every byte right by `bits`. A rotation by 8 is the identity.
#[must_use = "returns the rotated buffer"]
pub fn rotate_right(buf: &PixelBuffer, bits: RotateBits) -> PixelBuffer {
    let n = u32::from(bits.get());
    buf.with_bytes(buf.as_bytes().iter().map(|b| b.rotate_right(n)).collect())
}

/// Add `mask` into a copy of `img` starting at byte `offset`, modulo 256.
///
/// Mask bytes that would land past the end of `img` are dropped. Bytes
/// outside the covered window are copied unchanged.
#[must_use = "returns the masked buffer"]
pub fn add_mask_modular(img: &PixelBuffer, mask: &PixelBuffer, offset: usize) -> PixelBuffer {
    let mut data = img.as_bytes().to_vec();
    if let Some(window) = data.get_mut(offset..) {
        for (byte, m) in window.iter_mut().zip(mask.as_bytes()) {
            *byte = byte.wrapping_add(*m);
        }
    }
    img.with_bytes(data)
}
