//! Byte-level helpers shared by the DCI engine, the calibration propagator
//! and the frame decoder.
//!
//! DCI payloads travel in 32-bit-word-swapped ("firmware") order; every
//! read and write performs one explicit endianness pass through
//! [`swap_words`]. After the swap, multi-byte values are plain
//! little-endian and are packed/unpacked with the slice codecs below.

/// Reverses the byte order of every aligned 32-bit word in `buf[..size]`.
///
/// A trailing partial word is left untouched; DCI payload sizes are always
/// multiples of four.
pub(crate) fn swap_words(buf: &mut [u8], size: usize) {
    for chunk in buf[..size].chunks_exact_mut(4) {
        let word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&word.to_le_bytes());
    }
}

pub(crate) fn from_u8_to_u16(src: &[u8], dst: &mut [u16]) {
    for (value, chunk) in dst.iter_mut().zip(src.chunks_exact(2)) {
        *value = u16::from_le_bytes([chunk[0], chunk[1]]);
    }
}

pub(crate) fn from_u8_to_i16(src: &[u8], dst: &mut [i16]) {
    for (value, chunk) in dst.iter_mut().zip(src.chunks_exact(2)) {
        *value = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
}

pub(crate) fn from_u8_to_u32(src: &[u8], dst: &mut [u32]) {
    for (value, chunk) in dst.iter_mut().zip(src.chunks_exact(4)) {
        *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

pub(crate) fn from_i16_to_u8(src: &[i16], dst: &mut [u8]) {
    for (&value, chunk) in src.iter().zip(dst.chunks_exact_mut(2)) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

pub(crate) fn from_u32_to_u8(src: &[u32], dst: &mut [u8]) {
    for (&value, chunk) in src.iter().zip(dst.chunks_exact_mut(4)) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}
