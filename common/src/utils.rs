//! Common Utilities
//!
//! Bit, power and arithmetic helpers used across the downlink pipeline

use tracing::trace;

/// Integer division rounding towards positive infinity
#[inline]
pub fn divide_ceil(numerator: usize, denominator: usize) -> usize {
    (numerator + denominator - 1) / denominator
}

/// Convert a power offset in decibels to a linear amplitude factor
pub fn convert_db_to_amplitude(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Unpack bits from a byte buffer (MSB first) into one bit per byte
///
/// Reads `out.len()` bits starting at bit `offset` of `bytes`.
pub fn unpack_bits_into(bytes: &[u8], offset: usize, out: &mut [u8]) {
    debug_assert!(offset + out.len() <= bytes.len() * 8);

    for (i, bit) in out.iter_mut().enumerate() {
        let pos = offset + i;
        *bit = (bytes[pos / 8] >> (7 - (pos % 8))) & 1;
    }
}

/// Unpack the low `nof_bits` bits of a value (MSB first) into one bit per byte
pub fn unpack_value_bits(value: u32, nof_bits: usize, out: &mut [u8]) {
    debug_assert!(out.len() >= nof_bits);

    for i in 0..nof_bits {
        out[i] = ((value >> (nof_bits - 1 - i)) & 1) as u8;
    }
    trace!("Unpacked {} bits from 0x{:x}", nof_bits, value);
}

/// Unpack bytes into bits (MSB first)
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = vec![0u8; bytes.len() * 8];
    unpack_bits_into(bytes, 0, &mut bits);
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divide_ceil() {
        assert_eq!(divide_ceil(10, 5), 2);
        assert_eq!(divide_ceil(11, 5), 3);
        assert_eq!(divide_ceil(1, 7), 1);
    }

    #[test]
    fn test_db_to_amplitude() {
        assert!((convert_db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!((convert_db_to_amplitude(-6.0206) - 0.5).abs() < 1e-4);
        assert!((convert_db_to_amplitude(20.0) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_bit_unpacking() {
        let bits = unpack_bits(&[0xAA]);
        assert_eq!(bits, vec![1, 0, 1, 0, 1, 0, 1, 0]);

        let mut window = [0u8; 6];
        unpack_bits_into(&[0x0F, 0xF0], 4, &mut window);
        assert_eq!(window, [1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_value_unpacking() {
        let mut out = [0u8; 4];
        unpack_value_bits(0b1011, 4, &mut out);
        assert_eq!(out, [1, 0, 1, 1]);
    }
}
