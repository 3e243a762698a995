/// Modulation mapping for the downlink shared channel
/// Based on 3GPP TS 38.211 Section 5.1
///
/// Symbols are produced without the normalisation factor of the standard, so
/// every coordinate is an odd integer. The factor is folded into the
/// precoding matrix by the caller.

use common::ModulationScheme;
use num_complex::Complex32;

/// Normalisation factor of a modulation scheme
pub fn modulation_scaling(modulation: ModulationScheme) -> f32 {
    match modulation {
        ModulationScheme::Qpsk => 1.0 / 2f32.sqrt(),
        ModulationScheme::Qam16 => 1.0 / 10f32.sqrt(),
        ModulationScheme::Qam64 => 1.0 / 42f32.sqrt(),
        ModulationScheme::Qam256 => 1.0 / 170f32.sqrt(),
    }
}

/// One axis of a square constellation from its interleaved bits
///
/// `bits` holds b0, b2, b4... for the real axis or b1, b3, b5... for the
/// imaginary one. Evaluates s0 (2^(m-1) - s1 (2^(m-2) - ... )) with s = 1 - 2b.
#[inline]
fn axis_value<I>(bits: I, nof_bits: usize) -> f32
where
    I: DoubleEndedIterator<Item = u8>,
{
    let mut inner = 1.0f32;
    let mut weight = 1.0f32;
    let mut sign = 1.0f32;
    for (k, bit) in bits.rev().enumerate() {
        sign = 1.0 - 2.0 * (bit & 1) as f32;
        if k + 1 < nof_bits {
            weight *= 2.0;
            inner = weight - sign * inner;
        }
    }
    sign * inner
}

/// Map one group of Qm bits onto an unnormalised constellation point
#[inline]
pub fn modulate_symbol(bits: &[u8]) -> Complex32 {
    let per_axis = bits.len() / 2;
    let re = axis_value(bits.iter().step_by(2).copied(), per_axis);
    let im = axis_value(bits.iter().skip(1).step_by(2).copied(), per_axis);
    Complex32::new(re, im)
}

/// Modulate unpacked bits into `symbols`, one symbol per Qm bits
pub fn modulate(symbols: &mut [Complex32], bits: &[u8], modulation: ModulationScheme) {
    let qm = modulation.bits_per_symbol();
    assert_eq!(
        bits.len(),
        symbols.len() * qm,
        "Modulation input of {} bits does not fill {} symbols",
        bits.len(),
        symbols.len()
    );

    for (symbol, group) in symbols.iter_mut().zip(bits.chunks_exact(qm)) {
        *symbol = modulate_symbol(group);
    }
}
