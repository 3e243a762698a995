/// Pseudo-random sequence generation for scrambling and reference signals
/// Based on 3GPP TS 38.211 Section 5.2.1

use num_complex::Complex32;

/// Sequence offset Nc applied after initialization
const NC: usize = 1600;

/// Register mask (31-bit LFSRs)
const STATE_MASK: u32 = 0x7FFF_FFFF;

/// Number of bits produced by one word step
const WORD_STEP: usize = 28;
const WORD_MASK: u32 = (1 << WORD_STEP) - 1;

/// Length-31 Gold sequence generator
///
/// Each register holds x(n)..x(n+30) in bits 0..30.
#[derive(Debug, Clone)]
pub struct PseudoRandomGenerator {
    x1: u32,
    x2: u32,
}

impl PseudoRandomGenerator {
    /// Create a generator with initialization value c_init, already advanced by Nc
    pub fn new(c_init: u32) -> Self {
        // x1(0) = 1, x1(n) = 0 for n = 1..30
        let mut generator = Self {
            x1: 1,
            x2: c_init & STATE_MASK,
        };
        generator.advance(NC);
        generator
    }

    /// Single LFSR step
    #[inline]
    fn step(&mut self) {
        // x1(n+31) = (x1(n+3) + x1(n)) mod 2
        let x1_new = ((self.x1 >> 3) ^ self.x1) & 1;
        self.x1 = (self.x1 >> 1) | (x1_new << 30);

        // x2(n+31) = (x2(n+3) + x2(n+2) + x2(n+1) + x2(n)) mod 2
        let x2_new = ((self.x2 >> 3) ^ (self.x2 >> 2) ^ (self.x2 >> 1) ^ self.x2) & 1;
        self.x2 = (self.x2 >> 1) | (x2_new << 30);
    }

    /// Advance both registers by 28 positions at once
    #[inline]
    fn step_word(&mut self) {
        let t1 = (self.x1 ^ (self.x1 >> 3)) & WORD_MASK;
        self.x1 = (self.x1 >> WORD_STEP) | (t1 << 3);

        let t2 = (self.x2 ^ (self.x2 >> 1) ^ (self.x2 >> 2) ^ (self.x2 >> 3)) & WORD_MASK;
        self.x2 = (self.x2 >> WORD_STEP) | (t2 << 3);
    }

    /// Skip `n` sequence bits
    pub fn advance(&mut self, n: usize) {
        for _ in 0..n / WORD_STEP {
            self.step_word();
        }
        for _ in 0..n % WORD_STEP {
            self.step();
        }
    }

    /// Generate next bit from the sequence
    #[inline]
    pub fn next_bit(&mut self) -> u8 {
        let c = (self.x1 ^ self.x2) & 1;
        self.step();
        c as u8
    }

    /// XOR the sequence onto unpacked bits (one bit per byte)
    pub fn apply_xor_bits(&mut self, bits: &mut [u8]) {
        let mut chunks = bits.chunks_exact_mut(WORD_STEP);
        for chunk in &mut chunks {
            let c = self.x1 ^ self.x2;
            for (i, bit) in chunk.iter_mut().enumerate() {
                *bit ^= ((c >> i) & 1) as u8;
            }
            self.step_word();
        }
        for bit in chunks.into_remainder() {
            *bit ^= self.next_bit();
        }
    }

    /// Generate QPSK symbol from sequence
    pub fn next_qpsk_symbol(&mut self, amplitude: f32) -> Complex32 {
        let c0 = self.next_bit();
        let c1 = self.next_bit();

        Complex32::new(
            amplitude * (1.0 - 2.0 * c0 as f32),
            amplitude * (1.0 - 2.0 * c1 as f32),
        )
    }

    /// Fill a buffer with QPSK symbols
    pub fn generate_qpsk(&mut self, out: &mut [Complex32], amplitude: f32) {
        for value in out.iter_mut() {
            *value = self.next_qpsk_symbol(amplitude);
        }
    }

    /// Skip n QPSK symbols (2 bits per symbol)
    pub fn skip_symbols(&mut self, n_symbols: usize) {
        self.advance(2 * n_symbols);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-serial reference straight from the recurrences, no offset tricks
    fn reference_sequence(c_init: u32, len: usize) -> Vec<u8> {
        let total = NC + len + 31;
        let mut x1 = vec![0u8; total];
        let mut x2 = vec![0u8; total];
        x1[0] = 1;
        for i in 0..31 {
            x2[i] = ((c_init >> i) & 1) as u8;
        }
        for n in 0..total - 31 {
            x1[n + 31] = (x1[n + 3] + x1[n]) % 2;
            x2[n + 31] = (x2[n + 3] + x2[n + 2] + x2[n + 1] + x2[n]) % 2;
        }
        (0..len).map(|n| (x1[n + NC] + x2[n + NC]) % 2).collect()
    }

    #[test]
    fn test_matches_reference_recurrence() {
        for c_init in [0u32, 1, 0x1234_5678 & STATE_MASK, STATE_MASK] {
            let expected = reference_sequence(c_init, 200);
            let mut generator = PseudoRandomGenerator::new(c_init);
            let actual: Vec<u8> = (0..200).map(|_| generator.next_bit()).collect();
            assert_eq!(actual, expected, "c_init={}", c_init);
        }
    }

    #[test]
    fn test_advance_equals_single_steps() {
        for n in [0usize, 1, 27, 28, 29, 100, 1001] {
            let mut stepped = PseudoRandomGenerator::new(0x5A5A);
            for _ in 0..n {
                stepped.next_bit();
            }
            let mut jumped = PseudoRandomGenerator::new(0x5A5A);
            jumped.advance(n);

            let a: Vec<u8> = (0..64).map(|_| stepped.next_bit()).collect();
            let b: Vec<u8> = (0..64).map(|_| jumped.next_bit()).collect();
            assert_eq!(a, b, "n={}", n);
        }
    }

    #[test]
    fn test_xor_matches_bitwise() {
        let mut bits: Vec<u8> = (0..103).map(|i| (i % 3 == 0) as u8).collect();
        let original = bits.clone();

        PseudoRandomGenerator::new(77).apply_xor_bits(&mut bits);
        let mut generator = PseudoRandomGenerator::new(77);
        for (scrambled, plain) in bits.iter().zip(&original) {
            assert_eq!(*scrambled, plain ^ generator.next_bit());
        }
    }

    #[test]
    fn test_qpsk_symbols_have_unit_magnitude() {
        let mut generator = PseudoRandomGenerator::new(100);
        for _ in 0..10 {
            let symbol = generator.next_qpsk_symbol(std::f32::consts::FRAC_1_SQRT_2);
            assert!((symbol.norm() - 1.0).abs() < 0.001);
        }
    }
}
