/// CRC calculation for 5G NR transport and code blocks
/// Based on 3GPP TS 38.212 Section 5.1

/// CRC generator polynomials used by the shared channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcPolynomial {
    /// gCRC24A: x^24 + x^23 + x^18 + x^17 + x^14 + x^11 + x^10 + x^7 + x^6 + x^5 + x^4 + x^3 + x + 1
    Crc24A,
    /// gCRC24B: x^24 + x^23 + x^6 + x^5 + x + 1
    Crc24B,
    /// gCRC16: x^16 + x^12 + x^5 + 1
    Crc16,
}

impl CrcPolynomial {
    /// Polynomial coefficients without the leading term
    fn coefficients(&self) -> u32 {
        match self {
            CrcPolynomial::Crc24A => 0x864CFB,
            CrcPolynomial::Crc24B => 0x800063,
            CrcPolynomial::Crc16 => 0x1021,
        }
    }

    /// CRC length in bits
    pub fn order(&self) -> usize {
        match self {
            CrcPolynomial::Crc24A | CrcPolynomial::Crc24B => 24,
            CrcPolynomial::Crc16 => 16,
        }
    }
}

/// CRC calculator with a byte-wise lookup table
#[derive(Clone)]
pub struct CrcCalculator {
    polynomial: CrcPolynomial,
    table: [u32; 256],
    mask: u32,
}

impl CrcCalculator {
    pub fn new(polynomial: CrcPolynomial) -> Self {
        let order = polynomial.order();
        let poly = polynomial.coefficients();
        let mask = (1u32 << order) - 1;
        let highbit = 1u32 << (order - 1);

        let mut table = [0u32; 256];
        for (byte, entry) in table.iter_mut().enumerate() {
            let mut remainder = (byte as u32) << (order - 8);
            for _ in 0..8 {
                remainder = if remainder & highbit != 0 {
                    (remainder << 1) ^ poly
                } else {
                    remainder << 1
                };
            }
            *entry = remainder & mask;
        }

        Self { polynomial, table, mask }
    }

    pub fn polynomial(&self) -> CrcPolynomial {
        self.polynomial
    }

    /// CRC of a byte-aligned message (MSB first)
    pub fn calculate_bytes(&self, data: &[u8]) -> u32 {
        let shift = self.polynomial.order() - 8;
        data.iter().fold(0u32, |crc, &byte| {
            let index = ((crc >> shift) ^ byte as u32) & 0xFF;
            ((crc << 8) ^ self.table[index as usize]) & self.mask
        })
    }

    /// CRC of an unpacked message holding one bit per byte
    pub fn calculate_bits(&self, bits: &[u8]) -> u32 {
        let order = self.polynomial.order();
        let poly = self.polynomial.coefficients();

        bits.iter().fold(0u32, |crc, &bit| {
            let feedback = ((crc >> (order - 1)) ^ bit as u32) & 1;
            let shifted = (crc << 1) & self.mask;
            if feedback != 0 {
                shifted ^ poly
            } else {
                shifted
            }
        })
    }
}

/// Transport block CRC polynomial for a given TBS in bits
pub fn tb_crc_polynomial(tbs_bits: usize) -> CrcPolynomial {
    if tbs_bits > 3824 {
        CrcPolynomial::Crc24A
    } else {
        CrcPolynomial::Crc16
    }
}
