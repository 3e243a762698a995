/// PDSCH codeblock processing chain
/// Based on 3GPP TS 38.212 Sections 5.1 to 5.4 and TS 38.211 Sections 7.3.1.1 and 7.3.1.2
///
/// Builds one codeblock from the transport block, encodes, rate matches,
/// scrambles and modulates it. Codeblock bit layout:
/// `[data | TB CRC and zero padding (last codeblock) | CB CRC | filler]`.

use super::segmentation::{CodeblockCommonMetadata, CodeblockSpecificMetadata};
use crate::phy::crc::{tb_crc_polynomial, CrcCalculator, CrcPolynomial};
use crate::phy::ldpc::{
    compute_codeblock_size, LdpcEncoder, LdpcEncoderConfig, LdpcRateMatcher, QcLdpcEncoder,
    RateMatcherConfig, FILLER_BIT,
};
use crate::phy::modulation::modulate;
use crate::phy::sequence::PseudoRandomGenerator;
use common::{unpack_bits_into, unpack_value_bits};
use num_complex::Complex32;
use tracing::trace;

/// Configuration of one codeblock
#[derive(Debug, Clone, Copy)]
pub struct CodeblockConfig {
    /// First transport block bit carried by the codeblock
    pub tb_offset: usize,
    /// Transport block data bits carried by the codeblock
    pub nof_info_bits: usize,
    pub has_cb_crc: bool,
    /// Zero padding appended after the TB CRC in the last codeblock
    pub zero_pad: usize,
    /// Scrambling sequence initial state of the codeword
    pub c_init: u32,
    pub common: CodeblockCommonMetadata,
    pub specific: CodeblockSpecificMetadata,
}

/// Reusable codeblock processor; one instance serves one task at a time
pub struct PdschCodeblockProcessor {
    crc16: CrcCalculator,
    crc24a: CrcCalculator,
    crc24b: CrcCalculator,
    encoder: Box<dyn LdpcEncoder>,
    rate_matcher: LdpcRateMatcher,
    cb_bits: Vec<u8>,
    encoded: Vec<u8>,
    rm_bits: Vec<u8>,
    symbols: Vec<Complex32>,
}

impl Default for PdschCodeblockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdschCodeblockProcessor {
    pub fn new() -> Self {
        Self::with_encoder(Box::new(QcLdpcEncoder::new()))
    }

    pub fn with_encoder(encoder: Box<dyn LdpcEncoder>) -> Self {
        Self {
            crc16: CrcCalculator::new(CrcPolynomial::Crc16),
            crc24a: CrcCalculator::new(CrcPolynomial::Crc24A),
            crc24b: CrcCalculator::new(CrcPolynomial::Crc24B),
            encoder,
            rate_matcher: LdpcRateMatcher::new(),
            cb_bits: Vec::new(),
            encoded: Vec::new(),
            rm_bits: Vec::new(),
            symbols: Vec::new(),
        }
    }

    fn tb_crc(&self, tbs_bits: usize) -> &CrcCalculator {
        match tb_crc_polynomial(tbs_bits) {
            CrcPolynomial::Crc16 => &self.crc16,
            _ => &self.crc24a,
        }
    }

    /// Build, encode and rate match one codeblock
    ///
    /// Returns the rate matched bits before scrambling.
    pub fn encode(&mut self, tb: &[u8], config: &CodeblockConfig) -> &[u8] {
        let common = &config.common;
        let specific = &config.specific;
        let tbs_bits = tb.len() * 8;
        let segment_length = compute_codeblock_size(common.base_graph, common.lifting_size);
        let payload_length = segment_length - specific.nof_filler_bits - specific.nof_crc_bits;
        let nof_info_bits = config.nof_info_bits;

        assert!(
            config.tb_offset + nof_info_bits <= tbs_bits,
            "Codeblock reads bits {}..{} of a {} bit transport block",
            config.tb_offset,
            config.tb_offset + nof_info_bits,
            tbs_bits
        );

        self.cb_bits.clear();
        self.cb_bits.resize(segment_length, 0);
        unpack_bits_into(tb, config.tb_offset, &mut self.cb_bits[..nof_info_bits]);

        let mut length = nof_info_bits;
        if config.tb_offset + nof_info_bits == tbs_bits {
            let crc = self.tb_crc(tbs_bits);
            let order = crc.polynomial().order();
            let value = crc.calculate_bytes(tb);
            unpack_value_bits(value, order, &mut self.cb_bits[length..length + order]);
            // Padding bits are already zero
            length += order + config.zero_pad;
        }
        assert_eq!(
            length, payload_length,
            "Codeblock payload of {} bits, expected {}",
            length, payload_length
        );

        if config.has_cb_crc {
            let value = self.crc24b.calculate_bits(&self.cb_bits[..payload_length]);
            let crc_end = payload_length + specific.nof_crc_bits;
            unpack_value_bits(value, specific.nof_crc_bits, &mut self.cb_bits[payload_length..crc_end]);
        }
        self.cb_bits[segment_length - specific.nof_filler_bits..].fill(FILLER_BIT);

        self.encoded.clear();
        self.encoded.resize(specific.full_length, 0);
        self.encoder.encode(
            &mut self.encoded,
            &self.cb_bits,
            &LdpcEncoderConfig {
                base_graph: common.base_graph,
                lifting_size: common.lifting_size,
            },
        );

        self.rm_bits.clear();
        self.rm_bits.resize(specific.rm_length, 0);
        self.rate_matcher.rate_match(
            &mut self.rm_bits,
            &self.encoded,
            &RateMatcherConfig {
                rv: common.rv,
                modulation: common.modulation,
                n_ref: common.n_ref,
                base_graph: common.base_graph,
                lifting_size: common.lifting_size,
            },
        );

        &self.rm_bits
    }

    /// Process one codeblock into modulated symbols
    ///
    /// The scrambling sequence starts at the codeblock position in the codeword.
    pub fn process(&mut self, tb: &[u8], config: &CodeblockConfig) -> &[Complex32] {
        self.encode(tb, config);

        let mut scrambler = PseudoRandomGenerator::new(config.c_init);
        scrambler.advance(config.specific.cw_offset);
        scrambler.apply_xor_bits(&mut self.rm_bits);

        let qm = config.common.modulation.bits_per_symbol();
        self.symbols.clear();
        self.symbols.resize(self.rm_bits.len() / qm, Complex32::new(0.0, 0.0));
        modulate(&mut self.symbols, &self.rm_bits, config.common.modulation);

        trace!(
            "Codeblock at TB bit {}: {} info bits, {} symbols",
            config.tb_offset,
            config.nof_info_bits,
            self.symbols.len()
        );
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::pdsch::segmentation::PdschSegmentation;
    use common::{unpack_bits, LdpcBaseGraph, ModulationScheme};

    fn config_for(seg: &PdschSegmentation, index: usize, c_init: u32) -> CodeblockConfig {
        seg.codeblock_config(index, c_init)
    }

    fn transport_block(nof_bytes: usize) -> Vec<u8> {
        (0..nof_bytes).map(|i| (i * 37 + 11) as u8).collect()
    }

    #[test]
    fn test_systematic_bits_and_crc() {
        // Single codeblock on BG2, rv 0, no LBRM: the rate matched output
        // starts with the codeblock from bit 2Z onwards.
        let tb = transport_block(50);
        let seg = PdschSegmentation::derive(400, LdpcBaseGraph::BaseGraph2, ModulationScheme::Qpsk, 0, 0, 600, 1);
        let z = seg.common.lifting_size;
        let config = config_for(&seg, 0, 0);

        let mut processor = PdschCodeblockProcessor::new();
        let rm = processor.encode(&tb, &config).to_vec();
        assert_eq!(rm.len(), 1200);

        let mut expected = unpack_bits(&tb);
        let crc = CrcCalculator::new(CrcPolynomial::Crc16).calculate_bytes(&tb);
        let mut crc_bits = [0u8; 16];
        unpack_value_bits(crc, 16, &mut crc_bits);
        expected.extend_from_slice(&crc_bits);

        // Interleaving over Qm = 2 rows: column-wise reads alternate between halves
        let half = rm.len() / 2;
        let deinterleaved: Vec<u8> = (0..half)
            .map(|i| rm[2 * i])
            .chain((0..half).map(|i| rm[2 * i + 1]))
            .collect();
        assert_eq!(&deinterleaved[..expected.len() - 2 * z], &expected[2 * z..]);
    }

    #[test]
    fn test_segmented_block_carries_cb_crc() {
        let tb = transport_block(1000);
        let seg = PdschSegmentation::derive(8000, LdpcBaseGraph::BaseGraph2, ModulationScheme::Qam16, 0, 0, 4000, 1);
        assert!(seg.nof_codeblocks() > 1);

        let mut processor = PdschCodeblockProcessor::new();
        for index in 0..seg.nof_codeblocks() {
            let config = config_for(&seg, index, 0x1234);
            processor.encode(&tb, &config);

            // Payload followed by its CRC24B divides evenly
            let payload_with_crc = seg.cb_info_bits + 24;
            let remainder = CrcCalculator::new(CrcPolynomial::Crc24B)
                .calculate_bits(&processor.cb_bits[..payload_with_crc]);
            assert_eq!(remainder, 0, "CB {}", index);
            assert!(processor.cb_bits[payload_with_crc..].iter().all(|&b| b == FILLER_BIT));
        }
    }

    #[test]
    fn test_last_codeblock_carries_tb_crc() {
        // 20000 bits on BG1: three codeblocks and one bit of zero padding
        let tb = transport_block(2500);
        let seg = PdschSegmentation::derive(20_000, LdpcBaseGraph::BaseGraph1, ModulationScheme::Qpsk, 0, 0, 9000, 1);
        assert_eq!(seg.nof_codeblocks(), 3);
        assert_eq!(seg.zero_pad, 1);
        let last = seg.nof_codeblocks() - 1;

        let mut processor = PdschCodeblockProcessor::new();
        processor.encode(&tb, &config_for(&seg, last, 0));

        let nof_info = seg.nof_info_bits(last);
        let mut data = vec![0u8; seg.tbs_bits];
        unpack_bits_into(&tb, 0, &mut data);
        let remainder = CrcCalculator::new(CrcPolynomial::Crc24A).calculate_bits(
            &[&data[..], &processor.cb_bits[nof_info..nof_info + 24]].concat(),
        );
        assert_eq!(remainder, 0);
        assert!(processor.cb_bits[nof_info + 24..nof_info + 24 + seg.zero_pad].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_scrambling_offset() {
        let tb = transport_block(125);
        let seg = PdschSegmentation::derive(1000, LdpcBaseGraph::BaseGraph2, ModulationScheme::Qpsk, 0, 0, 800, 1);
        let mut config = config_for(&seg, 0, 0x5A5A);
        let mut processor = PdschCodeblockProcessor::new();

        let plain = processor.encode(&tb, &config).to_vec();
        config.specific.cw_offset = 7;
        let symbols = processor.process(&tb, &config).to_vec();
        assert_eq!(symbols.len(), 800);

        let mut sequence = PseudoRandomGenerator::new(0x5A5A);
        sequence.advance(7);
        let mut scrambled = plain.clone();
        sequence.apply_xor_bits(&mut scrambled);
        for (i, symbol) in symbols.iter().enumerate() {
            let expected_re = 1.0 - 2.0 * scrambled[2 * i] as f32;
            let expected_im = 1.0 - 2.0 * scrambled[2 * i + 1] as f32;
            assert_eq!(*symbol, Complex32::new(expected_re, expected_im));
        }
    }
}
