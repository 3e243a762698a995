/// Transport block segmentation and rate matching lengths
/// Based on 3GPP TS 38.212 Sections 5.2.2, 5.4.2.1 and 7.2
///
/// All parameters are derived once per transport block and stay read-only
/// while the codeblocks are processed.

use super::codeblock_processor::CodeblockConfig;
use crate::phy::ldpc::{
    compute_codeblock_size, compute_full_codeblock_size, compute_lifting_size, compute_n_ref,
    compute_nof_codeblocks, compute_tb_crc_size, CB_CRC_SIZE,
};
use common::{divide_ceil, LdpcBaseGraph, ModulationScheme};
use tracing::debug;

/// Parameters shared by every codeblock of a transport block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeblockCommonMetadata {
    pub base_graph: LdpcBaseGraph,
    pub lifting_size: usize,
    pub rv: u8,
    pub modulation: ModulationScheme,
    /// Limited circular buffer size, zero if unlimited
    pub n_ref: usize,
    /// Codeword length in bits
    pub cw_length: usize,
}

/// Parameters of one codeblock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeblockSpecificMetadata {
    /// Encoded length N
    pub full_length: usize,
    /// Rate matched length E in bits
    pub rm_length: usize,
    /// First codeword bit, used to advance the scrambling sequence
    pub cw_offset: usize,
    /// First RE of the codeblock within the allocation
    pub re_offset: usize,
    /// Number of REs the codeblock occupies
    pub rm_length_re: usize,
    pub nof_filler_bits: usize,
    /// Codeblock CRC length, zero for unsegmented transport blocks
    pub nof_crc_bits: usize,
}

/// Segmentation of one transport block onto its allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdschSegmentation {
    pub tbs_bits: usize,
    pub nof_tb_crc_bits: usize,
    /// Transport block data bits plus TB CRC and zero padding per codeblock
    pub cb_info_bits: usize,
    pub zero_pad: usize,
    /// Codeblock size K, filler included
    pub segment_length: usize,
    pub nof_short_segments: usize,
    pub common: CodeblockCommonMetadata,
    pub codeblocks: Vec<CodeblockSpecificMetadata>,
}

impl PdschSegmentation {
    /// Derive the segmentation of `tbs_bits` over `nof_re` REs per layer
    ///
    /// Panics if the rate matching lengths do not add up to the codeword.
    pub fn derive(
        tbs_bits: usize,
        base_graph: LdpcBaseGraph,
        modulation: ModulationScheme,
        rv: u8,
        tbs_lbrm_bytes: usize,
        nof_re: usize,
        nof_layers: usize,
    ) -> Self {
        let nof_cb = compute_nof_codeblocks(tbs_bits, base_graph);
        let nof_tb_crc_bits = compute_tb_crc_size(tbs_bits);
        let nof_cb_crc_bits = if nof_cb > 1 { CB_CRC_SIZE } else { 0 };
        let nof_tb_bits_out = tbs_bits + nof_tb_crc_bits + nof_cb * nof_cb_crc_bits;

        let lifting_size = compute_lifting_size(tbs_bits, base_graph, nof_cb);
        let segment_length = compute_codeblock_size(base_graph, lifting_size);
        let full_length = compute_full_codeblock_size(base_graph, segment_length);
        let cb_info_bits = divide_ceil(nof_tb_bits_out, nof_cb) - nof_cb_crc_bits;
        let zero_pad = (cb_info_bits + nof_cb_crc_bits) * nof_cb - nof_tb_bits_out;
        assert!(
            cb_info_bits + nof_cb_crc_bits <= segment_length,
            "Codeblock of {} bits exceeds segment length {}",
            cb_info_bits + nof_cb_crc_bits,
            segment_length
        );

        let qm = modulation.bits_per_symbol();
        let cw_length = nof_re * nof_layers * qm;
        // A single codeblock takes every RE and counts as long
        let nof_short_segments = if nof_cb == 1 { 0 } else { nof_cb - (nof_re % nof_cb) };
        let short_re = nof_re / nof_cb;
        let long_re = divide_ceil(nof_re, nof_cb);

        let mut cw_offset = 0;
        let mut re_offset = 0;
        let codeblocks: Vec<CodeblockSpecificMetadata> = (0..nof_cb)
            .map(|i| {
                let rm_length_re = if i < nof_short_segments { short_re } else { long_re };
                let rm_length = rm_length_re * nof_layers * qm;
                let metadata = CodeblockSpecificMetadata {
                    full_length,
                    rm_length,
                    cw_offset,
                    re_offset,
                    rm_length_re,
                    nof_filler_bits: segment_length - cb_info_bits - nof_cb_crc_bits,
                    nof_crc_bits: nof_cb_crc_bits,
                };
                cw_offset += rm_length;
                re_offset += rm_length_re;
                metadata
            })
            .collect();

        assert_eq!(
            cw_offset, cw_length,
            "Rate matching lengths add up to {} bits, codeword holds {}",
            cw_offset, cw_length
        );

        debug!(
            "Segmentation: TBS={} C={} Z={} K={} short={} G={}",
            tbs_bits, nof_cb, lifting_size, segment_length, nof_short_segments, cw_length
        );

        Self {
            tbs_bits,
            nof_tb_crc_bits,
            cb_info_bits,
            zero_pad,
            segment_length,
            nof_short_segments,
            common: CodeblockCommonMetadata {
                base_graph,
                lifting_size,
                rv,
                modulation,
                n_ref: compute_n_ref(tbs_lbrm_bytes, nof_cb),
                cw_length,
            },
            codeblocks,
        }
    }

    pub fn nof_codeblocks(&self) -> usize {
        self.codeblocks.len()
    }

    /// Whether codeblocks carry their own CRC
    pub fn has_cb_crc(&self) -> bool {
        self.codeblocks.len() > 1
    }

    /// Transport block data bits carried by codeblock `index`
    pub fn nof_info_bits(&self, index: usize) -> usize {
        self.cb_info_bits.min(self.tbs_bits - self.tb_offset(index))
    }

    /// First transport block bit carried by codeblock `index`
    pub fn tb_offset(&self, index: usize) -> usize {
        self.cb_info_bits * index
    }

    /// Processing configuration of codeblock `index`
    pub fn codeblock_config(&self, index: usize, c_init: u32) -> CodeblockConfig {
        CodeblockConfig {
            tb_offset: self.tb_offset(index),
            nof_info_bits: self.nof_info_bits(index),
            has_cb_crc: self.has_cb_crc(),
            zero_pad: self.zero_pad,
            c_init,
            common: self.common,
            specific: self.codeblocks[index],
        }
    }
}
