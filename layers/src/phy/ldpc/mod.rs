/// LDPC channel coding for the 5G NR shared channel
/// Based on 3GPP TS 38.212 Sections 5.2.2, 5.3.2 and 5.4.2
///
/// Segmentation parameters are pure functions of the transport block size,
/// the base graph and the number of codeblocks.

pub mod base_graph;
pub mod encoder;
pub mod rate_matcher;

pub use base_graph::{nof_systematic_columns, BaseGraphDescription};
pub use encoder::{LdpcEncoder, LdpcEncoderConfig, QcLdpcEncoder};
pub use rate_matcher::{LdpcRateMatcher, RateMatcherConfig};

use super::crc::tb_crc_polynomial;
use common::{divide_ceil, LdpcBaseGraph};

/// Marker for filler bits in unpacked bit buffers
pub const FILLER_BIT: u8 = 254;

/// LDPC lifting sizes as per Table 5.3.2-1, in ascending order
pub const LIFTING_SIZES: [usize; 51] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 18, 20, 22, 24,
    26, 28, 30, 32, 36, 40, 44, 48, 52, 56, 60, 64, 72, 80, 88, 96, 104,
    112, 120, 128, 144, 160, 176, 192, 208, 224, 240, 256, 288, 320, 352, 384
];

/// Maximum code block size for each base graph
const MAX_CB_SIZE_BG1: usize = 8448;
const MAX_CB_SIZE_BG2: usize = 3840;

/// Codeblock CRC length when the transport block is segmented
pub const CB_CRC_SIZE: usize = 24;

/// Limited buffer rate matching code rate R_LBRM = 2/3
const LBRM_RATE_NUM: usize = 2;
const LBRM_RATE_DEN: usize = 3;

fn max_codeblock_size(base_graph: LdpcBaseGraph) -> usize {
    match base_graph {
        LdpcBaseGraph::BaseGraph1 => MAX_CB_SIZE_BG1,
        LdpcBaseGraph::BaseGraph2 => MAX_CB_SIZE_BG2,
    }
}

/// Transport block CRC length in bits
pub fn compute_tb_crc_size(tbs_bits: usize) -> usize {
    tb_crc_polynomial(tbs_bits).order()
}

/// Number of codeblocks a transport block is segmented into
pub fn compute_nof_codeblocks(tbs_bits: usize, base_graph: LdpcBaseGraph) -> usize {
    let b = tbs_bits + compute_tb_crc_size(tbs_bits);
    let kcb = max_codeblock_size(base_graph);

    if b <= kcb {
        1
    } else {
        divide_ceil(b, kcb - CB_CRC_SIZE)
    }
}

/// Lifting size Z for the given segmentation
pub fn compute_lifting_size(tbs_bits: usize, base_graph: LdpcBaseGraph, nof_cb: usize) -> usize {
    let b = tbs_bits + compute_tb_crc_size(tbs_bits);
    let cb_crc = if nof_cb > 1 { CB_CRC_SIZE } else { 0 };
    let k_prime = divide_ceil(b + nof_cb * cb_crc, nof_cb);
    let kb = nof_systematic_columns(base_graph, b);

    LIFTING_SIZES
        .iter()
        .copied()
        .find(|&z| kb * z >= k_prime)
        .unwrap_or(LIFTING_SIZES[LIFTING_SIZES.len() - 1])
}

/// Codeblock size K (information bits including filler) for a lifting size
pub fn compute_codeblock_size(base_graph: LdpcBaseGraph, lifting_size: usize) -> usize {
    match base_graph {
        LdpcBaseGraph::BaseGraph1 => 22 * lifting_size,
        LdpcBaseGraph::BaseGraph2 => 10 * lifting_size,
    }
}

/// Encoded codeblock length N for a codeblock size K
pub fn compute_full_codeblock_size(base_graph: LdpcBaseGraph, codeblock_size: usize) -> usize {
    match base_graph {
        // N = 66 Z = 3 K
        LdpcBaseGraph::BaseGraph1 => 3 * codeblock_size,
        // N = 50 Z = 5 K
        LdpcBaseGraph::BaseGraph2 => 5 * codeblock_size,
    }
}

/// Limited circular buffer size N_ref; zero when the buffer is not limited
pub fn compute_n_ref(tbs_lbrm_bytes: usize, nof_cb: usize) -> usize {
    if tbs_lbrm_bytes == 0 {
        return 0;
    }
    (tbs_lbrm_bytes * 8 * LBRM_RATE_DEN) / (nof_cb * LBRM_RATE_NUM)
}
