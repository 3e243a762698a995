/// Systematic quasi-cyclic LDPC encoder
/// Based on 3GPP TS 38.212 Section 5.3.2

use super::base_graph::{core_entries, BaseGraphDescription, NOF_CORE_ROWS};
use super::FILLER_BIT;
use common::LdpcBaseGraph;
use tracing::trace;

/// Columns removed from the start of every codeword
const NOF_PUNCTURED_COLUMNS: usize = 2;

/// Encoder configuration for one codeblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LdpcEncoderConfig {
    pub base_graph: LdpcBaseGraph,
    pub lifting_size: usize,
}

/// LDPC encoder operating on unpacked bits
pub trait LdpcEncoder: Send {
    /// Encode `input` (K bits, filler marked with `FILLER_BIT`) into `output`
    ///
    /// The output holds N bits: the codeword without its first 2Z systematic
    /// bits. Filler positions keep the `FILLER_BIT` marker.
    fn encode(&mut self, output: &mut [u8], input: &[u8], config: &LdpcEncoderConfig);
}

/// XOR the block cyclically shifted by `shift` into `acc`
#[inline]
fn accumulate_shifted(acc: &mut [u8], block: &[u8], shift: usize) {
    let z = acc.len();
    let (head, tail) = acc.split_at_mut(z - shift);
    head.iter_mut().zip(&block[shift..]).for_each(|(a, b)| *a ^= b);
    tail.iter_mut().zip(&block[..shift]).for_each(|(a, b)| *a ^= b);
}

/// Encoder over the quasi-cyclic base graphs, buffers reused across codeblocks
#[derive(Debug, Default)]
pub struct QcLdpcEncoder {
    codeword: Vec<u8>,
    lambda: Vec<u8>,
    rhs: Vec<u8>,
}

impl QcLdpcEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn solve_core(&mut self, graph: &BaseGraphDescription, z: usize) {
        let kb = graph.nof_systematic();
        self.lambda.clear();
        self.lambda.resize(NOF_CORE_ROWS * z, 0);

        for (r, lambda) in self.lambda.chunks_exact_mut(z).enumerate() {
            for entry in graph.row(r).iter().filter(|e| e.column < kb) {
                let block = &self.codeword[entry.column * z..(entry.column + 1) * z];
                accumulate_shifted(lambda, block, entry.shift);
            }
        }

        // Summing the four core rows leaves P^x p0 alone
        let schedule = graph.core_schedule();
        self.rhs.clear();
        self.rhs.resize(z, 0);
        for lambda in self.lambda.chunks_exact(z) {
            self.rhs.iter_mut().zip(lambda).for_each(|(a, b)| *a ^= b);
        }
        let p0 = &mut self.codeword[kb * z..(kb + 1) * z];
        p0.fill(0);
        accumulate_shifted(p0, &self.rhs, (z - schedule.p0_shift) % z);

        for &(r, column) in &schedule.steps {
            self.rhs.copy_from_slice(&self.lambda[r * z..(r + 1) * z]);
            let mut unknown_shift = 0;
            for entry in core_entries(graph.row(r), kb) {
                if entry.column == column {
                    unknown_shift = entry.shift;
                } else {
                    let block = &self.codeword[entry.column * z..(entry.column + 1) * z];
                    accumulate_shifted(&mut self.rhs, block, entry.shift);
                }
            }
            let parity = &mut self.codeword[column * z..(column + 1) * z];
            parity.fill(0);
            accumulate_shifted(parity, &self.rhs, (z - unknown_shift) % z);
        }
    }

    fn solve_extension(&mut self, graph: &BaseGraphDescription, z: usize) {
        let kb = graph.nof_systematic();
        let (known, extension) = self.codeword.split_at_mut((kb + NOF_CORE_ROWS) * z);

        for (r, parity) in (NOF_CORE_ROWS..graph.nof_rows()).zip(extension.chunks_exact_mut(z)) {
            parity.fill(0);
            for entry in graph.row(r).iter().filter(|e| e.column < kb + NOF_CORE_ROWS) {
                let block = &known[entry.column * z..(entry.column + 1) * z];
                accumulate_shifted(parity, block, entry.shift);
            }
        }
    }
}

impl LdpcEncoder for QcLdpcEncoder {
    fn encode(&mut self, output: &mut [u8], input: &[u8], config: &LdpcEncoderConfig) {
        let z = config.lifting_size;
        let Some(graph) = BaseGraphDescription::get(config.base_graph, z) else {
            panic!("Invalid lifting size {} for {:?}", z, config.base_graph);
        };
        let kb = graph.nof_systematic();
        let nof_columns = graph.nof_columns();

        assert_eq!(input.len(), kb * z, "Codeblock size mismatch");
        assert_eq!(
            output.len(),
            (nof_columns - NOF_PUNCTURED_COLUMNS) * z,
            "Encoded codeblock size mismatch"
        );

        self.codeword.clear();
        self.codeword.resize(nof_columns * z, 0);
        for (dst, &bit) in self.codeword.iter_mut().zip(input) {
            *dst = if bit == FILLER_BIT { 0 } else { bit & 1 };
        }

        self.solve_core(graph, z);
        self.solve_extension(graph, z);

        let punctured = NOF_PUNCTURED_COLUMNS * z;
        output.copy_from_slice(&self.codeword[punctured..]);
        for (dst, &bit) in output.iter_mut().zip(&input[punctured..]) {
            if bit == FILLER_BIT {
                *dst = FILLER_BIT;
            }
        }

        trace!("LDPC encoded {} bits into {} bits (Z={})", input.len(), output.len(), z);
    }
}
