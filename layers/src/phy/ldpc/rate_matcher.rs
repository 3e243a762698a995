/// LDPC rate matching: bit selection and bit interleaving
/// Based on 3GPP TS 38.212 Section 5.4.2

use super::FILLER_BIT;
use common::{LdpcBaseGraph, ModulationScheme};

/// Rate matching parameters shared by the codeblocks of a transport block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateMatcherConfig {
    /// Redundancy version (0..=3)
    pub rv: u8,
    pub modulation: ModulationScheme,
    /// Limited buffer size N_ref; zero disables LBRM
    pub n_ref: usize,
    pub base_graph: LdpcBaseGraph,
    pub lifting_size: usize,
}

impl RateMatcherConfig {
    /// Starting position k0 in a circular buffer of size `ncb` (Table 5.4.2.1-2)
    pub fn start_position(&self, ncb: usize) -> usize {
        let z = self.lifting_size;
        let (numerators, denominator) = match self.base_graph {
            LdpcBaseGraph::BaseGraph1 => ([0usize, 17, 33, 56], 66),
            LdpcBaseGraph::BaseGraph2 => ([0usize, 13, 25, 43], 50),
        };
        (numerators[self.rv as usize & 3] * ncb) / (denominator * z) * z
    }
}

/// Rate matcher with a reusable selection buffer
#[derive(Debug, Default)]
pub struct LdpcRateMatcher {
    selected: Vec<u8>,
}

impl LdpcRateMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rate match one encoded codeblock into `output` (E bits)
    ///
    /// `input` is the full encoded codeblock of N bits, possibly containing
    /// filler markers. The output never contains filler bits.
    pub fn rate_match(&mut self, output: &mut [u8], input: &[u8], config: &RateMatcherConfig) {
        let n = input.len();
        let ncb = if config.n_ref > 0 { n.min(config.n_ref) } else { n };
        let e = output.len();
        let qm = config.modulation.bits_per_symbol();

        assert!(ncb > 0, "Empty circular buffer");
        assert_eq!(e % qm, 0, "Rate matching length {} is not a multiple of Qm={}", e, qm);

        self.select_bits(input, ncb, config.start_position(ncb), e);
        interleave_bits(output, &self.selected, qm);
    }

    fn select_bits(&mut self, input: &[u8], ncb: usize, k0: usize, e: usize) {
        self.selected.clear();
        self.selected.reserve(e);

        let mut index = k0 % ncb;
        let mut visited = 0;
        while self.selected.len() < e {
            let bit = input[index];
            if bit != FILLER_BIT {
                self.selected.push(bit);
            }
            index += 1;
            if index == ncb {
                index = 0;
            }
            visited += 1;
            assert!(
                visited <= ncb || !self.selected.is_empty(),
                "Circular buffer holds only filler bits"
            );
        }
    }
}

/// Row-column interleaver: f[i + j Qm] = e[i E/Qm + j]
fn interleave_bits(output: &mut [u8], input: &[u8], qm: usize) {
    let rows = input.len() / qm;
    for (j, symbol) in output.chunks_exact_mut(qm).enumerate() {
        for (i, bit) in symbol.iter_mut().enumerate() {
            *bit = input[i * rows + j];
        }
    }
}
