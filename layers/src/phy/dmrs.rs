/// DMRS (Demodulation Reference Signal) generation for PDSCH
/// Based on 3GPP TS 38.211 Section 7.4.1.1

use super::precoding::PrecodingMatrix;
use super::re_pattern::{RePattern, SymbolMask};
use super::resource_grid::ResourceGridWriter;
use super::sequence::PseudoRandomGenerator;
use common::NOF_SUBCARRIERS_PER_RB;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// DMRS configuration type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmrsType {
    Type1,
    Type2,
}

impl DmrsType {
    /// Get number of DMRS per resource block
    pub fn nof_dmrs_per_rb(&self) -> usize {
        match self {
            DmrsType::Type1 => 6,  // Every other subcarrier
            DmrsType::Type2 => 4,  // Two groups of 2 consecutive subcarriers
        }
    }

    /// Number of CDM groups
    pub fn nof_cdm_groups(&self) -> usize {
        match self {
            DmrsType::Type1 => 2,
            DmrsType::Type2 => 3,
        }
    }

    /// Maximum number of layers with single-symbol DMRS
    pub fn max_nof_layers(&self) -> usize {
        match self {
            DmrsType::Type1 => 4,
            DmrsType::Type2 => 6,
        }
    }

    /// CDM group of an antenna port (port index relative to 1000)
    pub fn cdm_group(&self, dmrs_port: usize) -> usize {
        (dmrs_port / 2) % self.nof_cdm_groups()
    }

    /// Subcarriers of a CDM group within a resource block
    pub fn cdm_group_subcarriers(&self, cdm_group: usize) -> Vec<usize> {
        match self {
            DmrsType::Type1 => (0..6).map(|k| 2 * k + cdm_group).collect(),
            DmrsType::Type2 => [0, 1, 6, 7].iter().map(|k| k + 2 * cdm_group).collect(),
        }
    }

    /// Position within the DMRS sequence of subcarrier `k` counted from the reference point
    ///
    /// Only meaningful for subcarriers of the given CDM group.
    pub fn sequence_index(&self, k: usize, cdm_group: usize) -> usize {
        match self {
            DmrsType::Type1 => (k - cdm_group) / 2,
            DmrsType::Type2 => {
                let k = k - 2 * cdm_group;
                2 * (k / 6) + k % 6
            }
        }
    }
}

/// CDM weights for PDSCH DMRS
#[derive(Debug, Clone)]
pub struct DmrsWeights {
    /// Frequency domain weights [w_f(0), w_f(1)]
    pub w_f: [f32; 2],
    /// Time domain weights [w_t(0), w_t(1)]
    pub w_t: [f32; 2],
}

/// Get DMRS parameters for PDSCH based on type and port
///
/// Returns the subcarriers used within a resource block and the CDM weights
/// (Tables 7.4.1.1.2-1 and 7.4.1.1.2-2).
pub fn get_pdsch_dmrs_params(dmrs_type: DmrsType, dmrs_port: u8) -> (Vec<u8>, DmrsWeights) {
    match dmrs_type {
        DmrsType::Type1 => {
            match dmrs_port {
                0 => (vec![0, 2, 4, 6, 8, 10], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, 1.0] }),
                1 => (vec![0, 2, 4, 6, 8, 10], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, 1.0] }),
                2 => (vec![1, 3, 5, 7, 9, 11], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, 1.0] }),
                3 => (vec![1, 3, 5, 7, 9, 11], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, 1.0] }),
                4 => (vec![0, 2, 4, 6, 8, 10], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, -1.0] }),
                5 => (vec![0, 2, 4, 6, 8, 10], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, -1.0] }),
                6 => (vec![1, 3, 5, 7, 9, 11], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, -1.0] }),
                7 => (vec![1, 3, 5, 7, 9, 11], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, -1.0] }),
                _ => panic!("Invalid DMRS port {} for Type1", dmrs_port),
            }
        }
        DmrsType::Type2 => {
            match dmrs_port {
                0 => (vec![0, 1, 6, 7], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, 1.0] }),
                1 => (vec![0, 1, 6, 7], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, 1.0] }),
                2 => (vec![2, 3, 8, 9], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, 1.0] }),
                3 => (vec![2, 3, 8, 9], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, 1.0] }),
                4 => (vec![4, 5, 10, 11], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, 1.0] }),
                5 => (vec![4, 5, 10, 11], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, 1.0] }),
                6 => (vec![0, 1, 6, 7], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, -1.0] }),
                7 => (vec![0, 1, 6, 7], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, -1.0] }),
                8 => (vec![2, 3, 8, 9], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, -1.0] }),
                9 => (vec![2, 3, 8, 9], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, -1.0] }),
                10 => (vec![4, 5, 10, 11], DmrsWeights { w_f: [1.0, 1.0], w_t: [1.0, -1.0] }),
                11 => (vec![4, 5, 10, 11], DmrsWeights { w_f: [1.0, -1.0], w_t: [1.0, -1.0] }),
                _ => panic!("Invalid DMRS port {} for Type2", dmrs_port),
            }
        }
    }
}

/// Calculate PDSCH DMRS initialization value
/// c_init = (2^17 * (14 * n_slot + l + 1) * (2 * N_ID + 1) + 2 * N_ID + n_SCID) mod 2^31
pub fn calculate_pdsch_dmrs_cinit(slot: u32, symbol: usize, n_id: u16, n_scid: bool) -> u32 {
    let l = symbol as u64;
    let n_symb_slot = 14u64; // Normal CP
    let n_id = n_id as u64;
    let scid = n_scid as u64;
    (((1u64 << 17) * (n_symb_slot * slot as u64 + l + 1) * (2 * n_id + 1) + 2 * n_id + scid)
        & 0x7FFF_FFFF) as u32
}

/// DMRS RE pattern reserved in the PDSCH allocation
///
/// Covers the CDM groups `0..nof_cdm_groups_without_data` over the whole BWP.
pub fn dmrs_pattern(
    dmrs_type: DmrsType,
    bwp_start_rb: usize,
    bwp_size_rb: usize,
    nof_cdm_groups_without_data: usize,
    symbols: SymbolMask,
) -> RePattern {
    let mut prb_mask = vec![false; bwp_start_rb + bwp_size_rb];
    prb_mask[bwp_start_rb..].fill(true);

    let mut re_mask = [false; NOF_SUBCARRIERS_PER_RB];
    for cdm_group in 0..nof_cdm_groups_without_data {
        for k in dmrs_type.cdm_group_subcarriers(cdm_group) {
            re_mask[k] = true;
        }
    }

    RePattern::new(prb_mask, re_mask, symbols)
}

/// Parameters for mapping PDSCH DMRS into a grid
#[derive(Debug, Clone)]
pub struct DmrsPdschConfig {
    pub slot: u32,
    pub dmrs_type: DmrsType,
    /// N_ID for the DMRS sequence
    pub scrambling_id: u16,
    pub n_scid: bool,
    /// Linear amplitude applied on top of the QPSK normalisation
    pub amplitude: f32,
    /// RB where the sequence starts, counted from the grid origin
    pub reference_point_k_rb: usize,
    pub symbols: SymbolMask,
    /// Allocated PRBs counted from the grid origin
    pub rb_mask: Vec<bool>,
    /// Layer i uses DMRS port i
    pub precoding: PrecodingMatrix,
}

/// PDSCH DMRS generator and mapper
#[derive(Debug, Default)]
pub struct DmrsPdschProcessor {
    sequence: Vec<Complex32>,
    layer_values: Vec<Complex32>,
}

impl DmrsPdschProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the DMRS sequence of one symbol for the allocated RBs
    fn generate_sequence(&mut self, config: &DmrsPdschConfig, symbol: usize) {
        let nof_dmrs_per_rb = config.dmrs_type.nof_dmrs_per_rb();
        let c_init = calculate_pdsch_dmrs_cinit(config.slot, symbol, config.scrambling_id, config.n_scid);
        let mut generator = PseudoRandomGenerator::new(c_init);
        let amplitude = config.amplitude * std::f32::consts::FRAC_1_SQRT_2;

        self.sequence.clear();
        let mut current_rb = config.reference_point_k_rb;
        for (rb, _) in config.rb_mask.iter().enumerate().filter(|(_, &allocated)| allocated) {
            // Skip symbols between current position and this RB
            if rb > current_rb {
                generator.skip_symbols((rb - current_rb) * nof_dmrs_per_rb);
            }
            for _ in 0..nof_dmrs_per_rb {
                self.sequence.push(generator.next_qpsk_symbol(amplitude));
            }
            current_rb = rb + 1;
        }
    }

    /// Map DMRS for every layer of the precoding matrix
    pub fn map(&mut self, grid: &dyn ResourceGridWriter, config: &DmrsPdschConfig) {
        let nof_layers = config.precoding.nof_layers();
        let nof_dmrs_per_rb = config.dmrs_type.nof_dmrs_per_rb();
        let weights: Vec<DmrsWeights> = (0..nof_layers)
            .map(|layer| get_pdsch_dmrs_params(config.dmrs_type, layer as u8).1)
            .collect();

        let mut cdm_groups: Vec<usize> = (0..nof_layers).map(|l| config.dmrs_type.cdm_group(l)).collect();
        cdm_groups.sort_unstable();
        cdm_groups.dedup();

        for symbol in config.symbols.iter() {
            self.generate_sequence(config, symbol);

            for &cdm_group in &cdm_groups {
                let subcarriers = config.dmrs_type.cdm_group_subcarriers(cdm_group);
                let allocated = config.rb_mask.iter().enumerate().filter(|(_, &a)| a).map(|(rb, _)| rb);

                for (i_rb, rb) in allocated.enumerate() {
                    for (j, &k) in subcarriers.iter().enumerate() {
                        let r = self.sequence[i_rb * nof_dmrs_per_rb + j];

                        self.layer_values.clear();
                        self.layer_values.extend((0..nof_layers).map(|layer| {
                            if config.dmrs_type.cdm_group(layer) == cdm_group {
                                // Single-symbol DMRS: w_t(0) = 1
                                r * weights[layer].w_f[j % 2] * weights[layer].w_t[0]
                            } else {
                                Complex32::new(0.0, 0.0)
                            }
                        }));

                        let subcarrier = rb * NOF_SUBCARRIERS_PER_RB + k;
                        for port in 0..config.precoding.nof_ports() {
                            grid.put(port, symbol, subcarrier, config.precoding.apply(port, &self.layer_values));
                        }
                    }
                }
            }
        }

        trace!(
            "Mapped DMRS {:?} on {} symbols, {} layers",
            config.dmrs_type,
            config.symbols.count(),
            nof_layers
        );
    }
}

/// Sequence value of one DMRS RE, generated from scratch
///
/// Used where only a handful of REs are needed (PT-RS).
pub fn dmrs_sequence_value(
    slot: u32,
    symbol: usize,
    scrambling_id: u16,
    n_scid: bool,
    sequence_index: usize,
    amplitude: f32,
) -> Complex32 {
    let mut generator = PseudoRandomGenerator::new(calculate_pdsch_dmrs_cinit(slot, symbol, scrambling_id, n_scid));
    generator.skip_symbols(sequence_index);
    generator.next_qpsk_symbol(amplitude * std::f32::consts::FRAC_1_SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phy::resource_grid::{ResourceGrid, ResourceGridReader};

    fn config(dmrs_type: DmrsType, nof_layers: usize, rb_mask: Vec<bool>) -> DmrsPdschConfig {
        DmrsPdschConfig {
            slot: 3,
            dmrs_type,
            scrambling_id: 500,
            n_scid: false,
            amplitude: 1.0,
            reference_point_k_rb: 0,
            symbols: SymbolMask::from_symbols(&[2]),
            rb_mask,
            precoding: PrecodingMatrix::identity(nof_layers),
        }
    }

    #[test]
    fn test_pdsch_dmrs_cinit() {
        assert_eq!(calculate_pdsch_dmrs_cinit(0, 2, 0, false), 3 << 17);
        assert_eq!(calculate_pdsch_dmrs_cinit(0, 0, 1, true), (1 << 17) * 3 + 3);
        // Large values wrap modulo 2^31
        let c_init = calculate_pdsch_dmrs_cinit(159, 13, 65535, true);
        assert_eq!(c_init & 0x7FFF_FFFF, c_init);
    }

    #[test]
    fn test_cdm_groups() {
        assert_eq!(DmrsType::Type1.cdm_group(0), 0);
        assert_eq!(DmrsType::Type1.cdm_group(3), 1);
        assert_eq!(DmrsType::Type2.cdm_group(5), 2);
        assert_eq!(DmrsType::Type2.cdm_group_subcarriers(1), vec![2, 3, 8, 9]);

        for port in 0..4u8 {
            let (subcarriers, _) = get_pdsch_dmrs_params(DmrsType::Type1, port);
            let group = DmrsType::Type1.cdm_group(port as usize);
            let expected: Vec<u8> = DmrsType::Type1
                .cdm_group_subcarriers(group)
                .into_iter()
                .map(|k| k as u8)
                .collect();
            assert_eq!(subcarriers, expected);
        }
    }

    #[test]
    fn test_sequence_index() {
        assert_eq!(DmrsType::Type1.sequence_index(14, 0), 7);
        assert_eq!(DmrsType::Type1.sequence_index(15, 1), 7);
        // Type 2, group 1: subcarriers 2, 3, 8, 9 of RB 1 are indices 4..8
        assert_eq!(DmrsType::Type2.sequence_index(14, 1), 4);
        assert_eq!(DmrsType::Type2.sequence_index(21, 1), 7);
    }

    #[test]
    fn test_dmrs_pattern() {
        let pattern = dmrs_pattern(DmrsType::Type1, 2, 3, 1, SymbolMask::from_symbols(&[2, 7]));
        assert_eq!(pattern.prb_mask, vec![false, false, true, true, true]);
        assert_eq!(pattern.re_mask.iter().filter(|&&r| r).count(), 6);
        assert!(pattern.re_mask[0] && !pattern.re_mask[1]);

        let pattern = dmrs_pattern(DmrsType::Type2, 0, 1, 3, SymbolMask::from_symbols(&[2]));
        assert!(pattern.re_mask.iter().all(|&r| r));
    }

    #[test]
    fn test_single_layer_mapping() {
        let mut rb_mask = vec![false; 4];
        rb_mask[1] = true;
        rb_mask[3] = true;
        let cfg = config(DmrsType::Type1, 1, rb_mask);

        let grid = ResourceGrid::new(1, 4);
        DmrsPdschProcessor::new().map(&grid, &cfg);

        assert_eq!(grid.count_nonzero(0), 12);
        for k in [12usize, 14, 22, 36, 46] {
            let value = grid.get(0, 2, k);
            assert!((value.norm() - 1.0).abs() < 1e-5, "k={}", k);

            let expected = dmrs_sequence_value(3, 2, 500, false, DmrsType::Type1.sequence_index(k, 0), 1.0);
            assert!((value - expected).norm() < 1e-6, "k={}", k);
        }
        assert_eq!(grid.get(0, 2, 13), Complex32::new(0.0, 0.0));
        assert_eq!(grid.get(0, 2, 24), Complex32::new(0.0, 0.0));
    }

    #[test]
    fn test_two_layer_cdm_weights() {
        let cfg = config(DmrsType::Type1, 2, vec![true; 2]);
        let grid = ResourceGrid::new(2, 2);
        DmrsPdschProcessor::new().map(&grid, &cfg);

        // Ports 0 and 1 share CDM group 0, port 1 flips every other RE.
        for j in 0..12 {
            let k = 2 * j;
            let p0 = grid.get(0, 2, k);
            let p1 = grid.get(1, 2, k);
            if j % 2 == 0 {
                assert_eq!(p0, p1);
            } else {
                assert_eq!(p0, -p1);
            }
        }
    }

    #[test]
    fn test_amplitude() {
        let mut cfg = config(DmrsType::Type2, 3, vec![true]);
        cfg.amplitude = 2.0;
        let grid = ResourceGrid::new(3, 1);
        DmrsPdschProcessor::new().map(&grid, &cfg);

        // Layer 2 uses CDM group 1
        assert!((grid.get(2, 2, 2).norm() - 2.0).abs() < 1e-5);
        assert_eq!(grid.get(2, 2, 0), Complex32::new(0.0, 0.0));
        assert_eq!(grid.count_nonzero(0), 4);
    }
}
