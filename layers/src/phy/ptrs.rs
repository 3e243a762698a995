/// PT-RS (Phase Tracking Reference Signal) for PDSCH
/// Based on 3GPP TS 38.211 Section 7.4.1.2

use super::dmrs::{calculate_pdsch_dmrs_cinit, DmrsType};
use super::precoding::PrecodingMatrix;
use super::re_pattern::{RePattern, SymbolMask};
use super::resource_grid::ResourceGridWriter;
use super::sequence::PseudoRandomGenerator;
use common::NOF_SUBCARRIERS_PER_RB;
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Time density L_PT-RS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PtrsTimeDensity {
    EverySymbol = 1,
    EverySecondSymbol = 2,
    EveryFourthSymbol = 4,
}

impl TryFrom<u8> for PtrsTimeDensity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::EverySymbol),
            2 => Ok(Self::EverySecondSymbol),
            4 => Ok(Self::EveryFourthSymbol),
            _ => Err(format!("Invalid PT-RS time density {}", value)),
        }
    }
}

impl From<PtrsTimeDensity> for u8 {
    fn from(density: PtrsTimeDensity) -> Self {
        density as u8
    }
}

/// Frequency density K_PT-RS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PtrsFrequencyDensity {
    EverySecondRb = 2,
    EveryFourthRb = 4,
}

impl TryFrom<u8> for PtrsFrequencyDensity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::EverySecondRb),
            4 => Ok(Self::EveryFourthRb),
            _ => Err(format!("Invalid PT-RS frequency density {}", value)),
        }
    }
}

impl From<PtrsFrequencyDensity> for u8 {
    fn from(density: PtrsFrequencyDensity) -> Self {
        density as u8
    }
}

/// Higher layer parameter resourceElementOffset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtrsReOffset {
    #[default]
    Offset00,
    Offset01,
    Offset10,
    Offset11,
}

/// k_RE_ref for DMRS Type 1, indexed by [offset][port]
const K_RE_REF_TYPE1: [[usize; 4]; 4] = [[0, 2, 1, 3], [2, 4, 3, 5], [6, 8, 7, 9], [8, 10, 9, 11]];

/// k_RE_ref for DMRS Type 2, indexed by [offset][port]
const K_RE_REF_TYPE2: [[usize; 6]; 4] = [
    [0, 1, 2, 3, 4, 5],
    [1, 6, 3, 8, 5, 10],
    [6, 7, 8, 9, 10, 11],
    [7, 0, 9, 2, 11, 4],
];

/// PT-RS parameters carried by a PDSCH PDU
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtrsConfig {
    pub time_density: PtrsTimeDensity,
    pub frequency_density: PtrsFrequencyDensity,
    #[serde(default)]
    pub re_offset: PtrsReOffset,
    /// Layer (and DMRS port) the PT-RS is associated with
    #[serde(default)]
    pub layer: usize,
    /// PT-RS to PDSCH EPRE ratio in dB
    #[serde(default)]
    pub power_offset_db: f32,
}

/// Table 7.4.1.2.2-1 lookup
pub fn k_re_ref(dmrs_type: DmrsType, dmrs_port: usize, re_offset: PtrsReOffset) -> usize {
    let offset = re_offset as usize;
    match dmrs_type {
        DmrsType::Type1 => K_RE_REF_TYPE1[offset][dmrs_port],
        DmrsType::Type2 => K_RE_REF_TYPE2[offset][dmrs_port],
    }
}

/// RB offset k_RB_ref derived from the RNTI
pub fn k_rb_ref(rnti: u16, nof_rb: usize, frequency_density: PtrsFrequencyDensity) -> usize {
    let k = frequency_density as usize;
    let rnti = rnti as usize;
    if nof_rb % k == 0 {
        rnti % k
    } else {
        rnti % (nof_rb % k)
    }
}

/// OFDM symbols carrying PT-RS (Section 7.4.1.2.2)
///
/// `start_symbol` and `nof_symbols` describe the PDSCH time allocation.
pub fn ptrs_time_positions(
    start_symbol: usize,
    nof_symbols: usize,
    dmrs_symbols: SymbolMask,
    time_density: PtrsTimeDensity,
) -> SymbolMask {
    let l = time_density as usize;
    let last_symbol = start_symbol + nof_symbols - 1;
    let mut positions = SymbolMask::new();

    let mut i = 0;
    let mut l_ref = start_symbol;
    while l_ref + i * l <= last_symbol {
        let low = if i == 0 { l_ref } else { l_ref + (i - 1) * l + 1 };
        let high = l_ref + i * l;

        if let Some(dmrs) = (low..=high).rev().find(|&s| dmrs_symbols.is_set(s)) {
            l_ref = dmrs;
            i = 1;
            continue;
        }

        positions.set(high);
        i += 1;
    }

    positions
}

/// Parameters for mapping PDSCH PT-RS into a grid
#[derive(Debug, Clone)]
pub struct PtrsPdschConfig {
    pub slot: u32,
    pub rnti: u16,
    pub dmrs_type: DmrsType,
    pub scrambling_id: u16,
    pub n_scid: bool,
    /// Linear amplitude applied on top of the QPSK normalisation
    pub amplitude: f32,
    pub reference_point_k_rb: usize,
    pub dmrs_symbols: SymbolMask,
    pub start_symbol: usize,
    pub nof_symbols: usize,
    /// Allocated PRBs counted from the grid origin
    pub rb_mask: Vec<bool>,
    pub ptrs: PtrsConfig,
    pub precoding: PrecodingMatrix,
}

impl PtrsPdschConfig {
    /// PRBs carrying PT-RS
    pub fn ptrs_rbs(&self) -> Vec<usize> {
        let allocated: Vec<usize> = self
            .rb_mask
            .iter()
            .enumerate()
            .filter(|(_, &a)| a)
            .map(|(rb, _)| rb)
            .collect();
        let k = self.ptrs.frequency_density as usize;
        let offset = k_rb_ref(self.rnti, allocated.len(), self.ptrs.frequency_density);

        allocated.into_iter().skip(offset).step_by(k).collect()
    }

    pub fn symbols(&self) -> SymbolMask {
        ptrs_time_positions(self.start_symbol, self.nof_symbols, self.dmrs_symbols, self.ptrs.time_density)
    }

    /// Subcarrier within the RB carrying PT-RS
    pub fn subcarrier_in_rb(&self) -> usize {
        k_re_ref(self.dmrs_type, self.ptrs.layer, self.ptrs.re_offset)
    }

    /// RE pattern occupied by the PT-RS
    pub fn pattern(&self) -> RePattern {
        let mut prb_mask = vec![false; self.rb_mask.len()];
        for rb in self.ptrs_rbs() {
            prb_mask[rb] = true;
        }
        let mut re_mask = [false; NOF_SUBCARRIERS_PER_RB];
        re_mask[self.subcarrier_in_rb()] = true;

        RePattern::new(prb_mask, re_mask, self.symbols())
    }
}

/// PT-RS generator and mapper
#[derive(Debug, Default)]
pub struct PtrsPdschGenerator {
    layer_values: Vec<Complex32>,
}

impl PtrsPdschGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map PT-RS on its associated layer, precoded onto every port
    pub fn map(&mut self, grid: &dyn ResourceGridWriter, config: &PtrsPdschConfig) {
        let rbs = config.ptrs_rbs();
        let symbols = config.symbols();
        let k_re = config.subcarrier_in_rb();
        let cdm_group = config.dmrs_type.cdm_group(config.ptrs.layer);
        let nof_layers = config.precoding.nof_layers();
        let amplitude = config.amplitude * std::f32::consts::FRAC_1_SQRT_2;
        let origin = config.reference_point_k_rb * NOF_SUBCARRIERS_PER_RB;

        for symbol in symbols.iter() {
            let c_init = calculate_pdsch_dmrs_cinit(config.slot, symbol, config.scrambling_id, config.n_scid);
            let mut generator = PseudoRandomGenerator::new(c_init);
            let mut position = 0;

            for &rb in &rbs {
                let subcarrier = rb * NOF_SUBCARRIERS_PER_RB + k_re;
                let index = config.dmrs_type.sequence_index(subcarrier - origin, cdm_group);
                generator.skip_symbols(index - position);
                let value = generator.next_qpsk_symbol(amplitude);
                position = index + 1;

                self.layer_values.clear();
                self.layer_values.resize(nof_layers, Complex32::new(0.0, 0.0));
                self.layer_values[config.ptrs.layer] = value;

                for port in 0..config.precoding.nof_ports() {
                    grid.put(port, symbol, subcarrier, config.precoding.apply(port, &self.layer_values));
                }
            }
        }

        trace!("Mapped PT-RS on {} symbols and {} RBs", symbols.count(), rbs.len());
    }
}
