/// Derivations shared by the PDSCH processors
///
/// Every function is a pure function of the PDU, so the sequential and the
/// concurrent processors produce the same patterns, powers and sequences.

use super::PdschPdu;
use crate::phy::dmrs::{dmrs_pattern, DmrsPdschConfig, DmrsPdschProcessor};
use crate::phy::modulation::modulation_scaling;
use crate::phy::precoding::PrecodingMatrix;
use crate::phy::ptrs::{PtrsPdschConfig, PtrsPdschGenerator};
use crate::phy::re_pattern::{RePattern, RePatternList, SymbolMask};
use crate::phy::resource_grid::ResourceGridWriter;
use common::{convert_db_to_amplitude, NOF_SUBCARRIERS_PER_RB};

/// Allocated PRBs counted from the grid origin
pub fn prb_mask(pdu: &PdschPdu) -> Vec<bool> {
    pdu.freq_alloc.prb_mask(pdu.bwp_start_rb, pdu.bwp_size_rb)
}

/// Every RE of the allocated PRBs over the PDSCH symbols
pub fn allocation_pattern(pdu: &PdschPdu) -> RePattern {
    RePattern::new(
        prb_mask(pdu),
        [true; NOF_SUBCARRIERS_PER_RB],
        SymbolMask::from_range(pdu.start_symbol_index, pdu.nof_symbols),
    )
}

pub fn dmrs_config(pdu: &PdschPdu) -> DmrsPdschConfig {
    DmrsPdschConfig {
        slot: pdu.slot,
        dmrs_type: pdu.dmrs,
        scrambling_id: pdu.scrambling_id,
        n_scid: pdu.n_scid,
        amplitude: convert_db_to_amplitude(-pdu.ratio_pdsch_dmrs_to_sss_db),
        reference_point_k_rb: pdu.ref_point,
        symbols: pdu.dmrs_symbol_mask,
        rb_mask: prb_mask(pdu),
        precoding: pdu.precoding.clone(),
    }
}

/// PT-RS mapping parameters, `None` when the PDU carries no PT-RS
pub fn ptrs_config(pdu: &PdschPdu) -> Option<PtrsPdschConfig> {
    pdu.ptrs.map(|ptrs| PtrsPdschConfig {
        slot: pdu.slot,
        rnti: pdu.rnti,
        dmrs_type: pdu.dmrs,
        scrambling_id: pdu.scrambling_id,
        n_scid: pdu.n_scid,
        amplitude: convert_db_to_amplitude(-pdu.ratio_pdsch_data_to_sss_db + ptrs.power_offset_db),
        reference_point_k_rb: pdu.ref_point,
        dmrs_symbols: pdu.dmrs_symbol_mask,
        start_symbol: pdu.start_symbol_index,
        nof_symbols: pdu.nof_symbols,
        rb_mask: prb_mask(pdu),
        ptrs,
        precoding: pdu.precoding.clone(),
    })
}

/// REs the PDSCH data is not mapped onto: PDU reserved REs, DM-RS and PT-RS
///
/// PT-RS REs are part of the pattern, so the data RE count and the codeword
/// length derived from it exclude them.
pub fn reserved_pattern(pdu: &PdschPdu) -> RePatternList {
    let mut reserved = pdu.reserved.clone();
    reserved.merge(dmrs_pattern(
        pdu.dmrs,
        pdu.bwp_start_rb,
        pdu.bwp_size_rb,
        pdu.nof_cdm_groups_without_data,
        pdu.dmrs_symbol_mask,
    ));
    if let Some(ptrs) = ptrs_config(pdu) {
        reserved.merge(ptrs.pattern());
    }
    reserved
}

/// Data REs per layer of an allocation once the reserved REs are removed
pub fn count_data_re(allocation: &RePattern, reserved: &RePatternList) -> usize {
    let nof_prb = allocation.prb_mask.iter().filter(|&&a| a).count();
    let nof_re_per_symbol = nof_prb * allocation.re_mask.iter().filter(|&&re| re).count();

    allocation
        .symbols
        .iter()
        .map(|symbol| {
            nof_re_per_symbol - reserved.get_inclusion_count(symbol, 1, &allocation.prb_mask)
        })
        .sum()
}

pub fn compute_nof_data_re(pdu: &PdschPdu) -> usize {
    count_data_re(&allocation_pattern(pdu), &reserved_pattern(pdu))
}

/// Data scrambling initial state, c_init = n_RNTI 2^15 + q 2^14 + n_ID (TS 38.211 Section 7.3.1.1)
pub fn scrambling_c_init(rnti: u16, codeword: usize, n_id: u16) -> u32 {
    ((rnti as u32) << 15) + ((codeword as u32) << 14) + n_id as u32
}

/// Data precoding with the data power offset and modulation scaling folded in
pub fn data_precoding(pdu: &PdschPdu) -> PrecodingMatrix {
    let modulation = pdu.codewords[0].modulation;
    let scaling = convert_db_to_amplitude(-pdu.ratio_pdsch_data_to_sss_db) * modulation_scaling(modulation);
    pdu.precoding.scale(scaling)
}

pub fn process_dmrs(grid: &dyn ResourceGridWriter, dmrs: &mut DmrsPdschProcessor, pdu: &PdschPdu) {
    dmrs.map(grid, &dmrs_config(pdu));
}

/// Map the PT-RS if the PDU has one
pub fn process_ptrs(grid: &dyn ResourceGridWriter, ptrs: &mut PtrsPdschGenerator, pdu: &PdschPdu) {
    if let Some(config) = ptrs_config(pdu) {
        ptrs.map(grid, &config);
    }
}
