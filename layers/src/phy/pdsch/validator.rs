/// Structural validation of PDSCH PDUs
///
/// The processors assume a valid PDU and treat a violation as a fatal
/// contract breach. Callers that cannot trust their PDU source run it through
/// the validator first.

use super::helpers::compute_nof_data_re;
use super::PdschPdu;
use common::{MAX_NSYMB_PER_SLOT, MAX_RB};
use thiserror::Error;

/// Reasons for rejecting a PDSCH PDU
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PdschValidationError {
    #[error("Only one codeword is supported, PDU has {0}")]
    InvalidNofCodewords(usize),

    #[error("Invalid number of layers {nof_layers}, DMRS type allows 1 to {max}")]
    InvalidNofLayers { nof_layers: usize, max: usize },

    #[error("Precoding maps {nof_layers} layers onto only {nof_ports} ports")]
    NotEnoughPorts { nof_ports: usize, nof_layers: usize },

    #[error("BWP of {size} RBs starting at {start} exceeds {max} RBs", max = MAX_RB)]
    InvalidBwp { start: usize, size: usize },

    #[error("Empty frequency allocation")]
    EmptyAllocation,

    #[error("Frequency allocation ends at RB {rb_end}, BWP has {bwp_size} RBs")]
    AllocationOutsideBwp { rb_end: usize, bwp_size: usize },

    #[error("Time allocation of {nof_symbols} symbols from symbol {start} does not fit a slot")]
    InvalidTimeAllocation { start: usize, nof_symbols: usize },

    #[error("No DMRS symbols")]
    EmptyDmrsSymbols,

    #[error("DMRS symbol {0} is outside the time allocation")]
    DmrsOutsideAllocation(usize),

    #[error("{nof_cdm_groups} CDM groups without data, expected {min} to {max}")]
    InvalidCdmGroups { nof_cdm_groups: usize, min: usize, max: usize },

    #[error("Invalid redundancy version {0}")]
    InvalidRv(u8),

    #[error("PT-RS layer {layer} is not one of the {nof_layers} layers")]
    InvalidPtrsLayer { layer: usize, nof_layers: usize },

    #[error("DMRS reference point RB {ref_point} is above the BWP start {bwp_start}")]
    InvalidReferencePoint { ref_point: usize, bwp_start: usize },

    #[error("Allocation leaves no RE for data")]
    NoDataRe,
}

/// PDSCH PDU validator
#[derive(Debug, Default, Clone, Copy)]
pub struct PdschPduValidator;

impl PdschPduValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check that the processors can handle `pdu`
    pub fn is_valid(&self, pdu: &PdschPdu) -> Result<(), PdschValidationError> {
        if pdu.codewords.len() != 1 {
            return Err(PdschValidationError::InvalidNofCodewords(pdu.codewords.len()));
        }

        let nof_layers = pdu.nof_layers();
        let max_layers = pdu.dmrs.max_nof_layers();
        if nof_layers == 0 || nof_layers > max_layers {
            return Err(PdschValidationError::InvalidNofLayers { nof_layers, max: max_layers });
        }
        let nof_ports = pdu.precoding.nof_ports();
        if nof_ports < nof_layers {
            return Err(PdschValidationError::NotEnoughPorts { nof_ports, nof_layers });
        }

        if pdu.bwp_size_rb == 0 || pdu.bwp_start_rb + pdu.bwp_size_rb > MAX_RB {
            return Err(PdschValidationError::InvalidBwp {
                start: pdu.bwp_start_rb,
                size: pdu.bwp_size_rb,
            });
        }
        if pdu.freq_alloc.is_empty() {
            return Err(PdschValidationError::EmptyAllocation);
        }
        let rb_end = pdu.freq_alloc.rb_end();
        if rb_end > pdu.bwp_size_rb {
            return Err(PdschValidationError::AllocationOutsideBwp {
                rb_end,
                bwp_size: pdu.bwp_size_rb,
            });
        }
        if pdu.ref_point > pdu.bwp_start_rb {
            return Err(PdschValidationError::InvalidReferencePoint {
                ref_point: pdu.ref_point,
                bwp_start: pdu.bwp_start_rb,
            });
        }

        let time_end = pdu.start_symbol_index + pdu.nof_symbols;
        if pdu.nof_symbols == 0 || time_end > MAX_NSYMB_PER_SLOT {
            return Err(PdschValidationError::InvalidTimeAllocation {
                start: pdu.start_symbol_index,
                nof_symbols: pdu.nof_symbols,
            });
        }
        if pdu.dmrs_symbol_mask.is_empty() {
            return Err(PdschValidationError::EmptyDmrsSymbols);
        }
        if let Some(symbol) = pdu
            .dmrs_symbol_mask
            .iter()
            .find(|&s| s < pdu.start_symbol_index || s >= time_end)
        {
            return Err(PdschValidationError::DmrsOutsideAllocation(symbol));
        }

        // Used ports live in CDM groups 0..=max_group, all of which carry no data
        let min_cdm_groups = (0..nof_layers).map(|l| pdu.dmrs.cdm_group(l)).max().unwrap_or(0) + 1;
        let max_cdm_groups = pdu.dmrs.nof_cdm_groups();
        if pdu.nof_cdm_groups_without_data < min_cdm_groups || pdu.nof_cdm_groups_without_data > max_cdm_groups {
            return Err(PdschValidationError::InvalidCdmGroups {
                nof_cdm_groups: pdu.nof_cdm_groups_without_data,
                min: min_cdm_groups,
                max: max_cdm_groups,
            });
        }

        let rv = pdu.codewords[0].rv;
        if rv > 3 {
            return Err(PdschValidationError::InvalidRv(rv));
        }

        if let Some(ptrs) = &pdu.ptrs {
            if ptrs.layer >= nof_layers {
                return Err(PdschValidationError::InvalidPtrsLayer {
                    layer: ptrs.layer,
                    nof_layers,
                });
            }
        }

        if compute_nof_data_re(pdu) == 0 {
            return Err(PdschValidationError::NoDataRe);
        }

        Ok(())
    }
}
