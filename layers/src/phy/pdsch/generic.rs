/// Sequential PDSCH processor
///
/// Encodes every codeblock in order into one codeword, scrambles and
/// modulates it in one pass and maps it with a single mapper call. All work
/// happens on the calling thread, so the notifier fires before `process`
/// returns.

use super::codeblock_processor::PdschCodeblockProcessor;
use super::helpers::{
    allocation_pattern, count_data_re, data_precoding, process_dmrs, process_ptrs, reserved_pattern,
    scrambling_c_init,
};
use super::segmentation::PdschSegmentation;
use super::validator::PdschPduValidator;
use super::{PdschPdu, PdschProcessor, PdschProcessorNotifier, SharedTransportBlock};
use crate::phy::dmrs::DmrsPdschProcessor;
use crate::phy::modulation::modulate;
use crate::phy::ptrs::PtrsPdschGenerator;
use crate::phy::resource_grid::ResourceGridWriter;
use crate::phy::resource_grid_mapper::ResourceGridMapper;
use crate::phy::sequence::PseudoRandomGenerator;
use num_complex::Complex32;
use std::sync::Arc;
use tracing::debug;

pub struct PdschProcessorGeneric {
    cb_processor: PdschCodeblockProcessor,
    dmrs: DmrsPdschProcessor,
    ptrs: PtrsPdschGenerator,
    mapper: Arc<dyn ResourceGridMapper>,
    validator: PdschPduValidator,
    codeword: Vec<u8>,
    symbols: Vec<Complex32>,
}

impl PdschProcessorGeneric {
    pub fn new(mapper: Arc<dyn ResourceGridMapper>) -> Self {
        Self {
            cb_processor: PdschCodeblockProcessor::new(),
            dmrs: DmrsPdschProcessor::new(),
            ptrs: PtrsPdschGenerator::new(),
            mapper,
            validator: PdschPduValidator::new(),
            codeword: Vec::new(),
            symbols: Vec::new(),
        }
    }

    fn process_data(&mut self, grid: &dyn ResourceGridWriter, tb: &SharedTransportBlock, pdu: &PdschPdu) {
        let codeword = pdu.codewords[0];
        let allocation = allocation_pattern(pdu);
        let reserved = reserved_pattern(pdu);
        let nof_re = count_data_re(&allocation, &reserved);

        let segmentation = PdschSegmentation::derive(
            tb.len() * 8,
            pdu.ldpc_base_graph,
            codeword.modulation,
            codeword.rv,
            pdu.tbs_lbrm_bytes,
            nof_re,
            pdu.nof_layers(),
        );
        let c_init = scrambling_c_init(pdu.rnti, 0, pdu.n_id);

        self.codeword.clear();
        for index in 0..segmentation.nof_codeblocks() {
            let config = segmentation.codeblock_config(index, c_init);
            let bits = self.cb_processor.encode(tb.buffer(), &config);
            self.codeword.extend_from_slice(bits);
        }
        tb.release();

        PseudoRandomGenerator::new(c_init).apply_xor_bits(&mut self.codeword);

        let qm = codeword.modulation.bits_per_symbol();
        self.symbols.clear();
        self.symbols.resize(self.codeword.len() / qm, Complex32::new(0.0, 0.0));
        modulate(&mut self.symbols, &self.codeword, codeword.modulation);

        self.mapper.map(grid, &self.symbols, &allocation, &reserved, &data_precoding(pdu), 0);

        debug!(
            "PDSCH rnti=0x{:04x}: {} codeblocks, {} REs per layer, {} bits",
            pdu.rnti,
            segmentation.nof_codeblocks(),
            nof_re,
            self.codeword.len()
        );
    }
}

impl PdschProcessor for PdschProcessorGeneric {
    fn process(
        &mut self,
        grid: Arc<dyn ResourceGridWriter>,
        notifier: Arc<dyn PdschProcessorNotifier>,
        data: Vec<SharedTransportBlock>,
        pdu: &PdschPdu,
    ) {
        if let Err(err) = self.validator.is_valid(pdu) {
            panic!("Invalid PDSCH PDU: {}", err);
        }
        assert_eq!(data.len(), 1, "Expected one transport block, got {}", data.len());
        assert!(!data[0].is_empty(), "Empty transport block");

        self.process_data(grid.as_ref(), &data[0], pdu);
        process_dmrs(grid.as_ref(), &mut self.dmrs, pdu);
        process_ptrs(grid.as_ref(), &mut self.ptrs, pdu);

        notifier.on_finish_processing();
    }
}
