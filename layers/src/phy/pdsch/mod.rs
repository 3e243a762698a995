//! PDSCH (Physical Downlink Shared Channel) processing
//!
//! Turns one MAC transport block and a PDSCH PDU into modulated, precoded
//! symbols in a resource grid (3GPP TS 38.211 Section 7.3.1 and
//! TS 38.212 Section 7.2). Two processors are provided: a concurrent one that
//! fans codeblocks out to a task executor, and a sequential one.

pub mod codeblock_processor;
pub mod concurrent;
pub mod factory;
pub mod generic;
pub mod helpers;
pub mod segmentation;
pub mod validator;

pub use codeblock_processor::{CodeblockConfig, PdschCodeblockProcessor};
pub use concurrent::PdschProcessorConcurrent;
pub use factory::PdschProcessorFactory;
pub use generic::PdschProcessorGeneric;
pub use segmentation::{CodeblockCommonMetadata, CodeblockSpecificMetadata, PdschSegmentation};
pub use validator::{PdschPduValidator, PdschValidationError};

use super::dmrs::DmrsType;
use super::precoding::PrecodingMatrix;
use super::ptrs::PtrsConfig;
use super::re_pattern::{RbAllocation, RePatternList, SymbolMask};
use super::resource_grid::ResourceGridWriter;
use bytes::Bytes;
use common::{LdpcBaseGraph, ModulationScheme};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum number of transport blocks in one PDSCH transmission
pub const MAX_NOF_TRANSPORT_BLOCKS: usize = 2;

/// Per-codeword transmission parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdschCodeword {
    pub modulation: ModulationScheme,
    /// Redundancy version (0..=3)
    pub rv: u8,
}

/// PDSCH transmission descriptor
#[derive(Debug, Clone)]
pub struct PdschPdu {
    /// Slot number within the frame
    pub slot: u32,
    pub rnti: u16,
    pub bwp_start_rb: usize,
    pub bwp_size_rb: usize,
    pub codewords: Vec<PdschCodeword>,
    /// Data scrambling identity n_ID
    pub n_id: u16,
    /// DMRS reference point in RBs from the grid origin
    pub ref_point: usize,
    pub dmrs_symbol_mask: SymbolMask,
    pub dmrs: DmrsType,
    /// DMRS scrambling identity N_ID^nSCID
    pub scrambling_id: u16,
    pub n_scid: bool,
    pub nof_cdm_groups_without_data: usize,
    pub freq_alloc: RbAllocation,
    pub start_symbol_index: usize,
    pub nof_symbols: usize,
    pub ldpc_base_graph: LdpcBaseGraph,
    /// Transport block size for limited buffer rate matching, zero if unlimited
    pub tbs_lbrm_bytes: usize,
    /// Reserved REs the PDSCH is not mapped onto (CSI-RS and similar)
    pub reserved: RePatternList,
    pub ratio_pdsch_dmrs_to_sss_db: f32,
    pub ratio_pdsch_data_to_sss_db: f32,
    pub precoding: PrecodingMatrix,
    pub ptrs: Option<PtrsConfig>,
}

impl PdschPdu {
    pub fn nof_layers(&self) -> usize {
        self.precoding.nof_layers()
    }
}

type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

/// Transport block shared with the processing tasks
///
/// `release` hands the buffer back to its producer and must be called exactly
/// once per transmission. A second release is a bug and panics.
pub struct SharedTransportBlock {
    data: Bytes,
    on_release: Option<ReleaseHook>,
    released: AtomicBool,
}

impl SharedTransportBlock {
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            on_release: None,
            released: AtomicBool::new(false),
        }
    }

    /// Transport block that runs `hook` when released
    pub fn with_release_hook(data: Bytes, hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            data,
            on_release: Some(Arc::new(hook)),
            released: AtomicBool::new(false),
        }
    }

    pub fn buffer(&self) -> &[u8] {
        debug_assert!(!self.is_released(), "Transport block read after release");
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn release(&self) {
        let already_released = self.released.swap(true, Ordering::AcqRel);
        assert!(!already_released, "Transport block released twice");
        if let Some(hook) = &self.on_release {
            hook();
        }
    }
}

impl fmt::Debug for SharedTransportBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTransportBlock")
            .field("len", &self.data.len())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Receives the end of a PDSCH transmission processing
pub trait PdschProcessorNotifier: Send + Sync {
    /// Called exactly once per `process` call, after every grid write
    fn on_finish_processing(&self);
}

/// PDSCH processor
///
/// A new transmission must not be processed before the notifier of the
/// previous one has fired.
pub trait PdschProcessor: Send {
    fn process(
        &mut self,
        grid: Arc<dyn ResourceGridWriter>,
        notifier: Arc<dyn PdschProcessorNotifier>,
        data: Vec<SharedTransportBlock>,
        pdu: &PdschPdu,
    );
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_release_runs_hook_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let tb = SharedTransportBlock::with_release_hook(Bytes::from_static(&[1, 2, 3]), move || {
            counter.fetch_add(1, Ordering::AcqRel);
        });

        assert_eq!(tb.buffer(), &[1, 2, 3]);
        assert_eq!(tb.len(), 3);
        tb.release();
        assert!(tb.is_released());
        assert_eq!(releases.load(Ordering::Acquire), 1);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let tb = SharedTransportBlock::new(Bytes::from_static(&[0]));
        tb.release();
        tb.release();
    }
}
