//! Physical Layer (PHY) Submodules
//!
//! Downlink shared channel processing of the 5G NR physical layer according
//! to 3GPP TS 38.211 and TS 38.212: transport block coding, modulation,
//! reference signals and resource grid mapping.

pub mod crc;
pub mod dmrs;
pub mod ldpc;
pub mod modulation;
pub mod pdsch;
pub mod precoding;
pub mod ptrs;
pub mod re_pattern;
pub mod resource_grid;
pub mod resource_grid_mapper;
pub mod sequence;

// Re-export commonly used types
pub use dmrs::{DmrsPdschProcessor, DmrsType};
pub use pdsch::{
    PdschCodeword, PdschPdu, PdschProcessor, PdschProcessorConcurrent, PdschProcessorFactory,
    PdschProcessorGeneric, PdschProcessorNotifier, PdschPduValidator, SharedTransportBlock,
};
pub use precoding::PrecodingMatrix;
pub use ptrs::{PtrsConfig, PtrsFrequencyDensity, PtrsReOffset, PtrsTimeDensity};
pub use re_pattern::{RbAllocation, RePattern, RePatternList, SymbolMask};
pub use resource_grid::{ResourceGrid, ResourceGridReader, ResourceGridWriter};
pub use resource_grid_mapper::{DefaultResourceGridMapper, ResourceGridMapper};
