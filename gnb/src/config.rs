//! Configuration structures for the DL-SCH slot driver
//!
//! The file format is picked from the extension: `.yml`/`.yaml`, `.toml` or
//! `.json`. Every key is optional; omitted keys take the defaults below.

use anyhow::{anyhow, bail, Context, Result};
use common::{LdpcBaseGraph, ModulationScheme, Pci, Rnti, MAX_NSYMB_PER_SLOT, MAX_PORTS};
use layers::phy::{
    DmrsType, PdschCodeword, PdschPdu, PrecodingMatrix, PtrsConfig, RbAllocation, RePatternList, SymbolMask,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DlschConfig {
    pub cell: CellConfig,
    pub pdsch: PdschConfig,
    pub executor: ExecutorConfig,
    pub processor: ProcessorConfig,
    pub run: RunConfig,
}

/// Cell configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CellConfig {
    /// Physical Cell ID, also the default data and DMRS scrambling identity
    pub pci: u16,
    pub bwp_start_rb: usize,
    pub bwp_size_rb: usize,
    /// Number of transmit ports
    pub nof_ports: usize,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            pci: 1,
            bwp_start_rb: 0,
            bwp_size_rb: 106,
            nof_ports: 1,
        }
    }
}

/// PDSCH transmission configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PdschConfig {
    pub rnti: Rnti,
    pub modulation: ModulationScheme,
    pub nof_layers: usize,
    /// LDPC base graph index (1 or 2)
    pub base_graph: u8,
    pub rv: u8,
    pub tbs_bytes: usize,
    /// Limited buffer rate matching TBS, zero disables it
    pub tbs_lbrm_bytes: usize,
    pub start_symbol: usize,
    pub nof_symbols: usize,
    pub dmrs_type: DmrsType,
    pub dmrs_symbols: Vec<usize>,
    pub nof_cdm_groups_without_data: usize,
    pub ratio_pdsch_dmrs_to_sss_db: f32,
    pub ratio_pdsch_data_to_sss_db: f32,
    pub ptrs: Option<PtrsConfig>,
}

impl Default for PdschConfig {
    fn default() -> Self {
        Self {
            rnti: Rnti::new(0x4601),
            modulation: ModulationScheme::Qam64,
            nof_layers: 1,
            base_graph: 1,
            rv: 0,
            tbs_bytes: 6000,
            tbs_lbrm_bytes: 0,
            start_symbol: 2,
            nof_symbols: 12,
            dmrs_type: DmrsType::Type1,
            dmrs_symbols: vec![2, 7, 11],
            nof_cdm_groups_without_data: 2,
            ratio_pdsch_dmrs_to_sss_db: 0.0,
            ratio_pdsch_data_to_sss_db: 0.0,
            ptrs: None,
        }
    }
}

/// Task executor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// Dedicated worker threads behind a bounded queue
    WorkerPool,
    /// Tokio blocking pool with an in-flight limit
    Tokio,
    /// Everything on the calling thread
    Inline,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub kind: ExecutorKind,
    pub nof_threads: usize,
    /// Worker pool queue size, or in-flight limit of the tokio executor
    pub queue_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: ExecutorKind::WorkerPool,
            nof_threads: 4,
            queue_size: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Codeblock processors shared by the concurrent processor tasks
    pub cb_pool_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { cb_pool_capacity: 4 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of slots to process
    pub slots: u32,
    /// Seed of the random transport blocks
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self { slots: 100, seed: 0 }
    }
}

impl DlschConfig {
    /// Load configuration from a YAML, TOML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&contents),
            Some("toml") => Self::from_toml_str(&contents),
            Some("json") => Ok(serde_json::from_str(&contents)?),
            other => bail!("Unsupported configuration format: {:?}", other),
        }
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Build the PDSCH PDU of a slot
    pub fn pdsch_pdu(&self, slot: u32) -> Result<PdschPdu> {
        let cell = &self.cell;
        let pdsch = &self.pdsch;

        let pci = Pci::new(cell.pci).ok_or_else(|| anyhow!("Invalid PCI: {}", cell.pci))?;
        let base_graph = LdpcBaseGraph::from_index(pdsch.base_graph)?;
        if cell.nof_ports == 0 || cell.nof_ports > MAX_PORTS {
            bail!("Invalid number of ports {}, at most {} supported", cell.nof_ports, MAX_PORTS);
        }
        if pdsch.nof_layers == 0 || pdsch.nof_layers > cell.nof_ports {
            bail!("{} layers do not fit {} ports", pdsch.nof_layers, cell.nof_ports);
        }
        if let Some(&symbol) = pdsch.dmrs_symbols.iter().find(|&&s| s >= MAX_NSYMB_PER_SLOT) {
            bail!("Invalid DMRS symbol {}", symbol);
        }

        Ok(PdschPdu {
            slot,
            rnti: pdsch.rnti.value(),
            bwp_start_rb: cell.bwp_start_rb,
            bwp_size_rb: cell.bwp_size_rb,
            codewords: vec![PdschCodeword {
                modulation: pdsch.modulation,
                rv: pdsch.rv,
            }],
            n_id: pci.0,
            ref_point: 0,
            dmrs_symbol_mask: SymbolMask::from_symbols(&pdsch.dmrs_symbols),
            dmrs: pdsch.dmrs_type,
            scrambling_id: pci.0,
            n_scid: false,
            nof_cdm_groups_without_data: pdsch.nof_cdm_groups_without_data,
            freq_alloc: RbAllocation::Contiguous {
                start: 0,
                len: cell.bwp_size_rb,
            },
            start_symbol_index: pdsch.start_symbol,
            nof_symbols: pdsch.nof_symbols,
            ldpc_base_graph: base_graph,
            tbs_lbrm_bytes: pdsch.tbs_lbrm_bytes,
            reserved: RePatternList::new(),
            ratio_pdsch_dmrs_to_sss_db: pdsch.ratio_pdsch_dmrs_to_sss_db,
            ratio_pdsch_data_to_sss_db: pdsch.ratio_pdsch_data_to_sss_db,
            precoding: PrecodingMatrix::identity_on_ports(pdsch.nof_layers, cell.nof_ports),
            ptrs: pdsch.ptrs,
        })
    }
}
