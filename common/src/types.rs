//! Common Types for the 5G NR downlink
//!
//! Defines fundamental types shared by the PHY pipeline and its drivers

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use thiserror::Error;

/// Number of subcarriers in a resource block
pub const NOF_SUBCARRIERS_PER_RB: usize = 12;

/// Number of OFDM symbols per slot (normal cyclic prefix)
pub const MAX_NSYMB_PER_SLOT: usize = 14;

/// Maximum number of resource blocks in a carrier
pub const MAX_RB: usize = 275;

/// Maximum number of antenna ports handled by the downlink grid
pub const MAX_PORTS: usize = 4;

/// Errors raised when converting raw values into common types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid modulation order: {0} bits per symbol")]
    InvalidModulationOrder(u8),

    #[error("Invalid LDPC base graph: {0}")]
    InvalidBaseGraph(u8),
}

/// Radio Network Temporary Identifier (RNTI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rnti(pub u16);

impl Rnti {
    /// Create a new RNTI
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the RNTI value
    pub fn value(&self) -> u16 {
        self.0
    }
}

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }
}

/// Downlink shared channel modulation schemes, valued by their modulation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulationScheme {
    /// QPSK
    Qpsk = 2,
    /// 16-QAM
    Qam16 = 4,
    /// 64-QAM
    Qam64 = 6,
    /// 256-QAM
    Qam256 = 8,
}

impl ModulationScheme {
    /// Number of bits carried by one constellation symbol (Qm)
    pub fn bits_per_symbol(&self) -> usize {
        *self as usize
    }

    /// Build a modulation scheme from its modulation order
    pub fn from_bits_per_symbol(qm: u8) -> Result<Self, TypeError> {
        Self::from_u8(qm).ok_or(TypeError::InvalidModulationOrder(qm))
    }
}

/// LDPC base graphs of TS 38.212 Section 5.3.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LdpcBaseGraph {
    /// Base graph 1 - for larger transport blocks and higher rates
    BaseGraph1,
    /// Base graph 2 - for smaller transport blocks and lower rates
    BaseGraph2,
}

impl LdpcBaseGraph {
    /// Build a base graph from its index (1 or 2)
    pub fn from_index(index: u8) -> Result<Self, TypeError> {
        match index {
            1 => Ok(Self::BaseGraph1),
            2 => Ok(Self::BaseGraph2),
            _ => Err(TypeError::InvalidBaseGraph(index)),
        }
    }
}
