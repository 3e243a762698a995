//! Protocol Stack Layers Library
//!
//! This crate implements the downlink shared channel of the 5G NR physical
//! layer according to 3GPP Release 16.

pub mod phy;

use thiserror::Error;

/// Common errors for protocol layers
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Executor error: {0}")]
    Executor(#[from] interfaces::InterfaceError),
}
