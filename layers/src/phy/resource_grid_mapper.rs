/// Layer mapping, precoding and RE mapping of modulated symbols
/// Based on 3GPP TS 38.211 Sections 7.3.1.3 to 7.3.1.6
///
/// Symbols are consumed in layer-interleaved order: RE i carries
/// x^(v)(i) = d(v + i * nof_layers) on layer v. REs are visited symbol by
/// symbol, subcarriers in ascending order, skipping reserved REs.

use super::precoding::PrecodingMatrix;
use super::re_pattern::{RePattern, RePatternList};
use super::resource_grid::ResourceGridWriter;
use num_complex::Complex32;
use tracing::trace;

/// Maps modulated symbols into a resource grid
pub trait ResourceGridMapper: Send + Sync {
    /// Map `symbols` into the REs of `allocation` not covered by `reserved`
    ///
    /// The first `re_skip` eligible REs are left untouched, which lets
    /// independent producers fill disjoint slices of the same allocation.
    /// Returns the number of REs written.
    fn map(
        &self,
        grid: &dyn ResourceGridWriter,
        symbols: &[Complex32],
        allocation: &RePattern,
        reserved: &RePatternList,
        precoding: &PrecodingMatrix,
        re_skip: usize,
    ) -> usize;
}

/// Mapper walking the allocation mask symbol by symbol
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResourceGridMapper;

impl DefaultResourceGridMapper {
    pub fn new() -> Self {
        Self
    }
}

impl ResourceGridMapper for DefaultResourceGridMapper {
    fn map(
        &self,
        grid: &dyn ResourceGridWriter,
        symbols: &[Complex32],
        allocation: &RePattern,
        reserved: &RePatternList,
        precoding: &PrecodingMatrix,
        re_skip: usize,
    ) -> usize {
        let nof_layers = precoding.nof_layers();
        let nof_ports = precoding.nof_ports();
        assert!(
            nof_ports <= grid.nof_ports(),
            "Precoding uses {} ports, grid has {}",
            nof_ports,
            grid.nof_ports()
        );
        assert_eq!(symbols.len() % nof_layers, 0, "Symbols do not fill whole REs");

        let nof_re = symbols.len() / nof_layers;
        let mut layer_symbols = symbols.chunks_exact(nof_layers);
        let mut skip = re_skip;
        let mut written = 0;
        let mut mask = vec![false; grid.nof_subc()];

        for symbol in allocation.symbols.iter() {
            if written == nof_re {
                break;
            }

            mask.fill(false);
            allocation.get_inclusion_mask(&mut mask, symbol);
            reserved.get_exclusion_mask(&mut mask, symbol);

            let nof_eligible = mask.iter().filter(|&&m| m).count();
            if skip >= nof_eligible {
                skip -= nof_eligible;
                continue;
            }

            let subcarriers = mask
                .iter()
                .enumerate()
                .filter_map(|(k, &m)| m.then_some(k))
                .skip(skip);
            skip = 0;

            for (subcarrier, values) in subcarriers.zip(&mut layer_symbols) {
                for port in 0..nof_ports {
                    grid.put(port, symbol, subcarrier, precoding.apply(port, values));
                }
                written += 1;
            }
        }

        assert_eq!(
            written, nof_re,
            "Allocation holds fewer REs than the {} symbols to map",
            symbols.len()
        );
        trace!("Mapped {} REs after skipping {}", written, re_skip);
        written
    }
}
