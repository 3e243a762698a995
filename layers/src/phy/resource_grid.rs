//! Resource Grid for 5G NR downlink slots
//!
//! One slot worth of resource elements per antenna port. Cells are stored as
//! packed atomics so independent tasks can write disjoint REs through a
//! shared reference without locking. Ordering between writers and the
//! reader is provided by whoever hands the grid over (the processing
//! completion counters), so cell accesses are relaxed.

use common::{MAX_NSYMB_PER_SLOT, NOF_SUBCARRIERS_PER_RB};
use ndarray::Array3;
use num_complex::Complex32;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Write access to a resource grid
///
/// Implementations must accept concurrent writes to disjoint coordinates.
pub trait ResourceGridWriter: Send + Sync {
    fn nof_ports(&self) -> usize;

    fn nof_subc(&self) -> usize;

    fn nof_symbols(&self) -> usize;

    /// Write one RE
    fn put(&self, port: usize, symbol: usize, subcarrier: usize, value: Complex32);

    /// Write consecutive REs of one symbol starting at `start_subcarrier`
    fn put_block(&self, port: usize, symbol: usize, start_subcarrier: usize, values: &[Complex32]) {
        for (i, &value) in values.iter().enumerate() {
            self.put(port, symbol, start_subcarrier + i, value);
        }
    }
}

/// Read access to a resource grid
pub trait ResourceGridReader {
    fn get(&self, port: usize, symbol: usize, subcarrier: usize) -> Complex32;
}

#[inline]
fn pack(value: Complex32) -> u64 {
    ((value.re.to_bits() as u64) << 32) | value.im.to_bits() as u64
}

#[inline]
fn unpack(cell: u64) -> Complex32 {
    Complex32::new(f32::from_bits((cell >> 32) as u32), f32::from_bits(cell as u32))
}

/// Downlink resource grid of `nof_ports x 14 x (nof_prb * 12)` REs
pub struct ResourceGrid {
    cells: Vec<AtomicU64>,
    nof_ports: usize,
    nof_subc: usize,
}

impl ResourceGrid {
    pub fn new(nof_ports: usize, nof_prb: usize) -> Self {
        let nof_subc = nof_prb * NOF_SUBCARRIERS_PER_RB;
        let nof_cells = nof_ports * MAX_NSYMB_PER_SLOT * nof_subc;
        debug!(
            "Creating resource grid: {} ports, {} PRB, {} REs",
            nof_ports, nof_prb, nof_cells
        );

        Self {
            cells: (0..nof_cells).map(|_| AtomicU64::new(0)).collect(),
            nof_ports,
            nof_subc,
        }
    }

    pub fn nof_prb(&self) -> usize {
        self.nof_subc / NOF_SUBCARRIERS_PER_RB
    }

    #[inline]
    fn index(&self, port: usize, symbol: usize, subcarrier: usize) -> usize {
        assert!(
            port < self.nof_ports && symbol < MAX_NSYMB_PER_SLOT && subcarrier < self.nof_subc,
            "RE out of bounds: port={}, symbol={}, subcarrier={}",
            port,
            symbol,
            subcarrier
        );
        (port * MAX_NSYMB_PER_SLOT + symbol) * self.nof_subc + subcarrier
    }

    /// Set every RE to zero
    pub fn clear(&self) {
        self.cells.iter().for_each(|c| c.store(0, Ordering::Relaxed));
    }

    /// Copy of the grid indexed by (port, symbol, subcarrier)
    pub fn snapshot(&self) -> Array3<Complex32> {
        Array3::from_shape_fn((self.nof_ports, MAX_NSYMB_PER_SLOT, self.nof_subc), |(p, l, k)| {
            self.get(p, l, k)
        })
    }

    /// Number of REs holding a nonzero value on a port
    pub fn count_nonzero(&self, port: usize) -> usize {
        let start = self.index(port, 0, 0);
        self.cells[start..start + MAX_NSYMB_PER_SLOT * self.nof_subc]
            .iter()
            .filter(|c| unpack(c.load(Ordering::Relaxed)) != Complex32::new(0.0, 0.0))
            .count()
    }
}

impl ResourceGridWriter for ResourceGrid {
    fn nof_ports(&self) -> usize {
        self.nof_ports
    }

    fn nof_subc(&self) -> usize {
        self.nof_subc
    }

    fn nof_symbols(&self) -> usize {
        MAX_NSYMB_PER_SLOT
    }

    #[inline]
    fn put(&self, port: usize, symbol: usize, subcarrier: usize, value: Complex32) {
        self.cells[self.index(port, symbol, subcarrier)].store(pack(value), Ordering::Relaxed);
    }
}

impl ResourceGridReader for ResourceGrid {
    #[inline]
    fn get(&self, port: usize, symbol: usize, subcarrier: usize) -> Complex32 {
        unpack(self.cells[self.index(port, symbol, subcarrier)].load(Ordering::Relaxed))
    }
}
