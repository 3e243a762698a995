/// Quasi-cyclic LDPC base graphs
///
/// The NR base graphs are read from the lifted parity check matrices of
/// TS 38.212 Tables 5.3.2-2 and 5.3.2-3. Each nonzero block is the Z x Z
/// identity cyclically shifted by V mod Z; the shift is recovered from the
/// first row of the block.
///
/// Column layout: Kb systematic columns, four core parity columns solved
/// through a double-diagonal structure, then one extension parity column per
/// extension row (identity on the diagonal).

use super::LIFTING_SIZES;
use clap::ValueEnum;
use common::LdpcBaseGraph;
use ldpc_toolbox::codes::nr5g::{BaseGraph, LiftingSize};
use std::sync::OnceLock;
use tracing::debug;

/// Number of core (double-diagonal) rows
pub const NOF_CORE_ROWS: usize = 4;

/// One nonzero circulant in a base graph row, shift already reduced mod Z
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseGraphEntry {
    pub column: usize,
    pub shift: usize,
}

/// Solving order of the core parity blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSchedule {
    /// Shift left on the first core column once the core rows are summed
    pub p0_shift: usize,
    /// `(row, column)`: the row resolving each remaining core column
    pub steps: Vec<(usize, usize)>,
}

/// Entries of a row falling on the core parity columns
pub fn core_entries(row: &[BaseGraphEntry], kb: usize) -> impl Iterator<Item = &BaseGraphEntry> + '_ {
    row.iter().filter(move |e| e.column >= kb && e.column < kb + NOF_CORE_ROWS)
}

impl CoreSchedule {
    fn derive(rows: &[Vec<BaseGraphEntry>], kb: usize) -> Option<Self> {
        // Equal circulants cancel in the sum
        let mut residual: Vec<BaseGraphEntry> = Vec::new();
        for r in 0..NOF_CORE_ROWS {
            for entry in core_entries(&rows[r], kb) {
                match residual.iter().position(|x| x == entry) {
                    Some(pos) => {
                        residual.swap_remove(pos);
                    }
                    None => residual.push(*entry),
                }
            }
        }
        let [first] = residual.as_slice() else {
            return None;
        };
        if first.column != kb {
            return None;
        }

        let mut known = [true, false, false, false];
        let mut steps = Vec::with_capacity(NOF_CORE_ROWS - 1);
        while steps.len() < NOF_CORE_ROWS - 1 {
            let (row, column) = (0..NOF_CORE_ROWS).find_map(|r| {
                let mut unknown = core_entries(&rows[r], kb).filter(|e| !known[e.column - kb]);
                match (unknown.next(), unknown.next()) {
                    (Some(entry), None) => Some((r, entry.column)),
                    _ => None,
                }
            })?;
            known[column - kb] = true;
            steps.push((row, column));
        }

        Some(Self { p0_shift: first.shift, steps })
    }
}

/// Sparse description of a base graph lifted by one lifting size
#[derive(Debug)]
pub struct BaseGraphDescription {
    base_graph: LdpcBaseGraph,
    lifting_size: usize,
    nof_systematic: usize,
    nof_columns: usize,
    rows: Vec<Vec<BaseGraphEntry>>,
    core: CoreSchedule,
}

type DescriptionCache = [OnceLock<Option<BaseGraphDescription>>; LIFTING_SIZES.len()];

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: OnceLock<Option<BaseGraphDescription>> = OnceLock::new();
static BASE_GRAPH_1: DescriptionCache = [EMPTY_SLOT; LIFTING_SIZES.len()];
static BASE_GRAPH_2: DescriptionCache = [EMPTY_SLOT; LIFTING_SIZES.len()];

/// Number of systematic columns Kb used for lifting-size selection (TS 38.212 5.2.2)
///
/// `b` is the transport block size including its CRC.
pub fn nof_systematic_columns(base_graph: LdpcBaseGraph, b: usize) -> usize {
    match base_graph {
        LdpcBaseGraph::BaseGraph1 => 22,
        LdpcBaseGraph::BaseGraph2 => {
            if b > 640 {
                10
            } else if b > 560 {
                9
            } else if b > 192 {
                8
            } else {
                6
            }
        }
    }
}

pub(crate) fn nr_base_graph(base_graph: LdpcBaseGraph) -> BaseGraph {
    match base_graph {
        LdpcBaseGraph::BaseGraph1 => BaseGraph::BG1,
        LdpcBaseGraph::BaseGraph2 => BaseGraph::BG2,
    }
}

pub(crate) fn nr_lifting_size(lifting_size: usize) -> Option<LiftingSize> {
    LiftingSize::value_variants()
        .iter()
        .copied()
        .find(|&z| usize::from(z) == lifting_size)
}

impl BaseGraphDescription {
    /// Cached description of a base graph for a lifting size of Table 5.3.2-1
    pub fn get(base_graph: LdpcBaseGraph, lifting_size: usize) -> Option<&'static BaseGraphDescription> {
        let index = LIFTING_SIZES.binary_search(&lifting_size).ok()?;
        let cache = match base_graph {
            LdpcBaseGraph::BaseGraph1 => &BASE_GRAPH_1,
            LdpcBaseGraph::BaseGraph2 => &BASE_GRAPH_2,
        };
        cache[index].get_or_init(|| Self::build(base_graph, lifting_size)).as_ref()
    }

    fn build(base_graph: LdpcBaseGraph, lifting_size: usize) -> Option<Self> {
        let z = lifting_size;
        let h = nr_base_graph(base_graph).h(nr_lifting_size(z)?);
        let nof_systematic = match base_graph {
            LdpcBaseGraph::BaseGraph1 => 22,
            LdpcBaseGraph::BaseGraph2 => 10,
        };

        let rows: Vec<Vec<BaseGraphEntry>> = (0..h.num_rows() / z)
            .map(|r| {
                let mut entries: Vec<BaseGraphEntry> = h
                    .iter_row(r * z)
                    .map(|&col| BaseGraphEntry { column: col / z, shift: col % z })
                    .collect();
                entries.sort_by_key(|e| e.column);
                entries
            })
            .collect();

        let core = CoreSchedule::derive(&rows, nof_systematic)?;
        debug!(
            "Lifted {:?} with Z={}: {} rows, core p0 shift {}",
            base_graph,
            z,
            rows.len(),
            core.p0_shift
        );

        Some(Self {
            base_graph,
            lifting_size,
            nof_systematic,
            nof_columns: h.num_cols() / z,
            rows,
            core,
        })
    }

    pub fn base_graph(&self) -> LdpcBaseGraph {
        self.base_graph
    }

    pub fn lifting_size(&self) -> usize {
        self.lifting_size
    }

    /// Systematic columns of the graph (22 or 10)
    pub fn nof_systematic(&self) -> usize {
        self.nof_systematic
    }

    pub fn nof_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn nof_columns(&self) -> usize {
        self.nof_columns
    }

    pub fn row(&self, index: usize) -> &[BaseGraphEntry] {
        &self.rows[index]
    }

    pub fn core_schedule(&self) -> &CoreSchedule {
        &self.core
    }
}
