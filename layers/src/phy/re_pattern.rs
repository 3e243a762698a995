//! Resource Element Patterns
//!
//! Describes sets of resource elements as the product of a PRB mask, a
//! per-RB subcarrier mask and an OFDM symbol mask. Used for reserved
//! resources (CSI-RS, DM-RS, PT-RS) and for the PDSCH allocation itself.

use common::{MAX_NSYMB_PER_SLOT, NOF_SUBCARRIERS_PER_RB};
use serde::{Deserialize, Serialize};

/// OFDM symbols within a slot, one bit per symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SymbolMask(u16);

impl SymbolMask {
    const FULL: u16 = (1 << MAX_NSYMB_PER_SLOT) - 1;

    pub fn new() -> Self {
        Self(0)
    }

    /// Mask with `nof_symbols` consecutive symbols starting at `start`
    pub fn from_range(start: usize, nof_symbols: usize) -> Self {
        let mut mask = Self::new();
        for symbol in start..(start + nof_symbols).min(MAX_NSYMB_PER_SLOT) {
            mask.set(symbol);
        }
        mask
    }

    pub fn from_symbols(symbols: &[usize]) -> Self {
        let mut mask = Self::new();
        symbols.iter().for_each(|&s| mask.set(s));
        mask
    }

    pub fn from_bits(bits: u16) -> Self {
        Self(bits & Self::FULL)
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn set(&mut self, symbol: usize) {
        if symbol < MAX_NSYMB_PER_SLOT {
            self.0 |= 1 << symbol;
        }
    }

    pub fn is_set(&self, symbol: usize) -> bool {
        symbol < MAX_NSYMB_PER_SLOT && self.0 & (1 << symbol) != 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Lowest set symbol
    pub fn first(&self) -> Option<usize> {
        (!self.is_empty()).then(|| self.0.trailing_zeros() as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_NSYMB_PER_SLOT).filter(move |&s| self.is_set(s))
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Set of REs: every `re_mask` subcarrier of every `prb_mask` PRB in every `symbols` symbol
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RePattern {
    /// PRBs counted from the grid origin
    pub prb_mask: Vec<bool>,
    /// Subcarriers within each selected PRB
    pub re_mask: [bool; NOF_SUBCARRIERS_PER_RB],
    pub symbols: SymbolMask,
}

impl RePattern {
    pub fn new(prb_mask: Vec<bool>, re_mask: [bool; NOF_SUBCARRIERS_PER_RB], symbols: SymbolMask) -> Self {
        Self { prb_mask, re_mask, symbols }
    }

    /// Whether the RE at (symbol, subcarrier) belongs to the pattern
    pub fn contains(&self, symbol: usize, subcarrier: usize) -> bool {
        let prb = subcarrier / NOF_SUBCARRIERS_PER_RB;
        self.symbols.is_set(symbol)
            && self.prb_mask.get(prb).copied().unwrap_or(false)
            && self.re_mask[subcarrier % NOF_SUBCARRIERS_PER_RB]
    }

    /// Set to true the mask entries of the REs in this pattern for one symbol
    pub fn get_inclusion_mask(&self, mask: &mut [bool], symbol: usize) {
        self.apply(mask, symbol, true);
    }

    /// Set to false the mask entries of the REs in this pattern for one symbol
    pub fn get_exclusion_mask(&self, mask: &mut [bool], symbol: usize) {
        self.apply(mask, symbol, false);
    }

    fn apply(&self, mask: &mut [bool], symbol: usize, value: bool) {
        if !self.symbols.is_set(symbol) {
            return;
        }
        for (prb, rb_mask) in mask.chunks_mut(NOF_SUBCARRIERS_PER_RB).enumerate() {
            if !self.prb_mask.get(prb).copied().unwrap_or(false) {
                continue;
            }
            for (entry, &selected) in rb_mask.iter_mut().zip(&self.re_mask) {
                if selected {
                    *entry = value;
                }
            }
        }
    }
}

/// Union of RE patterns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RePatternList {
    patterns: Vec<RePattern>,
}

impl RePatternList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RePattern> {
        self.patterns.iter()
    }

    /// Add a pattern, folding it into an existing one when two of its masks match
    pub fn merge(&mut self, pattern: RePattern) {
        for existing in &mut self.patterns {
            if existing.prb_mask != pattern.prb_mask {
                continue;
            }
            if existing.re_mask == pattern.re_mask {
                existing.symbols = existing.symbols.union(&pattern.symbols);
                return;
            }
            if existing.symbols == pattern.symbols {
                for (a, b) in existing.re_mask.iter_mut().zip(&pattern.re_mask) {
                    *a |= *b;
                }
                return;
            }
        }
        self.patterns.push(pattern);
    }

    pub fn contains(&self, symbol: usize, subcarrier: usize) -> bool {
        self.patterns.iter().any(|p| p.contains(symbol, subcarrier))
    }

    pub fn get_inclusion_mask(&self, mask: &mut [bool], symbol: usize) {
        self.patterns.iter().for_each(|p| p.get_inclusion_mask(mask, symbol));
    }

    pub fn get_exclusion_mask(&self, mask: &mut [bool], symbol: usize) {
        self.patterns.iter().for_each(|p| p.get_exclusion_mask(mask, symbol));
    }

    /// Number of REs covered by the list inside a PRB mask and a symbol range
    pub fn get_inclusion_count(&self, start_symbol: usize, nof_symbols: usize, prb_mask: &[bool]) -> usize {
        let mut mask = vec![false; prb_mask.len() * NOF_SUBCARRIERS_PER_RB];
        let mut count = 0;
        for symbol in start_symbol..start_symbol + nof_symbols {
            mask.fill(false);
            self.get_inclusion_mask(&mut mask, symbol);
            count += mask
                .chunks(NOF_SUBCARRIERS_PER_RB)
                .zip(prb_mask)
                .filter(|(_, &allocated)| allocated)
                .map(|(rb, _)| rb.iter().filter(|&&re| re).count())
                .sum::<usize>();
        }
        count
    }
}

impl From<Vec<RePattern>> for RePatternList {
    fn from(patterns: Vec<RePattern>) -> Self {
        let mut list = Self::new();
        patterns.into_iter().for_each(|p| list.merge(p));
        list
    }
}

/// Frequency-domain PDSCH allocation relative to the BWP start
///
/// VRB-to-PRB mapping is non-interleaved, so VRB n maps to PRB n.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbAllocation {
    /// Type 1 allocation: `len` RBs from `start`
    Contiguous { start: usize, len: usize },
    /// Type 0 style allocation, one entry per BWP RB
    Bitmap(Vec<bool>),
}

impl RbAllocation {
    pub fn nof_rb(&self) -> usize {
        match self {
            RbAllocation::Contiguous { len, .. } => *len,
            RbAllocation::Bitmap(bits) => bits.iter().filter(|&&b| b).count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nof_rb() == 0
    }

    /// One past the highest allocated RB, relative to the BWP start
    pub fn rb_end(&self) -> usize {
        match self {
            RbAllocation::Contiguous { start, len } => start + len,
            RbAllocation::Bitmap(bits) => bits.iter().rposition(|&b| b).map_or(0, |i| i + 1),
        }
    }

    /// PRB mask from the grid origin, of length `bwp_start + bwp_size`
    pub fn prb_mask(&self, bwp_start: usize, bwp_size: usize) -> Vec<bool> {
        let mut mask = vec![false; bwp_start + bwp_size];
        match self {
            RbAllocation::Contiguous { start, len } => {
                for rb in *start..(start + len).min(bwp_size) {
                    mask[bwp_start + rb] = true;
                }
            }
            RbAllocation::Bitmap(bits) => {
                for (rb, _) in bits.iter().enumerate().take(bwp_size).filter(|(_, &b)| b) {
                    mask[bwp_start + rb] = true;
                }
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_other_re() -> [bool; 12] {
        let mut re = [false; 12];
        re.iter_mut().step_by(2).for_each(|r| *r = true);
        re
    }

    #[test]
    fn test_symbol_mask() {
        let mask = SymbolMask::from_range(2, 12);
        assert_eq!(mask.count(), 12);
        assert_eq!(mask.first(), Some(2));
        assert!(!mask.is_set(1));

        let truncated = SymbolMask::from_range(10, 8);
        assert_eq!(truncated.iter().collect::<Vec<_>>(), vec![10, 11, 12, 13]);
        assert_eq!(SymbolMask::new().first(), None);
    }

    #[test]
    fn test_pattern_masks() {
        let pattern = RePattern::new(vec![false, true], every_other_re(), SymbolMask::from_symbols(&[3]));

        let mut mask = vec![false; 24];
        pattern.get_inclusion_mask(&mut mask, 3);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 6);
        assert!(mask[12] && !mask[13] && !mask[0]);

        let mut mask = vec![true; 24];
        pattern.get_exclusion_mask(&mut mask, 2);
        assert!(mask.iter().all(|&m| m));
        pattern.get_exclusion_mask(&mut mask, 3);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 18);

        assert!(pattern.contains(3, 14));
        assert!(!pattern.contains(3, 15));
        assert!(!pattern.contains(4, 14));
    }

    #[test]
    fn test_merge_combines_compatible_patterns() {
        let mut list = RePatternList::new();
        list.merge(RePattern::new(vec![true; 4], every_other_re(), SymbolMask::from_symbols(&[2])));
        list.merge(RePattern::new(vec![true; 4], every_other_re(), SymbolMask::from_symbols(&[11])));
        assert_eq!(list.len(), 1);

        let mut odd = [false; 12];
        odd.iter_mut().skip(1).step_by(2).for_each(|r| *r = true);
        list.merge(RePattern::new(vec![true; 4], odd, SymbolMask::from_symbols(&[2, 11])));
        assert_eq!(list.len(), 1);

        list.merge(RePattern::new(vec![false, true], odd, SymbolMask::from_symbols(&[5])));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_inclusion_count() {
        let list: RePatternList = vec![
            RePattern::new(vec![true; 10], every_other_re(), SymbolMask::from_symbols(&[2])),
            RePattern::new(vec![true; 10], [true; 12], SymbolMask::from_symbols(&[7])),
        ]
        .into();

        let mut allocation = vec![false; 10];
        allocation[2..6].fill(true);
        // Symbol 2: 4 RB x 6 RE, symbol 7: 4 RB x 12 RE
        assert_eq!(list.get_inclusion_count(0, 14, &allocation), 24 + 48);
        assert_eq!(list.get_inclusion_count(3, 3, &allocation), 0);
    }

    #[test]
    fn test_rb_allocation() {
        let contiguous = RbAllocation::Contiguous { start: 2, len: 3 };
        let mask = contiguous.prb_mask(5, 10);
        assert_eq!(mask.len(), 15);
        assert_eq!(positions(&mask), vec![7, 8, 9]);
        assert_eq!(contiguous.rb_end(), 5);

        let bitmap = RbAllocation::Bitmap(vec![true, false, true, false]);
        assert_eq!(bitmap.nof_rb(), 2);
        assert_eq!(bitmap.rb_end(), 3);
        assert_eq!(bitmap.prb_mask(1, 4), vec![false, true, false, true, false]);
    }

    fn positions(mask: &[bool]) -> Vec<usize> {
        mask.iter().enumerate().filter(|(_, &b)| b).map(|(i, _)| i).collect()
    }
}
