//! Post-selection of repetitions on what the rearrangement did.

use serde::{Deserialize, Serialize};

use super::parser::RearrangeEntry;

/// Enough atoms were loaded to fill every target site
pub fn has_sufficient_loading(entry: &RearrangeEntry, target_sites: usize) -> bool {
    entry.loaded() >= target_sites
}

/// At least one move was made without flashing the static traps
pub fn includes_unflashed_move(entry: &RearrangeEntry) -> bool {
    entry.moves.iter().any(|m| !m.flashed)
}

/// At least one move carried several atoms, or exactly `size` atoms when given
pub fn includes_parallel_move(entry: &RearrangeEntry, size: Option<usize>) -> bool {
    entry.moves.iter().any(|m| match size {
        Some(size) => m.atoms.len() == size,
        None => m.is_parallel(),
    })
}

/// Every move carried several atoms (or exactly `size`). Vacuously true without moves.
pub fn is_only_parallel(entry: &RearrangeEntry, size: Option<usize>) -> bool {
    entry.moves.iter().all(|m| match size {
        Some(size) => m.atoms.len() == size,
        None => m.is_parallel(),
    })
}

pub fn has_no_parallel_move(entry: &RearrangeEntry) -> bool {
    !entry.moves.iter().any(|m| m.is_parallel())
}

pub fn has_move_count(entry: &RearrangeEntry, moves: usize) -> bool {
    entry.moves.len() == moves
}

/// Which repetitions enter the rearrangement statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveFilters {
    pub sufficient_loading: bool,
    pub includes_unflashed: bool,
    pub includes_parallel: bool,
    pub only_parallel: bool,
    pub no_parallel: bool,
    /// Number of atoms that counts as a parallel move for the two checks above
    pub parallel_size: Option<usize>,
    pub number_of_moves: Option<usize>,
}

impl Default for MoveFilters {
    fn default() -> Self {
        Self {
            sufficient_loading: true,
            includes_unflashed: false,
            includes_parallel: false,
            only_parallel: false,
            no_parallel: false,
            parallel_size: None,
            number_of_moves: None,
        }
    }
}

impl MoveFilters {
    /// Keep everything
    pub fn none() -> Self {
        Self {
            sufficient_loading: false,
            ..Self::default()
        }
    }

    pub fn keep(&self, entry: &RearrangeEntry, target_sites: usize) -> bool {
        (!self.sufficient_loading || has_sufficient_loading(entry, target_sites))
            && (!self.includes_unflashed || includes_unflashed_move(entry))
            && (!self.includes_parallel || includes_parallel_move(entry, self.parallel_size))
            && (!self.only_parallel || is_only_parallel(entry, self.parallel_size))
            && (!self.no_parallel || has_no_parallel_move(entry))
            && self.number_of_moves.map_or(true, |n| has_move_count(entry, n))
    }
}
