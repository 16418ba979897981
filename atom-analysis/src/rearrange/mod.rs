//! Atom rearrangement: the move log, filters on it, and success statistics.

pub mod analysis;
pub mod filters;
pub mod parser;

pub use analysis::{rearrange_analysis, MoveCategory, RearrangeOptions, RearrangeResult, TargetGroup};
pub use filters::MoveFilters;
pub use parser::{
    parse_rearrange_log, read_rearrange_log, Direction, Move, RearrangeEntry, RearrangeLogError,
};
