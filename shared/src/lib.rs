//! Shared picture primitives for tweezer-array analysis.
//!
//! Everything here is independent of atoms and thresholds: cropping picture
//! stacks, estimating the background level from picture borders, scanning
//! summary statistics, and (behind the `synthetic` feature) generating
//! picture stacks with a known ground truth.

pub mod image_proc;
pub mod stats_scan;
pub mod window;

pub use image_proc::border::{average_border_count, border_counts, corner_average, zero_corners};
pub use stats_scan::{StatsError, StatsScan};
pub use window::{crop_stack, PixelWindow, WindowError};
