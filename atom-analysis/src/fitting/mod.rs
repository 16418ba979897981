//! Least-squares fitting.
//!
//! Everything here sits on a single Levenberg-Marquardt solver; the
//! submodules only supply models and starting guesses.

pub mod beam;
pub mod gaussian_2d;
pub mod levenberg;
pub mod scan;

pub use beam::{fit_beam_waist, gaussian_beam_waist};
pub use gaussian_2d::{fit_picture, gaussian_2d};
pub use levenberg::{levenberg_marquardt, FitError, FitOptions, FitResult};
pub use scan::{fit_scan, ScanFit, ScanModel};
