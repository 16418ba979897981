//! Atom-presence thresholds from site-count histograms.

pub mod double_gaussian;
pub mod histogram;

pub use double_gaussian::{
    balanced_threshold, double_gaussian, fit_double_gaussian, guess_peaks,
    max_fidelity_threshold, threshold_fidelity, DoubleGaussianParams, Threshold,
};
pub use histogram::{bin_counts, Histogram};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared::StatsError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("bin width must be a positive number, got {0}")]
    InvalidBinWidth(f64),
    #[error("counts between {min} and {max} give fewer than two bins of width {bin_width}")]
    DegenerateHistogram { min: f64, max: f64, bin_width: f64 },
    #[error("bad site counts: {0}")]
    Stats(#[from] StatsError),
}

/// How thresholds are found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdOptions {
    /// Histogram bin width in counts
    pub bin_width: f64,
    /// Use this threshold for every site and skip fitting
    pub manual_threshold: Option<f64>,
    /// Maximise the classification fidelity instead of balancing the peaks
    pub rigorous: bool,
    /// Override the guessed position of the atom peak
    pub second_peak_guess: Option<f64>,
    /// Starting width of both peaks
    pub sigma_guess: f64,
}

impl Default for ThresholdOptions {
    fn default() -> Self {
        Self {
            bin_width: 5.0,
            manual_threshold: None,
            rigorous: true,
            second_peak_guess: None,
            sigma_guess: 30.0,
        }
    }
}

/// Threshold of one site together with what it was derived from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    pub fidelity: f64,
    /// Fitted histogram model; `None` for a manual threshold
    pub fit: Option<DoubleGaussianParams>,
    pub histogram: Histogram,
}

/// Find the threshold separating empty from loaded counts.
///
/// A manual threshold is taken as is with fidelity 0. Otherwise the
/// histogram is fitted with two Gaussians and the threshold placed by
/// [`max_fidelity_threshold`] or [`balanced_threshold`].
pub fn find_threshold(
    counts: &[f64],
    options: &ThresholdOptions,
) -> Result<ThresholdResult, ThresholdError> {
    if let Some(threshold) = options.manual_threshold {
        return Ok(ThresholdResult {
            threshold,
            fidelity: 0.0,
            fit: None,
            histogram: bin_counts(counts, options.bin_width).unwrap_or_default(),
        });
    }

    let histogram = bin_counts(counts, options.bin_width)?;
    let (first, second) = guess_peaks(&histogram, options.sigma_guess);
    let height = histogram.counts.iter().copied().max().unwrap_or(0) as f64;
    let guess = DoubleGaussianParams {
        amplitude1: height,
        center1: first,
        sigma1: options.sigma_guess,
        amplitude2: height * 0.75,
        center2: options.second_peak_guess.unwrap_or(second),
        sigma2: options.sigma_guess,
    };
    let fit = fit_double_gaussian(&histogram, guess);
    let threshold = if options.rigorous {
        max_fidelity_threshold(&fit)
    } else {
        balanced_threshold(&fit)
    };

    Ok(ThresholdResult {
        threshold: threshold.value,
        fidelity: threshold.fidelity,
        fit: Some(fit),
        histogram,
    })
}

/// Thresholds for several sites, fitted in parallel, returned in site order
pub fn find_thresholds(
    per_site: &[Vec<f64>],
    options: &ThresholdOptions,
) -> Result<Vec<ThresholdResult>, ThresholdError> {
    let results = per_site
        .par_iter()
        .map(|counts| find_threshold(counts, options))
        .collect::<Result<Vec<_>, _>>()?;
    for (site, result) in results.iter().enumerate() {
        log::debug!(
            "site {site}: threshold {:.1}, fidelity {:.4}",
            result.threshold,
            result.fidelity
        );
    }
    Ok(results)
}
