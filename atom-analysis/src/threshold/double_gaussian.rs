//! Double-Gaussian model of a site-count histogram and the thresholds
//! derived from it.
//!
//! The dimmer peak is the camera background of an empty trap, the brighter
//! one the fluorescence of a single atom. A threshold between them splits
//! the counts into empty and loaded.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;
use std::f64::consts::SQRT_2;

use super::histogram::Histogram;
use crate::fitting::levenberg_marquardt;

/// Candidate thresholds tried between the two peaks
const FIDELITY_SCAN_POINTS: usize = 1000;

/// Peak removal factor used when locating the second peak
const FIRST_PEAK_WEIGHT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DoubleGaussianParams {
    pub amplitude1: f64,
    pub center1: f64,
    pub sigma1: f64,
    pub amplitude2: f64,
    pub center2: f64,
    pub sigma2: f64,
}

impl DoubleGaussianParams {
    pub fn from_slice(p: &[f64]) -> Self {
        Self {
            amplitude1: p[0],
            center1: p[1],
            sigma1: p[2],
            amplitude2: p[3],
            center2: p[4],
            sigma2: p[5],
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.amplitude1,
            self.center1,
            self.sigma1,
            self.amplitude2,
            self.center2,
            self.sigma2,
        ]
    }

    /// Swap the peaks if needed so that peak 1 is the dimmer one
    pub fn ordered(self) -> Self {
        if self.center1 <= self.center2 {
            self
        } else {
            Self {
                amplitude1: self.amplitude2,
                center1: self.center2,
                sigma1: self.sigma2,
                amplitude2: self.amplitude1,
                center2: self.center1,
                sigma2: self.sigma1,
            }
        }
    }

    fn is_finite(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }
}

fn gaussian(x: f64, amplitude: f64, center: f64, sigma: f64) -> f64 {
    amplitude * (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

pub fn double_gaussian(x: f64, params: &DoubleGaussianParams) -> f64 {
    gaussian(x, params.amplitude1, params.center1, params.sigma1)
        + gaussian(x, params.amplitude2, params.center2, params.sigma2)
}

/// Standard normal CDF
pub(crate) fn phi(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Locate the two histogram peaks.
///
/// The first peak is the fullest bin. The second is the fullest bin after
/// subtracting an over-weighted Gaussian of width `sigma` centred on the
/// first, which suppresses the first peak's shoulders.
pub fn guess_peaks(histogram: &Histogram, sigma: f64) -> (f64, f64) {
    let argmax = |values: &mut dyn Iterator<Item = f64>| {
        values
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
    };
    if histogram.is_empty() {
        return (0.0, 0.0);
    }

    let counts = histogram.counts_f64();
    let (first, height) = argmax(&mut counts.iter().copied());
    let center = histogram.bins[first];
    let (second, _) = argmax(
        &mut histogram
            .bins
            .iter()
            .zip(&counts)
            .map(|(&x, &c)| c - gaussian(x, FIRST_PEAK_WEIGHT * height, center, sigma)),
    );
    (center, histogram.bins[second])
}

/// Least-squares fit of the histogram.
///
/// A failed fit is logged and the (ordered) guess is returned instead, so a
/// poor histogram never aborts an analysis.
pub fn fit_double_gaussian(
    histogram: &Histogram,
    guess: DoubleGaussianParams,
) -> DoubleGaussianParams {
    let counts = histogram.counts_f64();
    let fit = levenberg_marquardt(
        |&x, p| double_gaussian(x, &DoubleGaussianParams::from_slice(p)),
        &histogram.bins,
        &counts,
        None,
        &guess.to_vec(),
    );
    match fit {
        Ok(result) => {
            let params = DoubleGaussianParams::from_slice(&result.params);
            if params.is_finite() {
                params.ordered()
            } else {
                log::warn!("double-Gaussian fit returned non-finite parameters, using the guess");
                guess.ordered()
            }
        }
        Err(e) => {
            log::warn!("double-Gaussian fit failed ({e}), using the guess");
            guess.ordered()
        }
    }
}

/// A count threshold and the probability of classifying a shot correctly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    pub fidelity: f64,
}

/// The point the same number of standard deviations from both peaks
pub fn balanced_threshold(params: &DoubleGaussianParams) -> Threshold {
    let p = params.ordered();
    let (s1, s2) = (p.sigma1.abs(), p.sigma2.abs());
    if s1 + s2 == 0.0 {
        return Threshold {
            value: (p.center1 + p.center2) / 2.0,
            fidelity: 1.0,
        };
    }
    let t = (p.center2 - p.center1) / (s1 + s2);
    Threshold {
        value: p.center1 + t * s1,
        fidelity: phi(t),
    }
}

/// Fraction of shots classified correctly by threshold `value`
pub fn threshold_fidelity(params: &DoubleGaussianParams, value: f64) -> f64 {
    let p = params.ordered();
    let (s1, s2) = (p.sigma1.abs(), p.sigma2.abs());
    let w1 = p.amplitude1.abs() * s1;
    let w2 = p.amplitude2.abs() * s2;
    if w1 + w2 == 0.0 || s1 == 0.0 || s2 == 0.0 {
        return f64::NAN;
    }
    // empty traps read above the threshold, loaded traps read below it
    let false_positive = w1 * (1.0 - phi((value - p.center1) / s1));
    let false_negative = w2 * phi((value - p.center2) / s2);
    1.0 - (false_positive + false_negative) / (w1 + w2)
}

/// Scan thresholds between the peaks and keep the most faithful one
pub fn max_fidelity_threshold(params: &DoubleGaussianParams) -> Threshold {
    let p = params.ordered();
    if !threshold_fidelity(&p, p.center1).is_finite() || p.center1 == p.center2 {
        return balanced_threshold(&p);
    }
    let step = (p.center2 - p.center1) / (FIDELITY_SCAN_POINTS - 1) as f64;
    (0..FIDELITY_SCAN_POINTS)
        .map(|i| {
            let value = p.center1 + i as f64 * step;
            Threshold {
                value,
                fidelity: threshold_fidelity(&p, value),
            }
        })
        .fold(
            Threshold {
                value: p.center1,
                fidelity: f64::NEG_INFINITY,
            },
            |best, t| if t.fidelity > best.fidelity { t } else { best },
        )
}
