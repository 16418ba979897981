//! One-dimensional fits of a statistic against the scanned key.

use serde::{Deserialize, Serialize};

use super::levenberg::{levenberg_marquardt, FitError, FitResult};

/// Models fitted to survival or loading as a function of the key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanModel {
    /// `slope * x + intercept`
    Linear,
    /// `amplitude * exp(-x / decay)`
    ExponentialDecay,
    /// `offset + amplitude * exp(-(x - center)^2 / (2 sigma^2))`
    Gaussian,
}

impl ScanModel {
    pub fn parameter_names(&self) -> &'static [&'static str] {
        match self {
            ScanModel::Linear => &["slope", "intercept"],
            ScanModel::ExponentialDecay => &["amplitude", "decay"],
            ScanModel::Gaussian => &["amplitude", "center", "sigma", "offset"],
        }
    }

    pub fn evaluate(&self, x: f64, p: &[f64]) -> f64 {
        match self {
            ScanModel::Linear => p[0] * x + p[1],
            ScanModel::ExponentialDecay => p[0] * (-x / p[1]).exp(),
            ScanModel::Gaussian => p[3] + p[0] * (-(x - p[1]).powi(2) / (2.0 * p[2] * p[2])).exp(),
        }
    }

    /// Starting parameters estimated from the data
    pub fn guess(&self, key: &[f64], values: &[f64]) -> Vec<f64> {
        let points: Vec<(f64, f64)> = key
            .iter()
            .copied()
            .zip(values.iter().copied())
            .filter(|(k, v)| k.is_finite() && v.is_finite())
            .collect();
        let (min_point, max_point) = match extremes(&points) {
            Some(extremes) => extremes,
            None => return self.default_guess(),
        };
        let key_min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let key_max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let span = key_max - key_min;

        match self {
            ScanModel::Linear => {
                let first = points
                    .iter()
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .copied()
                    .unwrap_or((0.0, 0.0));
                let last = points
                    .iter()
                    .max_by(|a, b| a.0.total_cmp(&b.0))
                    .copied()
                    .unwrap_or((0.0, 0.0));
                let slope = if span > 0.0 {
                    (last.1 - first.1) / span
                } else {
                    0.0
                };
                vec![slope, first.1 - slope * first.0]
            }
            ScanModel::ExponentialDecay => {
                let decay = if span > 0.0 { span / 2.0 } else { 1.0 };
                vec![max_point.1, decay]
            }
            ScanModel::Gaussian => {
                let sigma = if span > 0.0 { span / 4.0 } else { 1.0 };
                vec![max_point.1 - min_point.1, max_point.0, sigma, min_point.1]
            }
        }
    }

    fn default_guess(&self) -> Vec<f64> {
        match self {
            ScanModel::Linear => vec![0.0, 0.0],
            ScanModel::ExponentialDecay => vec![1.0, 3.0],
            ScanModel::Gaussian => vec![1.0, 0.0, 1.0, 0.0],
        }
    }
}

/// Points holding the smallest and largest value
fn extremes(points: &[(f64, f64)]) -> Option<((f64, f64), (f64, f64))> {
    let min = points.iter().min_by(|a, b| a.1.total_cmp(&b.1))?;
    let max = points.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
    Some((*min, *max))
}

/// A fitted scan model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFit {
    pub model: ScanModel,
    #[serde(flatten)]
    pub result: FitResult,
}

impl ScanFit {
    pub fn evaluate(&self, x: f64) -> f64 {
        self.model.evaluate(x, &self.result.params)
    }
}

/// Fit `model` to `values` against `key`.
///
/// Uncertainties are only used when every one of them is positive; a zero
/// error (a variation where every shot agreed) would otherwise pin the fit.
pub fn fit_scan(
    model: ScanModel,
    key: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
) -> Result<ScanFit, FitError> {
    let sigma = errors.filter(|e| e.iter().all(|&v| v.is_finite() && v > 0.0));
    if errors.is_some() && sigma.is_none() {
        log::debug!("{model:?} fit ignores uncertainties that include zeros");
    }
    let guess = model.guess(key, values);
    let result = levenberg_marquardt(|x, p| model.evaluate(*x, p), key, values, sigma, &guess)?;
    Ok(ScanFit { model, result })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_guess_is_exact_for_lines() {
        let key = [1.0, 2.0, 3.0];
        let values = [3.0, 5.0, 7.0];
        let guess = ScanModel::Linear.guess(&key, &values);
        assert_relative_eq!(guess[0], 2.0);
        assert_relative_eq!(guess[1], 1.0);
    }

    #[test]
    fn test_fit_gaussian_resonance() {
        let key: Vec<f64> = (0..41).map(|i| -10.0 + i as f64 * 0.5).collect();
        let values: Vec<f64> = key
            .iter()
            .map(|x| 0.1 + 0.8 * (-(x - 1.5_f64).powi(2) / (2.0 * 2.0 * 2.0)).exp())
            .collect();
        let fit = fit_scan(ScanModel::Gaussian, &key, &values, None).unwrap();

        assert_relative_eq!(fit.result.params[0], 0.8, epsilon = 1e-5);
        assert_relative_eq!(fit.result.params[1], 1.5, epsilon = 1e-5);
        assert_relative_eq!(fit.result.params[2].abs(), 2.0, epsilon = 1e-5);
        assert_relative_eq!(fit.result.params[3], 0.1, epsilon = 1e-5);
        assert_relative_eq!(fit.evaluate(1.5), 0.9, epsilon = 1e-5);
    }

    #[test]
    fn test_fit_decay_with_errors() {
        let key: Vec<f64> = (1..12).map(|i| i as f64).collect();
        let values: Vec<f64> = key.iter().map(|x| 0.95 * (-x / 6.0).exp()).collect();
        let errors = vec![0.01; key.len()];
        let fit = fit_scan(ScanModel::ExponentialDecay, &key, &values, Some(&errors)).unwrap();

        assert_relative_eq!(fit.result.params[0], 0.95, epsilon = 1e-5);
        assert_relative_eq!(fit.result.params[1], 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_errors_fall_back_to_unweighted() {
        let key = [1.0, 2.0, 3.0, 4.0];
        let values = [1.0, 1.0, 1.0, 1.0];
        let errors = [0.0, 0.1, 0.1, 0.1];
        let fit = fit_scan(ScanModel::Linear, &key, &values, Some(&errors)).unwrap();
        assert_relative_eq!(fit.result.params[0], 0.0, epsilon = 1e-8);
        assert_relative_eq!(fit.result.params[1], 1.0, epsilon = 1e-8);
    }
}
