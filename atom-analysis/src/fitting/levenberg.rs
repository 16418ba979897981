//! Levenberg-Marquardt least squares with a forward-difference Jacobian.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during curve fitting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: {parameters} parameters need at least {parameters} points, got {got}")]
    InsufficientData { parameters: usize, got: usize },
    #[error("length mismatch: {x_len} coordinates, {y_len} values")]
    LengthMismatch { x_len: usize, y_len: usize },
    #[error("uncertainty {value} at point {index} is not a positive finite number")]
    InvalidSigma { index: usize, value: f64 },
    #[error("model produced a non-finite value")]
    NonFinite,
    #[error("normal equations are singular")]
    Singular,
    #[error("no convergence after {iterations} iterations")]
    NoConvergence { iterations: usize },
}

/// Iteration controls
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Relative chi-squared improvement below which the fit has converged
    pub tolerance: f64,
    pub initial_damping: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

/// Fitted parameters and their uncertainties
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub params: Vec<f64>,
    /// One standard deviation per parameter, `sqrt(diag(covariance))`
    pub errors: Vec<f64>,
    /// Covariance scaled by the reduced chi-squared
    pub covariance: Vec<Vec<f64>>,
    pub chi_squared: f64,
    pub iterations: usize,
}

const MAX_DAMPING: f64 = 1e16;

struct Problem<'a, X, F> {
    model: &'a F,
    x: &'a [X],
    y: &'a [f64],
    weights: Vec<f64>,
}

impl<X, F> Problem<'_, X, F>
where
    F: Fn(&X, &[f64]) -> f64,
{
    fn residuals(&self, params: &[f64]) -> Result<DVector<f64>, FitError> {
        let mut r = DVector::zeros(self.y.len());
        for (i, (x, &y)) in self.x.iter().zip(self.y).enumerate() {
            let value = (self.model)(x, params);
            if !value.is_finite() {
                return Err(FitError::NonFinite);
            }
            r[i] = (y - value) * self.weights[i];
        }
        Ok(r)
    }

    /// Weighted model Jacobian, `d f_i / d p_j`
    fn jacobian(&self, params: &[f64], base: &DVector<f64>) -> Result<DMatrix<f64>, FitError> {
        let mut jac = DMatrix::zeros(self.y.len(), params.len());
        let mut shifted = params.to_vec();
        for j in 0..params.len() {
            let step = if params[j] == 0.0 {
                f64::EPSILON.sqrt()
            } else {
                f64::EPSILON.sqrt() * params[j].abs()
            };
            shifted[j] = params[j] + step;
            let r = self.residuals(&shifted)?;
            shifted[j] = params[j];
            // residual = y - f, so df = -(r_shifted - r_base)
            for i in 0..self.y.len() {
                jac[(i, j)] = (base[i] - r[i]) / step;
            }
        }
        Ok(jac)
    }
}

/// Fit `model(x, params)` to `y` by weighted least squares.
///
/// # Arguments
/// * `model` - Model evaluated at one coordinate
/// * `x` - Coordinates, one per value
/// * `y` - Measured values
/// * `sigma` - Optional one-sigma uncertainties of `y`
/// * `initial` - Starting parameters
///
/// # Returns
/// * `Ok(FitResult)` - Parameters with covariance scaled by the reduced
///   chi-squared, so errors reflect the observed scatter
/// * `Err(FitError)` - On invalid input or a failed fit
pub fn levenberg_marquardt<X, F>(
    model: F,
    x: &[X],
    y: &[f64],
    sigma: Option<&[f64]>,
    initial: &[f64],
) -> Result<FitResult, FitError>
where
    F: Fn(&X, &[f64]) -> f64,
{
    levenberg_marquardt_with(model, x, y, sigma, initial, &FitOptions::default())
}

pub fn levenberg_marquardt_with<X, F>(
    model: F,
    x: &[X],
    y: &[f64],
    sigma: Option<&[f64]>,
    initial: &[f64],
    options: &FitOptions,
) -> Result<FitResult, FitError>
where
    F: Fn(&X, &[f64]) -> f64,
{
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x_len: x.len(),
            y_len: y.len(),
        });
    }
    if y.len() < initial.len() || initial.is_empty() {
        return Err(FitError::InsufficientData {
            parameters: initial.len(),
            got: y.len(),
        });
    }

    let weights = match sigma {
        Some(sigma) => {
            if sigma.len() != y.len() {
                return Err(FitError::LengthMismatch {
                    x_len: sigma.len(),
                    y_len: y.len(),
                });
            }
            sigma
                .iter()
                .enumerate()
                .map(|(index, &value)| {
                    if value.is_finite() && value > 0.0 {
                        Ok(1.0 / value)
                    } else {
                        Err(FitError::InvalidSigma { index, value })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        None => vec![1.0; y.len()],
    };

    let problem = Problem {
        model: &model,
        x,
        y,
        weights,
    };

    let mut params = initial.to_vec();
    let mut residuals = problem.residuals(&params)?;
    let mut chi_squared = residuals.norm_squared();
    let mut damping = options.initial_damping;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        iterations += 1;
        let jac = problem.jacobian(&params, &residuals)?;
        let jtj = jac.transpose() * &jac;
        let gradient = jac.transpose() * &residuals;

        let mut improved = false;
        while damping < MAX_DAMPING {
            let mut system = jtj.clone();
            for k in 0..params.len() {
                system[(k, k)] += damping * jtj[(k, k)].max(f64::MIN_POSITIVE);
            }
            let Some(cholesky) = system.cholesky() else {
                damping *= 10.0;
                continue;
            };
            let step = cholesky.solve(&gradient);
            let candidate: Vec<f64> = params.iter().zip(step.iter()).map(|(p, s)| p + s).collect();

            match problem.residuals(&candidate) {
                Ok(r) if r.norm_squared() < chi_squared => {
                    let new_chi = r.norm_squared();
                    let relative = (chi_squared - new_chi) / chi_squared.max(f64::MIN_POSITIVE);
                    params = candidate;
                    residuals = r;
                    chi_squared = new_chi;
                    damping = (damping / 10.0).max(1e-12);
                    improved = true;
                    if relative < options.tolerance {
                        converged = true;
                    }
                    break;
                }
                _ => damping *= 10.0,
            }
        }

        // No step reduces chi-squared any more: we sit at a minimum
        if !improved || converged || chi_squared == 0.0 {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(FitError::NoConvergence { iterations });
    }

    let jac = problem.jacobian(&params, &residuals)?;
    let jtj = jac.transpose() * &jac;
    let inverse = jtj.try_inverse().ok_or(FitError::Singular)?;
    let dof = y.len().saturating_sub(params.len());
    let scale = if dof > 0 {
        chi_squared / dof as f64
    } else {
        1.0
    };
    let covariance = inverse * scale;
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(FitError::Singular);
    }

    let errors = (0..params.len())
        .map(|k| covariance[(k, k)].abs().sqrt())
        .collect();
    let covariance = (0..params.len())
        .map(|r| (0..params.len()).map(|c| covariance[(r, c)]).collect())
        .collect();

    Ok(FitResult {
        params,
        errors,
        covariance,
        chi_squared,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|x| 3.0 * x - 2.0).collect();
        let fit = levenberg_marquardt(|x, p| p[0] * x + p[1], &x, &y, None, &[1.0, 0.0]).unwrap();

        assert_relative_eq!(fit.params[0], 3.0, epsilon = 1e-6);
        assert_relative_eq!(fit.params[1], -2.0, epsilon = 1e-6);
        assert!(fit.chi_squared < 1e-12);
    }

    #[test]
    fn test_exponential_decay() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|x| 2.5 * (-x / 1.7).exp()).collect();
        let fit =
            levenberg_marquardt(|x, p| p[0] * (-x / p[1]).exp(), &x, &y, None, &[1.0, 1.0]).unwrap();

        assert_relative_eq!(fit.params[0], 2.5, epsilon = 1e-5);
        assert_relative_eq!(fit.params[1], 1.7, epsilon = 1e-5);
    }

    #[test]
    fn test_errors_scale_with_scatter() {
        // Alternating +-0.1 scatter around a constant
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.1 } else { 0.9 }).collect();
        let fit = levenberg_marquardt(|_, p| p[0], &x, &y, None, &[0.0]).unwrap();

        assert_relative_eq!(fit.params[0], 1.0, epsilon = 1e-8);
        // reduced chi^2 = 0.2 / 19, error = sqrt(0.2 / 19 / 20)
        assert_relative_eq!(fit.errors[0], (0.2_f64 / 19.0 / 20.0).sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_insufficient_data() {
        let err = levenberg_marquardt(|x: &f64, p| p[0] * x + p[1], &[1.0], &[2.0], None, &[1.0, 0.0])
            .unwrap_err();
        assert_eq!(
            err,
            FitError::InsufficientData {
                parameters: 2,
                got: 1
            }
        );
    }

    #[test]
    fn test_invalid_sigma() {
        let err = levenberg_marquardt(
            |x: &f64, p| p[0] * x,
            &[1.0, 2.0],
            &[1.0, 2.0],
            Some(&[1.0, 0.0]),
            &[1.0],
        )
        .unwrap_err();
        assert!(matches!(err, FitError::InvalidSigma { index: 1, .. }));
    }

    #[test]
    fn test_non_finite_model() {
        let err = levenberg_marquardt(|_: &f64, _| f64::NAN, &[1.0, 2.0], &[1.0, 2.0], None, &[1.0])
            .unwrap_err();
        assert_eq!(err, FitError::NonFinite);
    }

    #[test]
    fn test_degenerate_parameter_is_singular() {
        // p[1] never influences the model
        let x: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let y = x.clone();
        let err = levenberg_marquardt(|x, p| p[0] * x, &x, &y, None, &[0.5, 1.0]).unwrap_err();
        assert_eq!(err, FitError::Singular);
    }
}
