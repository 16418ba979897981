//! Gaussian beam propagation: waist size along the optical axis.

use std::f64::consts::PI;

use super::levenberg::{levenberg_marquardt, FitError, FitResult};

/// Beam radius at `z` for a beam with waist `w0` located at `z0`
pub fn gaussian_beam_waist(z: f64, w0: f64, z0: f64, wavelength: f64) -> f64 {
    let rayleigh = PI * w0 * w0 / wavelength;
    w0 * (1.0 + ((z - z0) / rayleigh).powi(2)).sqrt()
}

/// Fit `[w0, z0]` to measured radii at known axial positions.
///
/// The smallest measured radius seeds both the waist and its location.
pub fn fit_beam_waist(
    waists: &[f64],
    positions: &[f64],
    wavelength: f64,
) -> Result<FitResult, FitError> {
    let start = waists
        .iter()
        .zip(positions)
        .min_by(|a, b| a.0.total_cmp(b.0))
        .map(|(&w, &z)| vec![w, z])
        .ok_or(FitError::InsufficientData {
            parameters: 2,
            got: 0,
        })?;
    levenberg_marquardt(
        |&z, p| gaussian_beam_waist(z, p[0], p[1], wavelength),
        positions,
        waists,
        None,
        &start,
    )
}
