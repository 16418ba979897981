//! Rotated two-dimensional Gaussian for fitting whole pictures.
//!
//! Parameters are `[amplitude, x0, y0, sigma_x, sigma_y, theta, offset]` with
//! `x` along columns and `y` along rows. The Gaussian has two mirror axes, so
//! `theta` is confined to `[-pi/4, pi/4]`; outside that range the model
//! returns a large penalty value so the optimiser never flips the axes.

use ndarray::ArrayView2;
use std::f64::consts::FRAC_PI_4;

use super::levenberg::{levenberg_marquardt, FitError, FitResult};

pub const PARAMETER_COUNT: usize = 7;

const THETA_PENALTY: f64 = 1e10;

/// Evaluate the Gaussian at `(x, y)` without any parameter checks
pub fn gaussian_2d_raw(x: f64, y: f64, p: &[f64]) -> f64 {
    let [amplitude, x0, y0, sigma_x, sigma_y, theta, offset] =
        [p[0], p[1], p[2], p[3], p[4], p[5], p[6]];
    let (sin, cos) = theta.sin_cos();
    let sin2 = (2.0 * theta).sin();
    let a = cos * cos / (2.0 * sigma_x * sigma_x) + sin * sin / (2.0 * sigma_y * sigma_y);
    let b = -sin2 / (4.0 * sigma_x * sigma_x) + sin2 / (4.0 * sigma_y * sigma_y);
    let c = sin * sin / (2.0 * sigma_x * sigma_x) + cos * cos / (2.0 * sigma_y * sigma_y);
    let dx = x - x0;
    let dy = y - y0;
    offset + amplitude * (-(a * dx * dx + 2.0 * b * dx * dy + c * dy * dy)).exp()
}

/// Evaluate the Gaussian, returning a penalty when `theta` leaves `[-pi/4, pi/4]`
pub fn gaussian_2d(x: f64, y: f64, p: &[f64]) -> f64 {
    if p[5].abs() > FRAC_PI_4 {
        return THETA_PENALTY;
    }
    gaussian_2d_raw(x, y, p)
}

/// Starting parameters: peak at the brightest pixel, offset at the dimmest
pub fn guess_picture(picture: ArrayView2<f64>, sigma_x: f64, sigma_y: f64) -> Vec<f64> {
    let mut min = f64::INFINITY;
    let mut max = (f64::NEG_INFINITY, 0usize, 0usize);
    for ((row, col), &value) in picture.indexed_iter() {
        min = min.min(value);
        if value > max.0 {
            max = (value, row, col);
        }
    }
    vec![max.0 - min, max.2 as f64, max.1 as f64, sigma_x, sigma_y, 0.0, min]
}

/// Fit a rotated 2-D Gaussian to a picture.
///
/// # Arguments
/// * `picture` - Picture shaped `(rows, cols)`
/// * `sigma_x` - Width guess along columns, in pixels
/// * `sigma_y` - Width guess along rows, in pixels
pub fn fit_picture(
    picture: ArrayView2<f64>,
    sigma_x: f64,
    sigma_y: f64,
) -> Result<FitResult, FitError> {
    let coordinates: Vec<(f64, f64)> = picture
        .indexed_iter()
        .map(|((row, col), _)| (col as f64, row as f64))
        .collect();
    let values: Vec<f64> = picture.iter().copied().collect();
    let guess = guess_picture(picture, sigma_x, sigma_y);
    levenberg_marquardt(
        |&(x, y), p| gaussian_2d(x, y, p),
        &coordinates,
        &values,
        None,
        &guess,
    )
}
