//! Synthetic tweezer-array picture stacks with a known ground truth.
//!
//! Pictures are built from a flat camera background with Gaussian read
//! noise, plus Poisson-distributed fluorescence on the pixel of every
//! occupied trap. The first picture of each repetition samples loading with
//! `loading_probability`; every later picture keeps each atom with the
//! survival probability of the current variation.
//!
//! All randomness comes from a seeded ChaCha generator, so tests built on
//! these stacks are reproducible.

use ndarray::{Array3, Array4};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntheticError {
    #[error("invalid noise model: {0}")]
    InvalidNoise(String),
    #[error("site ({row}, {col}) lies outside a {rows}x{cols} picture")]
    SiteOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("probability {0} is outside [0, 1]")]
    InvalidProbability(f64),
}

/// Camera and trap description used to synthesise pictures
#[derive(Debug, Clone)]
pub struct TweezerArray {
    /// Picture height in pixels
    pub rows: usize,
    /// Picture width in pixels
    pub cols: usize,
    /// Trap locations as `(row, col)`
    pub sites: Vec<(usize, usize)>,
    /// Mean camera background in counts
    pub background: f64,
    /// Gaussian read noise RMS in counts
    pub read_noise: f64,
    /// Mean fluorescence counts of a single atom
    pub atom_counts: f64,
    /// Probability that a trap is loaded in the first picture
    pub loading_probability: f64,
}

impl Default for TweezerArray {
    fn default() -> Self {
        Self {
            rows: 12,
            cols: 12,
            sites: vec![(3, 3), (3, 6), (3, 9), (8, 3), (8, 6), (8, 9)],
            background: 100.0,
            read_noise: 8.0,
            atom_counts: 250.0,
            loading_probability: 0.55,
        }
    }
}

/// Generated stack together with the occupancy that produced it
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    /// Pictures shaped `(variations * repetitions * pictures_per_repetition, rows, cols)`
    pub pictures: Array3<f64>,
    /// Ground truth shaped `(variations * repetitions, pictures_per_repetition, sites)`
    pub occupancy: Array3<bool>,
    pub repetitions: usize,
    pub pictures_per_repetition: usize,
}

impl SyntheticRun {
    /// Ground truth regrouped as `(variation, repetition, picture, site)`
    pub fn grouped_occupancy(&self) -> Array4<bool> {
        let (shots, pics, sites) = self.occupancy.dim();
        let variations = shots / self.repetitions.max(1);
        Array4::from_shape_fn(
            (variations, self.repetitions, pics, sites),
            |(v, r, p, s)| self.occupancy[[v * self.repetitions + r, p, s]],
        )
    }
}

fn check_probability(p: f64) -> Result<f64, SyntheticError> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(SyntheticError::InvalidProbability(p))
    }
}

/// Generate a picture stack for a survival-style scan.
///
/// # Arguments
/// * `array` - Camera and trap description
/// * `survival_per_variation` - Survival probability between consecutive
///   pictures, one entry per variation
/// * `repetitions` - Repetitions per variation
/// * `pictures_per_repetition` - Pictures taken in each repetition
/// * `seed` - RNG seed
pub fn generate_run(
    array: &TweezerArray,
    survival_per_variation: &[f64],
    repetitions: usize,
    pictures_per_repetition: usize,
    seed: u64,
) -> Result<SyntheticRun, SyntheticError> {
    for &(row, col) in &array.sites {
        if row >= array.rows || col >= array.cols {
            return Err(SyntheticError::SiteOutOfBounds {
                row,
                col,
                rows: array.rows,
                cols: array.cols,
            });
        }
    }
    let loading = check_probability(array.loading_probability)?;
    for &p in survival_per_variation {
        check_probability(p)?;
    }

    let read_noise = Normal::new(array.background, array.read_noise)
        .map_err(|e| SyntheticError::InvalidNoise(e.to_string()))?;
    let fluorescence = Poisson::new(array.atom_counts)
        .map_err(|e| SyntheticError::InvalidNoise(e.to_string()))?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let shots = survival_per_variation.len() * repetitions;
    let total_pictures = shots * pictures_per_repetition;

    let mut pictures = Array3::<f64>::zeros((total_pictures, array.rows, array.cols));
    pictures.mapv_inplace(|_| read_noise.sample(&mut rng));

    let mut occupancy =
        Array3::from_elem((shots, pictures_per_repetition, array.sites.len()), false);

    for (variation, &survival) in survival_per_variation.iter().enumerate() {
        for repetition in 0..repetitions {
            let shot = variation * repetitions + repetition;
            for picture in 0..pictures_per_repetition {
                let index = shot * pictures_per_repetition + picture;
                for (site_index, &(row, col)) in array.sites.iter().enumerate() {
                    let present = if picture == 0 {
                        rng.random_bool(loading)
                    } else {
                        occupancy[[shot, picture - 1, site_index]] && rng.random_bool(survival)
                    };
                    occupancy[[shot, picture, site_index]] = present;
                    if present {
                        pictures[[index, row, col]] += fluorescence.sample(&mut rng);
                    }
                }
            }
        }
    }

    log::debug!(
        "generated {} synthetic pictures ({} variations x {} repetitions x {} pictures)",
        total_pictures,
        survival_per_variation.len(),
        repetitions,
        pictures_per_repetition
    );

    Ok(SyntheticRun {
        pictures,
        occupancy,
        repetitions,
        pictures_per_repetition,
    })
}
