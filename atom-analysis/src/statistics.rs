//! Shot outcomes and their per-variation statistics.
//!
//! Per-shot vectors are ordered variation-major, so the statistics of a
//! variation come from consecutive chunks of `repetitions` shots.

use serde::{Deserialize, Serialize};
use shared::StatsScan;
use statrs::distribution::{Beta, ContinuousCDF};

use crate::error::{AnalysisError, Result};

/// Result of one shot at one site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    /// The shot does not take part (nothing to survive, or post-selected out)
    Excluded,
}

/// Loaded and still present is a success, loaded and gone a failure
pub fn survival_events(load: &[bool], transfer: &[bool]) -> Vec<Outcome> {
    load.iter()
        .zip(transfer)
        .map(|(&loaded, &present)| match (loaded, present) {
            (true, true) => Outcome::Success,
            (true, false) => Outcome::Failure,
            (false, _) => Outcome::Excluded,
        })
        .collect()
}

/// An atom appearing in an initially empty trap is a success
pub fn generation_events(load: &[bool], transfer: &[bool]) -> Vec<Outcome> {
    load.iter()
        .zip(transfer)
        .map(|(&loaded, &present)| match (loaded, present) {
            (false, true) => Outcome::Success,
            (false, false) => Outcome::Failure,
            (true, _) => Outcome::Excluded,
        })
        .collect()
}

/// Exclude every shot whose mask entry is false
pub fn apply_selection(events: &[Outcome], mask: &[bool]) -> Vec<Outcome> {
    events
        .iter()
        .enumerate()
        .map(|(i, &event)| {
            if mask.get(i).copied().unwrap_or(true) {
                event
            } else {
                Outcome::Excluded
            }
        })
        .collect()
}

/// Uncertainty attached to a success fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorModel {
    /// Population standard deviation over `sqrt(n)`
    #[default]
    StandardError,
    /// Half width of the 68.27 % Jeffreys interval
    Jeffreys,
}

/// Two-sided tail probability outside one standard deviation, per side
const ONE_SIGMA_TAIL: f64 = 0.158_655_253_931_457;

impl ErrorModel {
    pub fn error(&self, successes: usize, trials: usize) -> f64 {
        if trials == 0 {
            return 0.0;
        }
        let (k, n) = (successes as f64, trials as f64);
        match self {
            ErrorModel::StandardError => {
                let p = k / n;
                (p * (1.0 - p)).sqrt() / n.sqrt()
            }
            ErrorModel::Jeffreys => {
                let Ok(beta) = Beta::new(k + 0.5, n - k + 0.5) else {
                    return 0.0;
                };
                let lower = if successes == 0 {
                    0.0
                } else {
                    beta.inverse_cdf(ONE_SIGMA_TAIL)
                };
                let upper = if successes == trials {
                    1.0
                } else {
                    beta.inverse_cdf(1.0 - ONE_SIGMA_TAIL)
                };
                (upper - lower) / 2.0
            }
        }
    }
}

/// Mean, uncertainty and participation of one variation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct VariationStatistic {
    pub mean: f64,
    pub error: f64,
    /// Fraction of repetitions that took part (the loading rate for survival)
    pub participation: f64,
}

/// Per-variation success statistics of a site.
///
/// Excluded shots count toward neither the mean nor the participation. A
/// variation without any participating shot reports zeros. When fewer
/// events than `repetitions` exist, the repetition count shrinks to fit.
pub fn outcome_statistics(
    events: &[Outcome],
    repetitions: usize,
    model: ErrorModel,
) -> Vec<VariationStatistic> {
    let repetitions = repetitions.min(events.len());
    if repetitions == 0 {
        return Vec::new();
    }
    events
        .chunks_exact(repetitions)
        .map(|chunk| {
            let successes = chunk.iter().filter(|&&e| e == Outcome::Success).count();
            let trials = chunk.iter().filter(|&&e| e != Outcome::Excluded).count();
            if trials == 0 {
                return VariationStatistic::default();
            }
            VariationStatistic {
                mean: successes as f64 / trials as f64,
                error: model.error(successes, trials),
                participation: trials as f64 / repetitions as f64,
            }
        })
        .collect()
}

/// How per-site statistics are averaged across sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteWeighting {
    #[default]
    Plain,
    /// Weight each site by its participation
    LoadingRate,
}

/// Average per-site statistics into one value per variation.
///
/// The error is `sqrt(sum(err^2)) / n_sites` for either weighting.
pub fn combine_sites(
    per_site: &[Vec<VariationStatistic>],
    weighting: SiteWeighting,
) -> Vec<VariationStatistic> {
    let Some(first) = per_site.first() else {
        return Vec::new();
    };
    let sites = per_site.len() as f64;
    (0..first.len())
        .map(|v| {
            let column: Vec<&VariationStatistic> =
                per_site.iter().filter_map(|site| site.get(v)).collect();
            let participation: f64 = column.iter().map(|s| s.participation).sum();
            let mean = match weighting {
                SiteWeighting::Plain => column.iter().map(|s| s.mean).sum::<f64>() / sites,
                SiteWeighting::LoadingRate if participation > 0.0 => {
                    column.iter().map(|s| s.mean * s.participation).sum::<f64>() / participation
                }
                SiteWeighting::LoadingRate => 0.0,
            };
            VariationStatistic {
                mean,
                error: column.iter().map(|s| s.error * s.error).sum::<f64>().sqrt() / sites,
                participation: participation / sites,
            }
        })
        .collect()
}

/// Mean with its standard error
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MeanError {
    pub mean: f64,
    pub error: f64,
}

impl MeanError {
    /// Mean and population standard error, zeros when `values` is empty
    pub fn of(values: &[f64]) -> Self {
        let scan = StatsScan::new(values);
        match (scan.mean(), scan.standard_error()) {
            (Ok(mean), Ok(error)) => Self { mean, error },
            _ => Self::default(),
        }
    }
}

fn check_shots(first: &[Vec<bool>], second: &[Vec<bool>]) -> Result<usize> {
    if first.len() != second.len() {
        return Err(AnalysisError::SiteCountMismatch {
            first: first.len(),
            second: second.len(),
        });
    }
    let shots = first.first().map_or(0, |s| s.len());
    match first.iter().chain(second).find(|s| s.len() != shots) {
        Some(site) => Err(AnalysisError::InvalidOption(format!(
            "sites hold different shot counts ({} vs {shots})",
            site.len()
        ))),
        None => Ok(shots),
    }
}

fn loaded_in(atoms: &[Vec<bool>], shot: usize) -> usize {
    atoms.iter().filter(|site| site[shot]).count()
}

/// Per shot, assembled atoms minus loaded atoms, optionally per site
pub fn enhancement(
    load_atoms: &[Vec<bool>],
    assembly_atoms: &[Vec<bool>],
    normalized: bool,
) -> Result<Vec<f64>> {
    let shots = check_shots(load_atoms, assembly_atoms)?;
    let sites = assembly_atoms.len().max(1) as f64;
    Ok((0..shots)
        .map(|shot| {
            let gain = loaded_in(assembly_atoms, shot) as f64 - loaded_in(load_atoms, shot) as f64;
            if normalized {
                gain / sites
            } else {
                gain
            }
        })
        .collect())
}

/// Per shot, whether every site matches the hit pattern.
///
/// The default pattern requires every site filled. With `partial_credit`
/// a shot scores the fraction of sites that match instead.
pub fn ensemble_hits(
    atoms: &[Vec<bool>],
    hit_condition: Option<&[bool]>,
    partial_credit: bool,
) -> Result<Vec<f64>> {
    let shots = check_shots(atoms, atoms)?;
    if let Some(pattern) = hit_condition {
        if pattern.len() != atoms.len() {
            return Err(AnalysisError::SiteCountMismatch {
                first: atoms.len(),
                second: pattern.len(),
            });
        }
    }
    let sites = atoms.len();
    Ok((0..shots)
        .map(|shot| {
            let matching = atoms
                .iter()
                .enumerate()
                .filter(|(i, site)| site[shot] == hit_condition.map_or(true, |p| p[*i]))
                .count();
            if partial_credit {
                matching as f64 / sites.max(1) as f64
            } else if matching == sites {
                1.0
            } else {
                0.0
            }
        })
        .collect())
}

/// Mean and error of consecutive chunks of `repetitions` values
pub fn ensemble_statistics(values: &[f64], repetitions: usize) -> Vec<MeanError> {
    let repetitions = repetitions.min(values.len());
    if repetitions == 0 {
        return Vec::new();
    }
    values.chunks_exact(repetitions).map(MeanError::of).collect()
}

/// Occupancy mean and error of every site in every variation
pub fn site_picture_statistics(atoms: &[Vec<bool>], repetitions: usize) -> Vec<Vec<MeanError>> {
    atoms
        .iter()
        .map(|site| {
            let values: Vec<f64> = site.iter().map(|&a| f64::from(u8::from(a))).collect();
            ensemble_statistics(&values, repetitions)
        })
        .collect()
}

/// Per shot, the fraction of loaded atoms lost by the final picture
pub fn net_loss(load_atoms: &[Vec<bool>], final_atoms: &[Vec<bool>]) -> Result<Vec<f64>> {
    let shots = check_shots(load_atoms, final_atoms)?;
    Ok((0..shots)
        .map(|shot| {
            let loaded = loaded_in(load_atoms, shot);
            if loaded == 0 {
                0.0
            } else {
                1.0 - loaded_in(final_atoms, shot) as f64 / loaded as f64
            }
        })
        .collect())
}

pub fn net_loss_statistics(values: &[f64], repetitions: usize) -> Vec<MeanError> {
    ensemble_statistics(values, repetitions)
}
