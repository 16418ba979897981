//! End-to-end analyses of a run.
//!
//! Each pipeline organizes the run, finds per-site thresholds on its load
//! picture, classifies every site in the pictures it needs and aggregates
//! the atom states into per-variation statistics.

pub mod assembly;
pub mod population;
pub mod scatter;
pub mod transfer;

pub use assembly::{assembly_analysis, AssemblyOptions, AssemblyResult};
pub use population::{population_analysis, PopulationOptions, PopulationResult};
pub use scatter::{scatter_analysis, ScatterOptions, ScatterResult};
pub use transfer::{transfer_analysis, TransferOptions, TransferResult};

use crate::counts::{atom_states, sites_counts};
use crate::error::Result;
use crate::fitting::{fit_scan, ScanFit, ScanModel};
use crate::run::{ExperimentRun, Site};
use crate::threshold::{find_thresholds, ThresholdOptions, ThresholdResult};

/// Counts and atom states of a set of sites in one picture
#[derive(Debug, Clone, Default)]
pub(crate) struct SiteData {
    pub counts: Vec<Vec<f64>>,
    pub atoms: Vec<Vec<bool>>,
}

/// Thresholds fitted on the counts of each site in `picture`
pub(crate) fn site_thresholds(
    run: &ExperimentRun,
    sites: &[Site],
    picture: usize,
    subtract_border: bool,
    options: &ThresholdOptions,
) -> Result<Vec<ThresholdResult>> {
    let counts = sites_counts(run, sites, picture, subtract_border)?;
    Ok(find_thresholds(&counts, options)?)
}

/// Classify `sites` in `picture`, site `i` against `thresholds[i]`
pub(crate) fn classify_sites(
    run: &ExperimentRun,
    sites: &[Site],
    picture: usize,
    subtract_border: bool,
    thresholds: &[ThresholdResult],
) -> Result<SiteData> {
    let counts = sites_counts(run, sites, picture, subtract_border)?;
    let atoms = counts
        .iter()
        .zip(thresholds)
        .map(|(c, t)| atom_states(c, t.threshold).0)
        .collect();
    Ok(SiteData { counts, atoms })
}

/// Fit a scan model if one was requested; failures are logged and skipped
pub(crate) fn try_fit(
    model: Option<ScanModel>,
    key: &[f64],
    values: &[f64],
    errors: Option<&[f64]>,
    what: &str,
) -> Option<ScanFit> {
    let model = model?;
    match fit_scan(model, key, values, errors) {
        Ok(fit) => Some(fit),
        Err(e) => {
            log::warn!("{model:?} fit of {what} failed: {e}");
            None
        }
    }
}
