//! Survival as a function of how many sites were loaded.
//!
//! Light scattered by neighbouring atoms can heat or push an atom out of its
//! trap. Post-selecting on exactly `N` loaded sites for every `N` shows
//! whether survival drops as the array fills. All shots of the run are
//! pooled for each `N`.

use serde::{Deserialize, Serialize};

use super::{classify_sites, site_thresholds, try_fit};
use crate::error::Result;
use crate::fitting::{ScanFit, ScanModel};
use crate::post_select::{post_select, AssemblyCondition};
use crate::run::{organize, ExperimentRun, OrganizeOptions, Site};
use crate::statistics::{
    apply_selection, combine_sites, outcome_statistics, survival_events, ErrorModel,
    SiteWeighting, VariationStatistic,
};
use crate::threshold::ThresholdOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterOptions {
    pub organize: OrganizeOptions,
    pub threshold: ThresholdOptions,
    pub load_picture: usize,
    pub transfer_picture: usize,
    pub subtract_border: bool,
    /// Require the loaded sites to be neighbours
    pub connected: bool,
    pub weighting: SiteWeighting,
    pub error_model: ErrorModel,
}

impl Default for ScatterOptions {
    fn default() -> Self {
        Self {
            organize: OrganizeOptions::default(),
            threshold: ThresholdOptions::default(),
            load_picture: 1,
            transfer_picture: 2,
            subtract_border: true,
            connected: false,
            weighting: SiteWeighting::Plain,
            error_model: ErrorModel::StandardError,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScatterResult {
    pub sites: Vec<Site>,
    /// Numbers of loaded sites that occurred, ascending
    pub loaded: Vec<usize>,
    /// Per site, one statistic per entry of `loaded`
    pub survival: Vec<Vec<VariationStatistic>>,
    pub average_survival: Vec<VariationStatistic>,
    pub site_fits: Vec<Option<ScanFit>>,
    pub average_fit: Option<ScanFit>,
}

/// Survival at `sites` for every possible number of loaded sites
pub fn scatter_analysis(
    run: ExperimentRun,
    sites: &[Site],
    options: &ScatterOptions,
) -> Result<ScatterResult> {
    let run = organize(run, &options.organize)?;
    run.check_picture(options.load_picture)?;
    run.check_picture(options.transfer_picture)?;

    let thresholds = site_thresholds(
        &run,
        sites,
        options.load_picture,
        options.subtract_border,
        &options.threshold,
    )?;
    let load = classify_sites(
        &run,
        sites,
        options.load_picture,
        options.subtract_border,
        &thresholds,
    )?;
    let transfer = classify_sites(
        &run,
        sites,
        options.transfer_picture,
        options.subtract_border,
        &thresholds,
    )?;
    let events: Vec<_> = load
        .atoms
        .iter()
        .zip(&transfer.atoms)
        .map(|(l, t)| survival_events(l, t))
        .collect();
    let shots = run.shots();

    let mut loaded = Vec::new();
    let mut survival = vec![Vec::new(); sites.len()];
    for n in 1..=sites.len() {
        let mask = post_select(&load.atoms, &AssemblyCondition::Exactly(n), options.connected)?;
        if !mask.iter().any(|&kept| kept) {
            log::debug!("no shot loaded exactly {n} sites");
            continue;
        }
        loaded.push(n);
        for (site, site_events) in events.iter().enumerate() {
            let selected = apply_selection(site_events, &mask);
            let stat = outcome_statistics(&selected, shots, options.error_model)
                .into_iter()
                .next()
                .unwrap_or_default();
            survival[site].push(stat);
        }
    }

    let average_survival = combine_sites(&survival, options.weighting);
    let key: Vec<f64> = loaded.iter().map(|&n| n as f64).collect();
    let values = |stats: &[VariationStatistic]| -> (Vec<f64>, Vec<f64>) {
        stats.iter().map(|s| (s.mean, s.error)).unzip()
    };
    let site_fits = survival
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            let (means, errors) = values(stats);
            try_fit(Some(ScanModel::Linear), &key, &means, Some(&errors), &format!("site {i} scatter"))
        })
        .collect();
    let (means, errors) = values(&average_survival);
    let average_fit = try_fit(
        Some(ScanModel::Linear),
        &key,
        &means,
        Some(&errors),
        "average scatter",
    );

    log::info!(
        "scatter analysis: {} sites, loaded counts {:?}",
        sites.len(),
        loaded
    );

    Ok(ScatterResult {
        sites: sites.to_vec(),
        loaded,
        survival,
        average_survival,
        site_fits,
        average_fit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunMetadata;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    /// Two sites, three pictures per repetition (pictures 1 and 2 are used)
    fn run(shots: &[[(bool, bool); 2]]) -> ExperimentRun {
        let sites = [(1, 1), (1, 3)];
        let mut pictures = Array3::<f64>::zeros((shots.len() * 3, 3, 5));
        for (shot, states) in shots.iter().enumerate() {
            for (&(row, col), &(loaded, survived)) in sites.iter().zip(states) {
                pictures[[3 * shot + 1, row, col]] = if loaded { 250.0 } else { 0.0 };
                pictures[[3 * shot + 2, row, col]] = if survived { 250.0 } else { 0.0 };
            }
        }
        let metadata = RunMetadata {
            repetitions: shots.len(),
            ..Default::default()
        };
        ExperimentRun::new(pictures, metadata, 3).unwrap()
    }

    #[test]
    fn test_survival_by_loaded_count() {
        let shots = [
            // one atom: survives twice out of two
            [(true, true), (false, false)],
            [(false, false), (true, true)],
            // two atoms: three of four survive
            [(true, true), (true, false)],
            [(true, true), (true, true)],
        ];
        let options = ScatterOptions {
            threshold: ThresholdOptions {
                manual_threshold: Some(125.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let result = scatter_analysis(run(&shots), &sites, &options).unwrap();

        assert_eq!(result.loaded, vec![1, 2]);
        assert_relative_eq!(result.survival[0][0].mean, 1.0);
        assert_relative_eq!(result.survival[1][1].mean, 0.5);
        assert_relative_eq!(result.average_survival[0].mean, 1.0);
        assert_relative_eq!(result.average_survival[1].mean, 0.75);
        // two points determine the line exactly
        let fit = result.average_fit.unwrap();
        assert_relative_eq!(fit.result.params[0], -0.25, epsilon = 1e-8);
    }
}
