//! Survival of atoms between a load picture and a transfer picture.
//!
//! Site `i` of the load arrangement is compared with site `i` of the
//! transfer arrangement, so moved atoms can be followed to a new trap.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{classify_sites, site_thresholds, try_fit};
use crate::error::{AnalysisError, Result};
use crate::fitting::{ScanFit, ScanModel};
use crate::post_select::{post_select, AssemblyCondition};
use crate::run::{average_pictures, organize, ExperimentRun, OrganizeOptions, Site};
use crate::statistics::{
    apply_selection, combine_sites, generation_events, outcome_statistics, survival_events,
    ErrorModel, SiteWeighting, VariationStatistic,
};
use crate::threshold::{ThresholdOptions, ThresholdResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    pub organize: OrganizeOptions,
    pub threshold: ThresholdOptions,
    pub load_picture: usize,
    pub transfer_picture: usize,
    /// Remove each picture's border average from its site counts
    pub subtract_border: bool,
    pub post_selection: Option<AssemblyCondition>,
    pub post_selection_connected: bool,
    /// Also count atoms appearing in initially empty traps
    pub generation_stats: bool,
    pub weighting: SiteWeighting,
    pub error_model: ErrorModel,
    pub fit: Option<ScanModel>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            organize: OrganizeOptions::default(),
            threshold: ThresholdOptions::default(),
            load_picture: 0,
            transfer_picture: 1,
            subtract_border: true,
            post_selection: None,
            post_selection_connected: false,
            generation_stats: false,
            weighting: SiteWeighting::Plain,
            error_model: ErrorModel::StandardError,
            fit: None,
        }
    }
}

impl TransferOptions {
    /// Rearrangement runs: pictures are load, rearrange, image, so survival is
    /// measured between the second and third picture.
    pub fn rearrange() -> Self {
        Self {
            load_picture: 1,
            transfer_picture: 2,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub key_name: String,
    pub key: Vec<f64>,
    pub repetitions: usize,
    pub load_sites: Vec<Site>,
    pub transfer_sites: Vec<Site>,
    pub thresholds: Vec<ThresholdResult>,
    /// Per site, one count per shot
    pub load_counts: Vec<Vec<f64>>,
    pub transfer_counts: Vec<Vec<f64>>,
    pub load_atoms: Vec<Vec<bool>>,
    pub transfer_atoms: Vec<Vec<bool>>,
    /// Shots kept by post-selection
    pub selection: Option<Vec<bool>>,
    /// Per site, one statistic per variation
    pub survival: Vec<Vec<VariationStatistic>>,
    pub generation: Option<Vec<Vec<VariationStatistic>>>,
    pub average_survival: Vec<VariationStatistic>,
    pub site_fits: Vec<Option<ScanFit>>,
    pub average_fit: Option<ScanFit>,
    /// Average load and transfer pictures
    pub average_pictures: Vec<Array2<f64>>,
}

/// Survival analysis between `options.load_picture` and
/// `options.transfer_picture`.
///
/// # Arguments
/// * `run` - Raw run; organized with `options.organize` first
/// * `load_sites` - Sites examined in the load picture
/// * `transfer_sites` - Matching sites examined in the transfer picture
/// * `options` - Threshold, selection and fitting options
pub fn transfer_analysis(
    run: ExperimentRun,
    load_sites: &[Site],
    transfer_sites: &[Site],
    options: &TransferOptions,
) -> Result<TransferResult> {
    if load_sites.len() != transfer_sites.len() {
        return Err(AnalysisError::SiteCountMismatch {
            first: load_sites.len(),
            second: transfer_sites.len(),
        });
    }
    let run = organize(run, &options.organize)?;
    run.check_picture(options.load_picture)?;
    run.check_picture(options.transfer_picture)?;

    let thresholds = site_thresholds(
        &run,
        load_sites,
        options.load_picture,
        options.subtract_border,
        &options.threshold,
    )?;
    let load = classify_sites(
        &run,
        load_sites,
        options.load_picture,
        options.subtract_border,
        &thresholds,
    )?;
    let transfer = classify_sites(
        &run,
        transfer_sites,
        options.transfer_picture,
        options.subtract_border,
        &thresholds,
    )?;

    let selection = match &options.post_selection {
        Some(condition) => Some(post_select(
            &load.atoms,
            condition,
            options.post_selection_connected,
        )?),
        None => None,
    };
    let select = |events: Vec<_>| match &selection {
        Some(mask) => apply_selection(&events, mask),
        None => events,
    };

    let survival: Vec<Vec<VariationStatistic>> = load
        .atoms
        .iter()
        .zip(&transfer.atoms)
        .map(|(l, t)| {
            outcome_statistics(
                &select(survival_events(l, t)),
                run.repetitions,
                options.error_model,
            )
        })
        .collect();
    let generation: Option<Vec<Vec<VariationStatistic>>> = options.generation_stats.then(|| {
        load.atoms
            .iter()
            .zip(&transfer.atoms)
            .map(|(l, t)| {
                outcome_statistics(
                    &select(generation_events(l, t)),
                    run.repetitions,
                    options.error_model,
                )
            })
            .collect()
    });
    let average_survival = combine_sites(&survival, options.weighting);

    let means = |stats: &[VariationStatistic]| stats.iter().map(|s| s.mean).collect::<Vec<_>>();
    let errors = |stats: &[VariationStatistic]| stats.iter().map(|s| s.error).collect::<Vec<_>>();
    let site_fits: Vec<Option<ScanFit>> = survival
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            try_fit(
                options.fit,
                &run.key,
                &means(stats),
                None,
                &format!("site {i} survival"),
            )
        })
        .collect();
    let average_fit = try_fit(
        options.fit,
        &run.key,
        &means(&average_survival),
        Some(&errors(&average_survival)),
        "average survival",
    );

    let pictures = average_pictures(&run);
    let average_pictures = vec![
        pictures[options.load_picture].clone(),
        pictures[options.transfer_picture].clone(),
    ];

    log::info!(
        "transfer analysis: {} sites, {} variations, mean survival {:.3}",
        load_sites.len(),
        run.variations(),
        average_survival.iter().map(|s| s.mean).sum::<f64>() / average_survival.len().max(1) as f64
    );

    Ok(TransferResult {
        key_name: run.key_name.clone(),
        key: run.key.clone(),
        repetitions: run.repetitions,
        load_sites: load_sites.to_vec(),
        transfer_sites: transfer_sites.to_vec(),
        thresholds,
        load_counts: load.counts,
        transfer_counts: transfer.counts,
        load_atoms: load.atoms,
        transfer_atoms: transfer.atoms,
        selection,
        survival,
        generation,
        average_survival,
        site_fits,
        average_fit,
        average_pictures,
    })
}
