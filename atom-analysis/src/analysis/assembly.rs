//! Assembly of a target pattern from a stochastically loaded array.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{classify_sites, site_thresholds, try_fit};
use crate::error::{AnalysisError, Result};
use crate::fitting::{ScanFit, ScanModel};
use crate::run::{organize, ExperimentRun, OrganizeOptions, Site, SiteSpec};
use crate::statistics::{
    enhancement, ensemble_hits, ensemble_statistics, net_loss, net_loss_statistics,
    site_picture_statistics, MeanError,
};
use crate::threshold::{ThresholdOptions, ThresholdResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyOptions {
    pub organize: OrganizeOptions,
    pub threshold: ThresholdOptions,
    pub load_picture: usize,
    /// Target sites in the assembly picture; the load sites by default
    pub assembly_sites: Option<SiteSpec>,
    /// Wider load arrangement used for net loss; the load sites by default
    pub loss_load_sites: Option<SiteSpec>,
    /// Matching assembly arrangement for net loss; `loss_load_sites` by default
    pub loss_assembly_sites: Option<SiteSpec>,
    /// Required occupancy per target site; all filled by default
    pub hit_condition: Option<Vec<bool>>,
    /// Score shots by the fraction of correct sites
    pub partial_credit: bool,
    /// Divide the enhancement by the number of sites
    pub normalize_enhancement: bool,
    pub fit: Option<ScanModel>,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            organize: OrganizeOptions::default(),
            threshold: ThresholdOptions {
                bin_width: 10.0,
                rigorous: false,
                ..ThresholdOptions::default()
            },
            load_picture: 0,
            assembly_sites: None,
            loss_load_sites: None,
            loss_assembly_sites: None,
            hit_condition: None,
            partial_credit: false,
            normalize_enhancement: false,
            fit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyResult {
    pub key_name: String,
    pub key: Vec<f64>,
    pub repetitions: usize,
    pub load_sites: Vec<Site>,
    pub assembly_sites: Vec<Site>,
    pub thresholds: Vec<ThresholdResult>,
    pub load_counts: Vec<Vec<f64>>,
    pub assembly_counts: Vec<Vec<f64>>,
    pub load_atoms: Vec<Vec<bool>>,
    pub assembly_atoms: Vec<Vec<bool>>,
    /// Atoms gained per shot, per variation
    pub enhancement: Vec<MeanError>,
    /// Shots that assembled the target pattern, per variation
    pub ensemble: Vec<MeanError>,
    /// Occupancy of every target site, per variation
    pub site_statistics: Vec<Vec<MeanError>>,
    pub fit: Option<ScanFit>,
    /// Fraction of loaded atoms lost, per variation
    pub net_loss: Vec<MeanError>,
    pub average_picture: Array2<f64>,
}

fn unpack_or(spec: &Option<SiteSpec>, fallback: &[Site]) -> Vec<Site> {
    spec.as_ref()
        .map_or_else(|| fallback.to_vec(), SiteSpec::unpack)
}

/// Assembly analysis comparing `load_sites` in the load picture with the
/// target sites in `assembly_picture`
pub fn assembly_analysis(
    run: ExperimentRun,
    load_sites: &[Site],
    assembly_picture: usize,
    options: &AssemblyOptions,
) -> Result<AssemblyResult> {
    if assembly_picture == options.load_picture {
        log::warn!("assembly picture {assembly_picture} is also the load picture");
    }
    let assembly_sites = unpack_or(&options.assembly_sites, load_sites);
    let loss_load_sites = unpack_or(&options.loss_load_sites, load_sites);
    let loss_assembly_sites = unpack_or(&options.loss_assembly_sites, &loss_load_sites);
    for (first, second) in [
        (load_sites.len(), assembly_sites.len()),
        (loss_load_sites.len(), loss_assembly_sites.len()),
    ] {
        if first != second {
            return Err(AnalysisError::SiteCountMismatch { first, second });
        }
    }

    let run = organize(run, &options.organize)?;
    run.check_picture(options.load_picture)?;
    run.check_picture(assembly_picture)?;
    let reps = run.repetitions;

    // assembly runs always remove the border background
    let thresholds = site_thresholds(&run, load_sites, options.load_picture, true, &options.threshold)?;
    let load = classify_sites(&run, load_sites, options.load_picture, true, &thresholds)?;
    let assembled = classify_sites(&run, &assembly_sites, assembly_picture, true, &thresholds)?;

    let gained = enhancement(&load.atoms, &assembled.atoms, options.normalize_enhancement)?;
    let hits = ensemble_hits(
        &assembled.atoms,
        options.hit_condition.as_deref(),
        options.partial_credit,
    )?;
    let ensemble = ensemble_statistics(&hits, reps);
    let means: Vec<f64> = ensemble.iter().map(|s| s.mean).collect();
    let fit = try_fit(options.fit, &run.key, &means, None, "assembly success");

    let loss_thresholds = site_thresholds(
        &run,
        &loss_load_sites,
        options.load_picture,
        true,
        &options.threshold,
    )?;
    let loss_load = classify_sites(&run, &loss_load_sites, options.load_picture, true, &loss_thresholds)?;
    let loss_final = classify_sites(&run, &loss_assembly_sites, assembly_picture, true, &loss_thresholds)?;
    let losses = net_loss(&loss_load.atoms, &loss_final.atoms)?;

    let (rows, cols) = run.picture_size();
    let average_picture = run
        .pictures
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array2::zeros((rows, cols)));

    log::info!(
        "assembly analysis: {} target sites, {} variations",
        assembly_sites.len(),
        run.variations()
    );

    Ok(AssemblyResult {
        key_name: run.key_name.clone(),
        key: run.key.clone(),
        repetitions: reps,
        load_sites: load_sites.to_vec(),
        site_statistics: site_picture_statistics(&assembled.atoms, reps),
        assembly_sites,
        thresholds,
        load_counts: load.counts,
        assembly_counts: assembled.counts,
        load_atoms: load.atoms,
        assembly_atoms: assembled.atoms,
        enhancement: ensemble_statistics(&gained, reps),
        ensemble,
        fit,
        net_loss: net_loss_statistics(&losses, reps),
        average_picture,
    })
}
