//! Loading statistics of a single picture.

use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use super::{classify_sites, site_thresholds, try_fit};
use crate::error::Result;
use crate::fitting::{ScanFit, ScanModel};
use crate::run::{organize, ExperimentRun, OrganizeOptions, Site};
use crate::statistics::{site_picture_statistics, MeanError};
use crate::threshold::{ThresholdOptions, ThresholdResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationOptions {
    pub organize: OrganizeOptions,
    pub threshold: ThresholdOptions,
    pub subtract_border: bool,
    /// Treat the whole run as one data point
    pub analyze_together: bool,
    pub fit: Option<ScanModel>,
    /// Fit every site as well as the all-site loading rate
    pub fit_individual: bool,
}

impl Default for PopulationOptions {
    fn default() -> Self {
        Self {
            organize: OrganizeOptions::default(),
            threshold: ThresholdOptions::default(),
            subtract_border: true,
            analyze_together: false,
            fit: None,
            fit_individual: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationResult {
    pub key_name: String,
    pub key: Vec<f64>,
    pub repetitions: usize,
    pub picture: usize,
    pub sites: Vec<Site>,
    pub thresholds: Vec<ThresholdResult>,
    pub counts: Vec<Vec<f64>>,
    pub atoms: Vec<Vec<bool>>,
    /// Loading over every shot of every site
    pub total_loading: MeanError,
    /// Per site, one entry per variation
    pub site_loading: Vec<Vec<MeanError>>,
    /// Mean over sites of the per-site loading, error over sites
    pub loading_rate: Vec<MeanError>,
    pub site_fits: Vec<Option<ScanFit>>,
    pub average_fit: Option<ScanFit>,
    /// Mean of every picture in the run
    pub average_picture: Array2<f64>,
    /// Per shot, 1 at every site holding an atom
    pub atom_images: Array3<u8>,
}

/// Loading analysis of `sites` in picture `picture` of every repetition
pub fn population_analysis(
    run: ExperimentRun,
    sites: &[Site],
    picture: usize,
    options: &PopulationOptions,
) -> Result<PopulationResult> {
    let mut organize_options = options.organize.clone();
    organize_options.group_all |= options.analyze_together;
    let run = organize(run, &organize_options)?;
    run.check_picture(picture)?;

    let thresholds = site_thresholds(
        &run,
        sites,
        picture,
        options.subtract_border,
        &options.threshold,
    )?;
    let data = classify_sites(&run, sites, picture, options.subtract_border, &thresholds)?;

    let flat: Vec<f64> = data
        .atoms
        .iter()
        .flatten()
        .map(|&a| f64::from(u8::from(a)))
        .collect();
    let total_loading = MeanError::of(&flat);

    let site_loading = site_picture_statistics(&data.atoms, run.repetitions);
    let loading_rate: Vec<MeanError> = (0..run.variations())
        .map(|v| {
            let per_site: Vec<f64> = site_loading
                .iter()
                .filter_map(|site| site.get(v).map(|s| s.mean))
                .collect();
            MeanError::of(&per_site)
        })
        .collect();

    let site_fits: Vec<Option<ScanFit>> = site_loading
        .iter()
        .enumerate()
        .map(|(i, stats)| {
            let model = options.fit.filter(|_| options.fit_individual);
            let means: Vec<f64> = stats.iter().map(|s| s.mean).collect();
            try_fit(model, &run.key, &means, None, &format!("site {i} loading"))
        })
        .collect();
    let rates: Vec<f64> = loading_rate.iter().map(|s| s.mean).collect();
    let average_fit = try_fit(options.fit, &run.key, &rates, None, "loading rate");

    let (rows, cols) = run.picture_size();
    let average_picture = run
        .pictures
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array2::zeros((rows, cols)));
    let mut atom_images = Array3::<u8>::zeros((run.shots(), rows, cols));
    for (site, atoms) in sites.iter().zip(&data.atoms) {
        for (shot, &atom) in atoms.iter().enumerate() {
            atom_images[[shot, site.row, site.col]] = u8::from(atom);
        }
    }

    log::info!(
        "population analysis of picture {picture}: {} sites, loading {:.3} +- {:.3}",
        sites.len(),
        total_loading.mean,
        total_loading.error
    );

    Ok(PopulationResult {
        key_name: run.key_name.clone(),
        key: run.key.clone(),
        repetitions: run.repetitions,
        picture,
        sites: sites.to_vec(),
        thresholds,
        counts: data.counts,
        atoms: data.atoms,
        total_loading,
        site_loading,
        loading_rate,
        site_fits,
        average_fit,
        average_picture,
        atom_images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::run::RunMetadata;
    use approx::assert_relative_eq;

    /// Two sites, one picture per repetition, 2 variations x 4 repetitions
    fn run() -> ExperimentRun {
        // site (1, 1) loads in every other shot, site (1, 3) in every shot
        let mut pictures = Array3::<f64>::zeros((8, 3, 5));
        for shot in 0..8 {
            if shot % 2 == 0 {
                pictures[[shot, 1, 1]] = 300.0;
            }
            pictures[[shot, 1, 3]] = 300.0;
        }
        let metadata = RunMetadata {
            key_name: "depth".to_string(),
            key: vec![2.0, 1.0],
            repetitions: 4,
        };
        ExperimentRun::new(pictures, metadata, 1).unwrap()
    }

    fn options() -> PopulationOptions {
        PopulationOptions {
            threshold: ThresholdOptions {
                manual_threshold: Some(150.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_loading_rates() {
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let result = population_analysis(run(), &sites, 0, &options()).unwrap();

        assert_eq!(result.key, vec![1.0, 2.0]);
        assert_relative_eq!(result.total_loading.mean, 0.75);
        assert_relative_eq!(result.site_loading[0][0].mean, 0.5);
        assert_relative_eq!(result.site_loading[1][1].mean, 1.0);
        assert_relative_eq!(result.loading_rate[0].mean, 0.75);
        // std of [0.5, 1.0] over sqrt(2)
        assert_relative_eq!(result.loading_rate[0].error, 0.25 / 2.0_f64.sqrt());
        assert_eq!(result.atom_images.dim(), (8, 3, 5));
        assert_eq!(result.atom_images[[0, 1, 1]], 1);
        assert_eq!(result.atom_images[[1, 1, 1]], 0);
    }

    #[test]
    fn test_analyze_together() {
        let sites = [Site::new(1, 1)];
        let options = PopulationOptions {
            analyze_together: true,
            ..options()
        };
        let result = population_analysis(run(), &sites, 0, &options).unwrap();
        assert_eq!(result.key, vec![0.0]);
        assert_eq!(result.loading_rate.len(), 1);
        assert_relative_eq!(result.loading_rate[0].mean, 0.5);
    }

    #[test]
    fn test_picture_out_of_range() {
        let sites = [Site::new(1, 1)];
        assert!(matches!(
            population_analysis(run(), &sites, 1, &options()),
            Err(AnalysisError::PictureOutOfRange { .. })
        ));
    }
}
