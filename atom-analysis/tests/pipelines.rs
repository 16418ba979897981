//! End-to-end analyses of seeded synthetic runs with a known ground truth

use approx::assert_abs_diff_eq;
use atom_analysis::analysis::{
    assembly_analysis, population_analysis, scatter_analysis, transfer_analysis, AssemblyOptions,
    PopulationOptions, ScatterOptions, TransferOptions,
};
use atom_analysis::fitting::ScanModel;
use atom_analysis::loader::{load_run, write_run};
use atom_analysis::{ExperimentRun, RunMetadata, Site};
use shared::image_proc::synthetic::{generate_run, SyntheticRun, TweezerArray};
use tempfile::TempDir;

fn sites(array: &TweezerArray) -> Vec<Site> {
    array.sites.iter().map(|&(r, c)| Site::new(r, c)).collect()
}

fn synthetic(
    survival: &[f64],
    repetitions: usize,
    ppr: usize,
    seed: u64,
) -> (SyntheticRun, ExperimentRun) {
    let array = TweezerArray::default();
    let synthetic = generate_run(&array, survival, repetitions, ppr, seed).unwrap();
    let metadata = RunMetadata {
        key_name: "hold time".to_string(),
        key: (0..survival.len()).map(|v| v as f64).collect(),
        repetitions,
    };
    let run = ExperimentRun::new(synthetic.pictures.clone(), metadata, ppr).unwrap();
    (synthetic, run)
}

/// Fraction of atoms loaded in `from` still present in `to`, per variation
fn true_survival(synthetic: &SyntheticRun, from: usize, to: usize) -> Vec<f64> {
    synthetic
        .grouped_occupancy()
        .outer_iter()
        .map(|variation| {
            let (mut loaded, mut kept) = (0usize, 0usize);
            for shot in variation.outer_iter() {
                for site in 0..shot.dim().1 {
                    if shot[[from, site]] {
                        loaded += 1;
                        kept += usize::from(shot[[to, site]]);
                    }
                }
            }
            kept as f64 / loaded as f64
        })
        .collect()
}

#[test]
fn test_transfer_matches_ground_truth() {
    let (synthetic, run) = synthetic(&[1.0, 0.5], 300, 2, 3);
    let sites = sites(&TweezerArray::default());
    let options = TransferOptions {
        fit: Some(ScanModel::Linear),
        ..Default::default()
    };
    let result = transfer_analysis(run, &sites, &sites, &options).unwrap();

    // both peaks are tens of sigma apart, so every site is classified correctly
    for threshold in &result.thresholds {
        assert!(threshold.threshold > 40.0 && threshold.threshold < 200.0);
        assert!(threshold.fidelity > 0.99);
    }
    let truth = true_survival(&synthetic, 0, 1);
    for (stat, expected) in result.average_survival.iter().zip(&truth) {
        assert_abs_diff_eq!(stat.mean, *expected, epsilon = 0.03);
    }
    assert_abs_diff_eq!(result.average_survival[0].mean, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.average_survival[0].participation, 0.55, epsilon = 0.05);
    assert!(result.average_fit.is_some());
}

#[test]
fn test_population_loading_rate() {
    let (synthetic, run) = synthetic(&[1.0], 400, 1, 5);
    let sites = sites(&TweezerArray::default());
    let result = population_analysis(run, &sites, 0, &PopulationOptions::default()).unwrap();

    let truth = synthetic.occupancy.iter().filter(|&&a| a).count() as f64
        / synthetic.occupancy.len() as f64;
    assert_abs_diff_eq!(result.total_loading.mean, truth, epsilon = 1e-9);
    assert_abs_diff_eq!(result.loading_rate[0].mean, truth, epsilon = 1e-9);
    assert_eq!(result.atom_images.dim(), (400, 12, 12));
}

#[test]
fn test_scatter_pools_all_shots() {
    let (_, run) = synthetic(&[0.8], 400, 3, 9);
    let sites = sites(&TweezerArray::default());
    let result = scatter_analysis(run, &sites, &ScatterOptions::default()).unwrap();

    assert!(!result.loaded.is_empty());
    assert!(result.loaded.windows(2).all(|w| w[0] < w[1]));
    // survival does not depend on how many neighbours were loaded; two and
    // three loaded sites are the best populated subsets
    for n in [2, 3] {
        let index = result.loaded.iter().position(|&l| l == n).unwrap();
        assert_abs_diff_eq!(result.average_survival[index].mean, 0.8, epsilon = 0.08);
    }
    assert!(result.average_fit.is_some());
}

#[test]
fn test_assembly_without_losses() {
    let (_, run) = synthetic(&[1.0], 200, 2, 13);
    let sites = sites(&TweezerArray::default());
    let result = assembly_analysis(run, &sites, 1, &AssemblyOptions::default()).unwrap();

    assert_abs_diff_eq!(result.enhancement[0].mean, 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(result.net_loss[0].mean, 0.0, epsilon = 1e-12);
    // six sites each loaded with p = 0.55
    assert_abs_diff_eq!(result.ensemble[0].mean, 0.55_f64.powi(6), epsilon = 0.05);
}

#[test]
fn test_analysis_of_stored_run() {
    let (synthetic, run) = synthetic(&[0.9, 0.6, 0.3], 150, 2, 21);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.npy");
    let metadata = RunMetadata {
        key_name: run.key_name.clone(),
        key: vec![30.0, 10.0, 20.0],
        repetitions: run.repetitions,
    };
    write_run(&path, &run.pictures, &metadata).unwrap();

    let loaded = load_run(&path, 2).unwrap();
    let sites = sites(&TweezerArray::default());
    let result = transfer_analysis(loaded, &sites, &sites, &TransferOptions::default()).unwrap();

    // variations come back ordered by key: 10, 20, 30
    assert_eq!(result.key, vec![10.0, 20.0, 30.0]);
    let truth = true_survival(&synthetic, 0, 1);
    assert_abs_diff_eq!(result.average_survival[0].mean, truth[1], epsilon = 0.03);
    assert_abs_diff_eq!(result.average_survival[1].mean, truth[2], epsilon = 0.03);
    assert_abs_diff_eq!(result.average_survival[2].mean, truth[0], epsilon = 0.03);
}
