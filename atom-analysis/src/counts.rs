//! Per-site pixel counts and atom states.

use rayon::prelude::*;
use shared::border_counts;

use crate::error::Result;
use crate::run::{ExperimentRun, Site};

/// Average border count of picture `picture` in every shot
pub fn picture_borders(run: &ExperimentRun, picture: usize) -> Result<Vec<f64>> {
    run.check_picture(picture)?;
    Ok(border_counts(
        run.pictures.view(),
        picture,
        run.pictures_per_repetition,
    ))
}

/// Pixel value at `site` in picture `picture` of every shot.
///
/// With `subtract_border` the picture's average border count is removed
/// first. One value per shot, variation-major.
pub fn site_counts(
    run: &ExperimentRun,
    site: Site,
    picture: usize,
    subtract_border: bool,
) -> Result<Vec<f64>> {
    run.check_picture(picture)?;
    run.check_sites(&[site])?;
    let borders = if subtract_border {
        Some(picture_borders(run, picture)?)
    } else {
        None
    };
    Ok(shot_counts(run, site, picture, borders.as_deref()))
}

fn shot_counts(run: &ExperimentRun, site: Site, picture: usize, borders: Option<&[f64]>) -> Vec<f64> {
    (0..run.shots())
        .map(|shot| {
            let value = run.picture(shot, picture)[[site.row, site.col]];
            value - borders.map_or(0.0, |b| b[shot])
        })
        .collect()
}

/// Counts for several sites of the same picture, sharing one border pass
pub fn sites_counts(
    run: &ExperimentRun,
    sites: &[Site],
    picture: usize,
    subtract_border: bool,
) -> Result<Vec<Vec<f64>>> {
    run.check_picture(picture)?;
    run.check_sites(sites)?;
    let borders = if subtract_border {
        Some(picture_borders(run, picture)?)
    } else {
        None
    };
    Ok(sites
        .par_iter()
        .map(|&site| shot_counts(run, site, picture, borders.as_deref()))
        .collect())
}

/// Classify counts against a threshold; a count equal to the threshold is empty
pub fn atom_states(counts: &[f64], threshold: f64) -> (Vec<bool>, usize) {
    let atoms: Vec<bool> = counts.iter().map(|&c| c > threshold).collect();
    let found = atoms.iter().filter(|&&a| a).count();
    (atoms, found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::run::RunMetadata;
    use ndarray::Array3;

    /// 2 shots x 2 pictures of 4x4 with a border of `p` and the centre pixel `10 p + 5`
    fn run() -> ExperimentRun {
        let pictures = Array3::from_shape_fn((4, 4, 4), |(p, r, c)| {
            if r == 0 || c == 0 || r == 3 || c == 3 {
                p as f64
            } else {
                10.0 * p as f64 + 5.0
            }
        });
        let metadata = RunMetadata {
            repetitions: 2,
            ..Default::default()
        };
        ExperimentRun::new(pictures, metadata, 2).unwrap()
    }

    #[test]
    fn test_raw_counts() {
        let counts = site_counts(&run(), Site::new(1, 1), 1, false).unwrap();
        assert_eq!(counts, vec![15.0, 35.0]);
    }

    #[test]
    fn test_border_subtracted_counts() {
        let counts = site_counts(&run(), Site::new(2, 2), 1, true).unwrap();
        assert_eq!(counts, vec![14.0, 32.0]);
    }

    #[test]
    fn test_sites_counts_matches_single_site() {
        let run = run();
        let sites = [Site::new(1, 1), Site::new(0, 0)];
        let all = sites_counts(&run, &sites, 0, true).unwrap();
        for (site, counts) in sites.iter().zip(&all) {
            assert_eq!(counts, &site_counts(&run, *site, 0, true).unwrap());
        }
    }

    #[test]
    fn test_picture_out_of_range() {
        assert!(matches!(
            site_counts(&run(), Site::new(1, 1), 2, true),
            Err(AnalysisError::PictureOutOfRange { picture: 2, .. })
        ));
    }

    #[test]
    fn test_threshold_is_strict() {
        let (atoms, found) = atom_states(&[10.0, 20.0, 20.5, 5.0], 20.0);
        assert_eq!(atoms, vec![false, false, true, false]);
        assert_eq!(found, 1);
    }
}
