//! Rearrangement success broken down by what the rearrangement did.
//!
//! Log entry `i` describes shot `i` of the run. Kept shots are grouped by
//! target location (optionally) and then by move description or by number
//! of moves. Each category reports how often it occurred and how often the
//! rearranged picture showed the target pattern.

use serde::{Deserialize, Serialize};

use super::filters::MoveFilters;
use super::parser::RearrangeEntry;
use crate::analysis::{classify_sites, site_thresholds, try_fit};
use crate::error::{AnalysisError, Result};
use crate::fitting::{ScanFit, ScanModel};
use crate::run::{ExperimentRun, Site};
use crate::statistics::{ensemble_hits, MeanError};
use crate::threshold::{ThresholdOptions, ThresholdResult};

/// Fewest move-count categories worth a decay fit
const MIN_FIT_POINTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RearrangeOptions {
    pub threshold: ThresholdOptions,
    pub load_picture: usize,
    pub rearranged_picture: usize,
    pub subtract_border: bool,
    pub filters: MoveFilters,
    /// Categorise by the number of moves rather than by the moves themselves
    pub split_by_number_of_moves: bool,
    pub split_by_target_location: bool,
    /// Score the fill rate of sites that started empty instead of full patterns
    pub post_select_on_loading: bool,
    /// Fit an exponential decay of success against the number of moves
    pub fit: bool,
}

impl Default for RearrangeOptions {
    fn default() -> Self {
        Self {
            threshold: ThresholdOptions::default(),
            load_picture: 0,
            rearranged_picture: 1,
            subtract_border: true,
            filters: MoveFilters::default(),
            split_by_number_of_moves: false,
            split_by_target_location: false,
            post_select_on_loading: false,
            fit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveCategory {
    pub name: String,
    pub moves: usize,
    pub occurrences: usize,
    pub success: f64,
    pub error: f64,
}

/// Categories of every shot rearranged towards one target location
#[derive(Debug, Clone, Serialize)]
pub struct TargetGroup {
    /// `None` when the run is not split by target location
    pub target: Option<(usize, usize)>,
    pub repetitions: usize,
    /// Sorted by occurrences, most frequent first
    pub categories: Vec<MoveCategory>,
    /// Mean number of moves over shots that moved anything
    pub average_moves: Option<f64>,
    pub repetitions_without_moves: usize,
    pub fit: Option<ScanFit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RearrangeResult {
    pub sites: Vec<Site>,
    pub load_thresholds: Vec<ThresholdResult>,
    pub rearranged_thresholds: Vec<ThresholdResult>,
    /// Shots that passed the move filters
    pub kept_shots: Vec<usize>,
    pub groups: Vec<TargetGroup>,
}

/// Group `items` by key, keeping groups and members in first-seen order
fn group_by<K: PartialEq, T>(items: impl IntoIterator<Item = (K, T)>) -> Vec<(K, Vec<T>)> {
    let mut groups: Vec<(K, Vec<T>)> = Vec::new();
    for (key, item) in items {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups
}

/// Rearrangement statistics of `sites` from a run and its move log
pub fn rearrange_analysis(
    run: &ExperimentRun,
    move_log: &[RearrangeEntry],
    sites: &[Site],
    options: &RearrangeOptions,
) -> Result<RearrangeResult> {
    if options.fit && !options.split_by_number_of_moves {
        return Err(AnalysisError::InvalidOption(
            "a decay fit needs the categories split by number of moves".to_string(),
        ));
    }
    if sites.is_empty() {
        return Err(AnalysisError::NoSites);
    }
    run.check_picture(options.load_picture)?;
    run.check_picture(options.rearranged_picture)?;

    let shots = run.shots();
    if move_log.len() != shots {
        log::warn!(
            "move log holds {} entries for {shots} shots; using the first {}",
            move_log.len(),
            move_log.len().min(shots)
        );
    }
    let kept_shots: Vec<usize> = (0..move_log.len().min(shots))
        .filter(|&shot| options.filters.keep(&move_log[shot], sites.len()))
        .collect();

    let load_thresholds = site_thresholds(
        run,
        sites,
        options.load_picture,
        options.subtract_border,
        &options.threshold,
    )?;
    let rearranged_thresholds = site_thresholds(
        run,
        sites,
        options.rearranged_picture,
        options.subtract_border,
        &options.threshold,
    )?;
    let loaded = classify_sites(
        run,
        sites,
        options.load_picture,
        options.subtract_border,
        &load_thresholds,
    )?;
    let rearranged = classify_sites(
        run,
        sites,
        options.rearranged_picture,
        options.subtract_border,
        &rearranged_thresholds,
    )?;

    let by_target = group_by(kept_shots.iter().map(|&shot| {
        let target = move_log[shot]
            .target_location
            .filter(|_| options.split_by_target_location);
        (target, shot)
    }));

    let mut groups = Vec::with_capacity(by_target.len());
    for (target, shots) in by_target {
        let by_moves = group_by(shots.iter().map(|&shot| {
            let entry = &move_log[shot];
            let name = if options.split_by_number_of_moves {
                entry.moves.len().to_string()
            } else {
                entry.description()
            };
            ((name, entry.moves.len()), shot)
        }));

        let mut categories = Vec::with_capacity(by_moves.len());
        for ((name, moves), members) in by_moves {
            let values = if options.post_select_on_loading {
                empty_site_fills(&loaded.atoms, &rearranged.atoms, &members)
            } else {
                let subset: Vec<Vec<bool>> = rearranged
                    .atoms
                    .iter()
                    .map(|site| members.iter().map(|&shot| site[shot]).collect())
                    .collect();
                ensemble_hits(&subset, None, false)?
            };
            let stat = MeanError::of(&values);
            categories.push(MoveCategory {
                name,
                moves,
                occurrences: members.len(),
                success: stat.mean,
                error: stat.error,
            });
        }
        categories.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

        let move_counts: Vec<f64> = shots
            .iter()
            .map(|&shot| move_log[shot].moves.len())
            .filter(|&n| n > 0)
            .map(|n| n as f64)
            .collect();
        let average_moves = (!move_counts.is_empty()).then(|| MeanError::of(&move_counts).mean);
        let repetitions_without_moves = shots.len() - move_counts.len();
        if options.split_by_number_of_moves {
            log::info!(
                "target {target:?}: {} repetitions, {repetitions_without_moves} without moves, average moves {average_moves:?}",
                shots.len()
            );
        }

        let fit = if options.fit {
            decay_fit(&categories)
        } else {
            None
        };
        groups.push(TargetGroup {
            target,
            repetitions: shots.len(),
            categories,
            average_moves,
            repetitions_without_moves,
            fit,
        });
    }

    log::info!(
        "rearrange analysis: kept {} of {} shots in {} target groups",
        kept_shots.len(),
        shots,
        groups.len()
    );

    Ok(RearrangeResult {
        sites: sites.to_vec(),
        load_thresholds,
        rearranged_thresholds,
        kept_shots,
        groups,
    })
}

/// Final occupancy of every site that was empty in the load picture
fn empty_site_fills(loaded: &[Vec<bool>], rearranged: &[Vec<bool>], shots: &[usize]) -> Vec<f64> {
    loaded
        .iter()
        .zip(rearranged)
        .flat_map(|(load, rerng)| {
            shots
                .iter()
                .filter(|&&shot| !load[shot])
                .map(|&shot| f64::from(u8::from(rerng[shot])))
        })
        .collect()
}

fn decay_fit(categories: &[MoveCategory]) -> Option<ScanFit> {
    let mut points: Vec<(f64, f64)> = categories
        .iter()
        .filter(|c| c.moves > 0)
        .map(|c| (c.moves as f64, c.success))
        .collect();
    if points.len() < MIN_FIT_POINTS {
        log::warn!(
            "only {} move counts with moves; skipping the decay fit",
            points.len()
        );
        return None;
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (moves, success): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
    try_fit(
        Some(ScanModel::ExponentialDecay),
        &moves,
        &success,
        None,
        "rearrangement success",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rearrange::parser::parse_rearrange_log;
    use crate::run::RunMetadata;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    const LOG: &str = "Rep # 0
Source: 1; 1;
Target Location: 0 0
Moves:
0 1 0
1 1

Rep # 1
Source: 1; 1;
Target Location: 0 0
Moves:
0 1 0
1 1

Rep # 2
Source: 1; 0;
Target Location: 0 0
Moves:

Rep # 3
Source: 1; 1;
Target Location: 0 1
Moves:
";

    /// `shots[i]` gives (loaded, rearranged) for the two sites
    fn run(shots: &[[(bool, bool); 2]]) -> ExperimentRun {
        let sites = [(1, 1), (1, 3)];
        let mut pictures = Array3::<f64>::zeros((shots.len() * 2, 3, 5));
        for (shot, states) in shots.iter().enumerate() {
            for (&(row, col), &(loaded, rearranged)) in sites.iter().zip(states) {
                pictures[[2 * shot, row, col]] = if loaded { 250.0 } else { 0.0 };
                pictures[[2 * shot + 1, row, col]] = if rearranged { 250.0 } else { 0.0 };
            }
        }
        let metadata = RunMetadata {
            repetitions: shots.len(),
            ..Default::default()
        };
        ExperimentRun::new(pictures, metadata, 2).unwrap()
    }

    fn shots() -> [[(bool, bool); 2]; 4] {
        [
            [(true, true), (false, true)],
            [(true, true), (false, false)],
            [(true, true), (false, false)],
            [(true, true), (true, true)],
        ]
    }

    fn options() -> RearrangeOptions {
        RearrangeOptions {
            threshold: ThresholdOptions {
                manual_threshold: Some(125.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_categories_by_description() {
        let log = parse_rearrange_log(LOG, None).unwrap();
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let result = rearrange_analysis(&run(&shots()), &log, &sites, &options()).unwrap();

        // shot 2 loaded a single atom and is filtered out
        assert_eq!(result.kept_shots, vec![0, 1, 3]);
        assert_eq!(result.groups.len(), 1);
        let categories = &result.groups[0].categories;
        assert_eq!(categories[0].name, "(1,1)U");
        assert_eq!(categories[0].occurrences, 2);
        assert_relative_eq!(categories[0].success, 0.5);
        assert_relative_eq!(categories[0].error, 0.5 / 2.0_f64.sqrt());
        assert_eq!(categories[1].name, "No-Move");
        assert_relative_eq!(categories[1].success, 1.0);
    }

    #[test]
    fn test_split_by_target_and_move_count() {
        let log = parse_rearrange_log(LOG, None).unwrap();
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let options = RearrangeOptions {
            split_by_target_location: true,
            split_by_number_of_moves: true,
            ..options()
        };
        let result = rearrange_analysis(&run(&shots()), &log, &sites, &options).unwrap();

        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.groups[0].target, Some((0, 0)));
        assert_eq!(result.groups[0].categories[0].name, "1");
        assert_eq!(result.groups[0].average_moves, Some(1.0));
        assert_eq!(result.groups[1].target, Some((0, 1)));
        assert_eq!(result.groups[1].repetitions_without_moves, 1);
    }

    #[test]
    fn test_fill_rate_of_empty_sites() {
        let log = parse_rearrange_log(LOG, None).unwrap();
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let options = RearrangeOptions {
            post_select_on_loading: true,
            filters: MoveFilters::none(),
            ..options()
        };
        let result = rearrange_analysis(&run(&shots()), &log, &sites, &options).unwrap();
        // site (1, 3) started empty in shots 0 and 1 and was filled once
        let moved = &result.groups[0].categories[0];
        assert_eq!(moved.occurrences, 2);
        assert_relative_eq!(moved.success, 0.5);
    }

    #[test]
    fn test_fit_needs_move_counts() {
        let log = parse_rearrange_log(LOG, None).unwrap();
        let sites = [Site::new(1, 1), Site::new(1, 3)];
        let options = RearrangeOptions {
            fit: true,
            ..options()
        };
        assert!(matches!(
            rearrange_analysis(&run(&shots()), &log, &sites, &options),
            Err(AnalysisError::InvalidOption(_))
        ));
    }
}
