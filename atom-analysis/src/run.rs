//! Experiment runs: picture stacks grouped by variation and repetition.
//!
//! A run is a flat stack of pictures taken in the order
//! `variation -> repetition -> picture in repetition`. Every variation
//! corresponds to one value of the scanned parameter (the key). A "shot" is
//! one repetition of one variation; per-shot data throughout this crate is
//! ordered variation-major, repetition-minor.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView4, Axis};
use serde::{Deserialize, Serialize};
use shared::{crop_stack, PixelWindow};
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

/// A trap location in picture coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Site {
    pub row: usize,
    pub col: usize,
}

impl Site {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Compact description of a set of sites
///
/// A grid is `[top_row, left_col, spacing, width, height]`; it expands
/// column by column, so all rows of the first column come first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteSpec {
    Grid([usize; 5]),
    List(Vec<(usize, usize)>),
}

impl SiteSpec {
    /// Expand into an ordered list of sites
    pub fn unpack(&self) -> Vec<Site> {
        match self {
            SiteSpec::Grid([top, left, spacing, width, height]) => (0..*width)
                .flat_map(|c| {
                    (0..*height).map(move |r| Site::new(top + spacing * r, left + spacing * c))
                })
                .collect(),
            SiteSpec::List(pairs) => pairs.iter().map(|&(r, c)| Site::new(r, c)).collect(),
        }
    }
}

impl FromStr for SiteSpec {
    type Err = String;

    /// Parse `"grid:top,left,spacing,width,height"` or `"r,c;r,c;..."`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse_list = |text: &str| -> std::result::Result<Vec<usize>, String> {
            text.split(',')
                .map(|v| {
                    v.trim()
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid site coordinate: {v}"))
                })
                .collect()
        };

        if let Some(grid) = s.trim().strip_prefix("grid:") {
            let values = parse_list(grid)?;
            let values: [usize; 5] = values
                .try_into()
                .map_err(|_| "Grid must be 'grid:top,left,spacing,width,height'".to_string())?;
            return Ok(SiteSpec::Grid(values));
        }

        let mut pairs = Vec::new();
        for pair in s.split(';').filter(|p| !p.trim().is_empty()) {
            match parse_list(pair)?.as_slice() {
                [row, col] => pairs.push((*row, *col)),
                _ => return Err(format!("Site must be 'row,col', got '{pair}'")),
            }
        }
        if pairs.is_empty() {
            return Err("No sites given".to_string());
        }
        Ok(SiteSpec::List(pairs))
    }
}

/// Expand a site specification
pub fn unpack_sites(spec: &SiteSpec) -> Vec<Site> {
    spec.unpack()
}

/// Scan description stored next to a picture stack
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunMetadata {
    /// Name of the scanned parameter
    pub key_name: String,
    /// One value per variation, in acquisition order
    pub key: Vec<f64>,
    /// Repetitions per variation
    pub repetitions: usize,
}

/// Polynomial calibration applied to key values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyConversion {
    /// Coefficients in ascending order: `c0 + c1 k + c2 k^2 + ...`
    pub coefficients: Vec<f64>,
    /// Units of the converted key, appended to the key name
    pub units: String,
}

impl KeyConversion {
    pub fn apply(&self, value: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * value + c)
    }
}

/// Variation selection with Python slice semantics
///
/// `end <= 0` counts from the end, so `{0, -1}` drops the last variation.
/// The default `{0, 0}` keeps every variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariationRange {
    pub start: usize,
    pub end: i64,
}

impl VariationRange {
    pub fn new(start: usize, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_all(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    /// Resolve against `count` variations into a half-open range
    pub fn resolve(&self, count: usize) -> Result<(usize, usize)> {
        let end = if self.end <= 0 {
            count as i64 + self.end
        } else {
            self.end
        };
        if end < 0 || end as usize > count || self.start >= end as usize {
            return Err(AnalysisError::InvalidOption(format!(
                "data range {}..{} is empty or exceeds {} variations",
                self.start, self.end, count
            )));
        }
        Ok((self.start, end as usize))
    }
}

/// How a run is reshaped before analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeOptions {
    /// Crop applied to every picture
    pub window: PixelWindow,
    /// Subtracted from every key value
    pub key_offset: f64,
    /// Calibration applied after the offset
    pub key_conversion: Option<KeyConversion>,
    /// Collapse every variation into a single data point
    pub group_all: bool,
    /// Keep only repetitions `start..end` (single-variation runs only)
    pub repetition_range: Option<(usize, usize)>,
    /// Variations kept after ordering
    pub data_range: VariationRange,
    /// Sort variations by ascending key
    pub order_by_key: bool,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            window: PixelWindow::full(),
            key_offset: 0.0,
            key_conversion: None,
            group_all: false,
            repetition_range: None,
            data_range: VariationRange::default(),
            order_by_key: true,
        }
    }
}

/// A validated picture stack with its scan description
#[derive(Debug, Clone)]
pub struct ExperimentRun {
    /// Pictures shaped `(pictures, rows, cols)`
    pub pictures: Array3<f64>,
    pub key: Vec<f64>,
    pub key_name: String,
    pub repetitions: usize,
    pub pictures_per_repetition: usize,
}

impl ExperimentRun {
    /// Validate a stack against its metadata.
    ///
    /// A single-variation run without a key gets the key `[0]`.
    pub fn new(
        pictures: Array3<f64>,
        metadata: RunMetadata,
        pictures_per_repetition: usize,
    ) -> Result<Self> {
        if metadata.repetitions == 0 || pictures_per_repetition == 0 {
            return Err(AnalysisError::InvalidOption(
                "repetitions and pictures per repetition must be positive".to_string(),
            ));
        }

        let count = pictures.len_of(Axis(0));
        let per_variation = metadata.repetitions * pictures_per_repetition;
        if count == 0 || count % per_variation != 0 {
            return Err(AnalysisError::IncompleteRepetitions {
                pictures: count,
                repetitions: metadata.repetitions,
                pictures_per_repetition,
            });
        }

        let variations = count / per_variation;
        let key = if metadata.key.is_empty() && variations == 1 {
            vec![0.0]
        } else {
            metadata.key
        };
        if key.is_empty() {
            return Err(AnalysisError::KeyEmpty);
        }
        if key.len() != variations {
            return Err(AnalysisError::KeyLengthMismatch {
                key_len: key.len(),
                variations,
            });
        }

        Ok(Self {
            pictures,
            key,
            key_name: metadata.key_name,
            repetitions: metadata.repetitions,
            pictures_per_repetition,
        })
    }

    pub fn variations(&self) -> usize {
        self.key.len()
    }

    /// Number of repetitions across all variations
    pub fn shots(&self) -> usize {
        self.variations() * self.repetitions
    }

    pub fn pictures_per_variation(&self) -> usize {
        self.repetitions * self.pictures_per_repetition
    }

    /// `(rows, cols)` of a single picture
    pub fn picture_size(&self) -> (usize, usize) {
        let (_, rows, cols) = self.pictures.dim();
        (rows, cols)
    }

    pub fn picture_index(&self, shot: usize, picture: usize) -> usize {
        shot * self.pictures_per_repetition + picture
    }

    pub fn picture(&self, shot: usize, picture: usize) -> ArrayView2<'_, f64> {
        self.pictures
            .index_axis(Axis(0), self.picture_index(shot, picture))
    }

    /// Pictures regrouped as `(variation, repetition * picture, rows, cols)`
    pub fn grouped(&self) -> Result<ArrayView4<'_, f64>> {
        let (rows, cols) = self.picture_size();
        Ok(self.pictures.view().into_shape_with_order((
            self.variations(),
            self.pictures_per_variation(),
            rows,
            cols,
        ))?)
    }

    pub fn check_picture(&self, picture: usize) -> Result<()> {
        if picture >= self.pictures_per_repetition {
            return Err(AnalysisError::PictureOutOfRange {
                picture,
                pictures_per_repetition: self.pictures_per_repetition,
            });
        }
        Ok(())
    }

    pub fn check_sites(&self, sites: &[Site]) -> Result<()> {
        if sites.is_empty() {
            return Err(AnalysisError::NoSites);
        }
        let (rows, cols) = self.picture_size();
        match sites.iter().find(|s| s.row >= rows || s.col >= cols) {
            Some(site) => Err(AnalysisError::SiteOutOfBounds {
                row: site.row,
                col: site.col,
                rows,
                cols,
            }),
            None => Ok(()),
        }
    }

    /// Keep the listed variations, in the given order
    pub fn select_variations(&self, variations: &[usize]) -> Self {
        let per_variation = self.pictures_per_variation();
        let indices: Vec<usize> = variations
            .iter()
            .flat_map(|&v| v * per_variation..(v + 1) * per_variation)
            .collect();
        Self {
            pictures: self.pictures.select(Axis(0), &indices),
            key: variations.iter().map(|&v| self.key[v]).collect(),
            key_name: self.key_name.clone(),
            repetitions: self.repetitions,
            pictures_per_repetition: self.pictures_per_repetition,
        }
    }

    /// Treat every shot as a repetition of a single variation with key `[0]`
    pub fn group_all(self) -> Self {
        let repetitions = self.shots();
        Self {
            key: vec![0.0],
            repetitions,
            ..self
        }
    }

    /// Keep repetitions `start..end` of a single-variation run
    pub fn restrict_repetitions(self, start: usize, end: usize) -> Result<Self> {
        if self.variations() != 1 {
            return Err(AnalysisError::InvalidOption(
                "a repetition range needs a single-variation run".to_string(),
            ));
        }
        if start >= end || end > self.repetitions {
            return Err(AnalysisError::InvalidOption(format!(
                "repetition range {start}..{end} is empty or exceeds {} repetitions",
                self.repetitions
            )));
        }
        let ppr = self.pictures_per_repetition;
        let pictures = self
            .pictures
            .slice(s![start * ppr..end * ppr, .., ..])
            .to_owned();
        Ok(Self {
            pictures,
            repetitions: end - start,
            ..self
        })
    }

    /// Indices of the variations sorted by ascending key; ties keep their order
    pub fn key_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.variations()).collect();
        order.sort_by(|&a, &b| {
            self.key[a]
                .partial_cmp(&self.key[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }
}

/// Window, regroup, convert and order a run
pub fn organize(run: ExperimentRun, options: &OrganizeOptions) -> Result<ExperimentRun> {
    let mut run = run;

    if !options.window.is_full() {
        run.pictures = crop_stack(run.pictures.view(), &options.window)?;
    }
    if options.group_all {
        run = run.group_all();
    }
    if let Some((start, end)) = options.repetition_range {
        run = run.restrict_repetitions(start, end)?;
    }

    if options.key_offset != 0.0 {
        run.key.iter_mut().for_each(|k| *k -= options.key_offset);
    }
    if let Some(conversion) = &options.key_conversion {
        run.key.iter_mut().for_each(|k| *k = conversion.apply(*k));
        run.key_name = format!("{}; {}", run.key_name, conversion.units);
    }

    let mut order: Vec<usize> = if options.order_by_key {
        run.key_order()
    } else {
        (0..run.variations()).collect()
    };
    if !options.data_range.is_all() {
        let (start, end) = options.data_range.resolve(order.len())?;
        order = order[start..end].to_vec();
    }
    if order.iter().enumerate().any(|(i, &v)| i != v) || order.len() != run.variations() {
        run = run.select_variations(&order);
    }

    log::info!(
        "organized run: {} pictures, {} variations x {} repetitions x {} pictures, {}x{} pixels",
        run.pictures.len_of(Axis(0)),
        run.variations(),
        run.repetitions,
        run.pictures_per_repetition,
        run.picture_size().0,
        run.picture_size().1
    );
    Ok(run)
}

/// Mean picture for each picture index within a repetition
pub fn average_pictures(run: &ExperimentRun) -> Vec<Array2<f64>> {
    let (rows, cols) = run.picture_size();
    let shots = run.shots();
    (0..run.pictures_per_repetition)
        .map(|picture| {
            let mut sum = Array2::<f64>::zeros((rows, cols));
            for shot in 0..shots {
                sum += &run.picture(shot, picture);
            }
            sum / shots.max(1) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Every pixel of picture `i` holds the value `i`
    fn indexed_run(key: Vec<f64>, repetitions: usize, ppr: usize) -> ExperimentRun {
        let count = key.len() * repetitions * ppr;
        let pictures = Array3::from_shape_fn((count, 4, 4), |(p, _, _)| p as f64);
        let metadata = RunMetadata {
            key_name: "detuning".to_string(),
            key,
            repetitions,
        };
        ExperimentRun::new(pictures, metadata, ppr).unwrap()
    }

    #[test]
    fn test_grid_unpacks_column_by_column() {
        let sites = SiteSpec::Grid([2, 3, 4, 2, 3]).unpack();
        assert_eq!(
            sites,
            vec![
                Site::new(2, 3),
                Site::new(6, 3),
                Site::new(10, 3),
                Site::new(2, 7),
                Site::new(6, 7),
                Site::new(10, 7),
            ]
        );
    }

    #[test]
    fn test_site_spec_parsing() {
        assert_eq!(
            "grid:1,2,3,1,2".parse::<SiteSpec>().unwrap(),
            SiteSpec::Grid([1, 2, 3, 1, 2])
        );
        assert_eq!(
            "1,2; 3,4".parse::<SiteSpec>().unwrap(),
            SiteSpec::List(vec![(1, 2), (3, 4)])
        );
        assert!("1,2,3".parse::<SiteSpec>().is_err());
        assert!("".parse::<SiteSpec>().is_err());
    }

    #[test]
    fn test_site_spec_json_forms() {
        let grid: SiteSpec = serde_json::from_str("[1, 2, 3, 4, 5]").unwrap();
        assert_eq!(grid, SiteSpec::Grid([1, 2, 3, 4, 5]));
        let list: SiteSpec = serde_json::from_str("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(list, SiteSpec::List(vec![(1, 2), (3, 4)]));
    }

    #[test]
    fn test_key_length_mismatch() {
        let pictures = Array3::zeros((12, 3, 3));
        let metadata = RunMetadata {
            key_name: String::new(),
            key: vec![1.0, 2.0],
            repetitions: 2,
        };
        let err = ExperimentRun::new(pictures, metadata, 2).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::KeyLengthMismatch {
                key_len: 2,
                variations: 3
            }
        ));
    }

    #[test]
    fn test_incomplete_repetitions() {
        let pictures = Array3::zeros((7, 3, 3));
        let metadata = RunMetadata {
            repetitions: 2,
            ..Default::default()
        };
        assert!(matches!(
            ExperimentRun::new(pictures, metadata, 2),
            Err(AnalysisError::IncompleteRepetitions { pictures: 7, .. })
        ));
    }

    #[test]
    fn test_single_variation_gets_default_key() {
        let pictures = Array3::zeros((4, 3, 3));
        let metadata = RunMetadata {
            repetitions: 2,
            ..Default::default()
        };
        let run = ExperimentRun::new(pictures, metadata, 2).unwrap();
        assert_eq!(run.key, vec![0.0]);
    }

    #[test]
    fn test_empty_key_with_many_variations() {
        let pictures = Array3::zeros((8, 3, 3));
        let metadata = RunMetadata {
            repetitions: 2,
            ..Default::default()
        };
        assert!(matches!(
            ExperimentRun::new(pictures, metadata, 2),
            Err(AnalysisError::KeyEmpty)
        ));
    }

    #[test]
    fn test_ordering_moves_picture_blocks() {
        let run = indexed_run(vec![3.0, 1.0, 2.0], 2, 2);
        let organized = organize(run, &OrganizeOptions::default()).unwrap();

        assert_eq!(organized.key, vec![1.0, 2.0, 3.0]);
        // variation 1 (pictures 4..8) now comes first
        assert_eq!(organized.picture(0, 0)[[0, 0]], 4.0);
        assert_eq!(organized.picture(1, 1)[[0, 0]], 7.0);
        assert_eq!(organized.picture(2, 0)[[0, 0]], 8.0);
        assert_eq!(organized.picture(4, 0)[[0, 0]], 0.0);
    }

    #[test]
    fn test_ordering_is_stable() {
        let run = indexed_run(vec![1.0, 0.0, 1.0], 1, 1);
        let organized = organize(run, &OrganizeOptions::default()).unwrap();
        assert_eq!(organized.key, vec![0.0, 1.0, 1.0]);
        assert_eq!(organized.picture(1, 0)[[0, 0]], 0.0);
        assert_eq!(organized.picture(2, 0)[[0, 0]], 2.0);
    }

    #[test]
    fn test_data_range_drops_last_variation() {
        let run = indexed_run(vec![0.0, 1.0, 2.0], 1, 1);
        let options = OrganizeOptions {
            data_range: VariationRange::new(0, -1),
            ..Default::default()
        };
        let organized = organize(run, &options).unwrap();
        assert_eq!(organized.key, vec![0.0, 1.0]);
        assert_eq!(organized.pictures.len_of(Axis(0)), 2);
    }

    #[test]
    fn test_key_offset_and_conversion() {
        let run = indexed_run(vec![10.0, 12.0], 1, 1);
        let options = OrganizeOptions {
            key_offset: 10.0,
            key_conversion: Some(KeyConversion {
                coefficients: vec![1.0, 2.0, 0.5],
                units: "MHz".to_string(),
            }),
            ..Default::default()
        };
        let organized = organize(run, &options).unwrap();
        // 1 + 2k + 0.5k^2 at k = 0 and k = 2
        assert_eq!(organized.key, vec![1.0, 7.0]);
        assert_eq!(organized.key_name, "detuning; MHz");
    }

    #[test]
    fn test_group_all_and_repetition_range() {
        let run = indexed_run(vec![0.0, 1.0], 3, 2);
        let options = OrganizeOptions {
            group_all: true,
            repetition_range: Some((2, 5)),
            ..Default::default()
        };
        let organized = organize(run, &options).unwrap();

        assert_eq!(organized.key, vec![0.0]);
        assert_eq!(organized.repetitions, 3);
        assert_eq!(organized.picture(0, 0)[[0, 0]], 4.0);
    }

    #[test]
    fn test_repetition_range_needs_single_variation() {
        let run = indexed_run(vec![0.0, 1.0], 3, 2);
        let options = OrganizeOptions {
            repetition_range: Some((0, 1)),
            ..Default::default()
        };
        assert!(matches!(
            organize(run, &options),
            Err(AnalysisError::InvalidOption(_))
        ));
    }

    #[test]
    fn test_window_is_applied() {
        let run = indexed_run(vec![0.0], 1, 1);
        let options = OrganizeOptions {
            window: PixelWindow::new(1, 3, 0, 2),
            ..Default::default()
        };
        let organized = organize(run, &options).unwrap();
        assert_eq!(organized.picture_size(), (2, 2));
    }

    #[test]
    fn test_grouped_view() {
        let run = indexed_run(vec![0.0, 1.0], 2, 3);
        let grouped = run.grouped().unwrap();
        assert_eq!(grouped.dim(), (2, 6, 4, 4));
        assert_eq!(grouped[[1, 2, 0, 0]], 8.0);
    }

    #[test]
    fn test_average_pictures() {
        let run = indexed_run(vec![0.0], 3, 2);
        let averages = average_pictures(&run);
        assert_eq!(averages.len(), 2);
        // pictures 0, 2, 4 and 1, 3, 5
        assert_relative_eq!(averages[0][[1, 1]], 2.0);
        assert_relative_eq!(averages[1][[1, 1]], 3.0);
    }

    #[test]
    fn test_check_sites() {
        let run = indexed_run(vec![0.0], 1, 1);
        assert!(run.check_sites(&[Site::new(3, 3)]).is_ok());
        assert!(matches!(
            run.check_sites(&[Site::new(4, 0)]),
            Err(AnalysisError::SiteOutOfBounds { row: 4, .. })
        ));
        assert!(matches!(run.check_sites(&[]), Err(AnalysisError::NoSites)));
    }
}
