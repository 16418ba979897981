//! Picture-level analysis that knows nothing about atoms.
//!
//! Used to look at background light, a MOT or a beam profile: pictures are
//! normalised for camera accumulations, windowed, averaged per variation and
//! optionally fitted with a 2-D Gaussian whose widths are converted to beam
//! waists on the camera.

use ndarray::{Array2, Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use shared::{crop_stack, zero_corners, PixelWindow};

use crate::error::{AnalysisError, Result};
use crate::fitting::{fit_beam_waist, fit_picture, FitResult};
use crate::run::{KeyConversion, VariationRange};

/// Wavelength of the imaged beam in metres
pub const DEFAULT_WAVELENGTH: f64 = 850e-9;

/// Raw fits use a narrower vertical starting width than horizontal
const RAW_SIGMA_Y_RATIO: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraType {
    #[default]
    DataRay,
    Andor,
    BaslerAce,
    BaslerScout,
}

impl CameraType {
    /// Pixel pitch in metres
    pub fn pixel_size(&self) -> f64 {
        match self {
            CameraType::DataRay => 4.4e-6,
            CameraType::Andor => 16e-6,
            CameraType::BaslerAce => 2.2e-6,
            CameraType::BaslerScout => 7.4e-6,
        }
    }
}

/// What is subtracted from every picture to form `minus_background`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Background {
    #[default]
    None,
    Constant(f64),
    /// A picture the size of the windowed pictures
    Picture(Array2<f64>),
}

/// Which processed pictures the 2-D Gaussian fits run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitTarget {
    #[default]
    Raw,
    MinusBackground,
    MinusAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOptions {
    pub window: PixelWindow,
    /// Camera accumulations per picture
    pub accumulations: usize,
    /// Sum groups of `accumulations` consecutive pictures instead of dividing
    pub manual_accumulation: bool,
    pub key_conversion: Option<KeyConversion>,
    pub background: Background,
    /// Subtract the corner average from every processed picture
    pub zero_corners: bool,
    pub data_range: VariationRange,
    pub fit_pictures: bool,
    pub fit_target: FitTarget,
    /// Starting Gaussian width for picture fits, in pixels
    pub fit_width_guess: f64,
    pub fit_beam_waist: bool,
    pub camera: CameraType,
    pub wavelength: f64,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            window: PixelWindow::full(),
            accumulations: 1,
            manual_accumulation: false,
            key_conversion: None,
            background: Background::None,
            zero_corners: false,
            data_range: VariationRange::default(),
            fit_pictures: false,
            fit_target: FitTarget::Raw,
            fit_width_guess: 80.0,
            fit_beam_waist: false,
            camera: CameraType::DataRay,
            wavelength: DEFAULT_WAVELENGTH,
        }
    }
}

/// One picture per variation, ordered by key
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPictures {
    pub key: Vec<f64>,
    pub raw: Array3<f64>,
    pub minus_background: Array3<f64>,
    pub minus_average: Array3<f64>,
    /// Mean of the raw pictures
    pub average: Array2<f64>,
}

fn normalize_accumulations(pictures: ArrayView3<f64>, options: &ImageOptions) -> Result<Array3<f64>> {
    let accumulations = options.accumulations.max(1);
    if !options.manual_accumulation {
        return Ok(pictures.mapv(|v| v / accumulations as f64));
    }
    let (count, rows, cols) = pictures.dim();
    if count % accumulations != 0 {
        return Err(AnalysisError::InvalidOption(format!(
            "{count} pictures cannot be summed in groups of {accumulations}"
        )));
    }
    let mut summed = Array3::<f64>::zeros((count / accumulations, rows, cols));
    for (index, picture) in pictures.outer_iter().enumerate() {
        let mut target = summed.index_axis_mut(Axis(0), index / accumulations);
        target += &picture;
    }
    Ok(summed)
}

/// Mean of the consecutive block of pictures taken for each variation
fn variation_averages(pictures: &Array3<f64>, variations: usize) -> Result<Array3<f64>> {
    let (count, rows, cols) = pictures.dim();
    if variations == 0 || count % variations != 0 || count == 0 {
        return Err(AnalysisError::KeyLengthMismatch {
            key_len: variations,
            variations: count,
        });
    }
    let per_variation = count / variations;
    let mut averages = Array3::<f64>::zeros((variations, rows, cols));
    for (variation, mut average) in averages.outer_iter_mut().enumerate() {
        let block = pictures.slice(ndarray::s![
            variation * per_variation..(variation + 1) * per_variation,
            ..,
            ..
        ]);
        if let Some(mean) = block.mean_axis(Axis(0)) {
            average.assign(&mean);
        }
    }
    Ok(averages)
}

/// Normalise, window, average, order and background-subtract a picture stack.
///
/// # Arguments
/// * `pictures` - Stack shaped `(pictures, rows, cols)`; the count must be a
///   multiple of the key length
/// * `key` - One value per variation
/// * `options` - Processing options
pub fn process_pictures(
    pictures: ArrayView3<f64>,
    key: &[f64],
    options: &ImageOptions,
) -> Result<ProcessedPictures> {
    if key.is_empty() {
        return Err(AnalysisError::KeyEmpty);
    }
    let mut key: Vec<f64> = match &options.key_conversion {
        Some(conversion) => key.iter().map(|&k| conversion.apply(k)).collect(),
        None => key.to_vec(),
    };

    let normalized = normalize_accumulations(pictures, options)?;
    let windowed = if options.window.is_full() {
        normalized
    } else {
        crop_stack(normalized.view(), &options.window)?
    };
    let averaged = variation_averages(&windowed, key.len())?;

    let mut order: Vec<usize> = (0..key.len()).collect();
    order.sort_by(|&a, &b| key[a].total_cmp(&key[b]));
    if !options.data_range.is_all() {
        let (start, end) = options.data_range.resolve(order.len())?;
        order = order[start..end].to_vec();
    }
    let mut raw = averaged.select(Axis(0), &order);
    key = order.iter().map(|&i| key[i]).collect();

    let mut minus_background = match &options.background {
        Background::None => raw.clone(),
        Background::Constant(value) => raw.mapv(|v| v - value),
        Background::Picture(picture) => {
            let (_, rows, cols) = raw.dim();
            if picture.dim() != (rows, cols) {
                return Err(AnalysisError::InvalidOption(format!(
                    "background picture is {:?}, pictures are {rows}x{cols}",
                    picture.dim()
                )));
            }
            &raw - picture
        }
    };
    let (_, rows, cols) = raw.dim();
    let average = raw
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array2::zeros((rows, cols)));
    let mut minus_average = &raw - &average;

    if options.zero_corners {
        for stack in [&mut raw, &mut minus_background, &mut minus_average] {
            stack.outer_iter_mut().for_each(zero_corners);
        }
    }

    log::info!(
        "processed {} pictures into {} variations of {rows}x{cols} pixels",
        pictures.len_of(Axis(0)),
        key.len()
    );

    Ok(ProcessedPictures {
        key,
        raw,
        minus_background,
        minus_average,
        average,
    })
}

/// Waist along each picture axis
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Waist {
    pub x: f64,
    pub y: f64,
}

impl Waist {
    pub fn average(&self) -> f64 {
        (self.x + self.y) / 2.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BeamFits {
    pub x: FitResult,
    pub y: FitResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardImagesResult {
    pub processed: ProcessedPictures,
    /// 2-D Gaussian fit of every processed picture; `None` where a fit failed
    pub picture_fits: Vec<Option<FitResult>>,
    /// Waists `2|sigma|` on the camera, in metres
    pub waists: Vec<Waist>,
    /// Fitted centres on the camera, in metres
    pub positions: Vec<Waist>,
    pub beam_fits: Option<BeamFits>,
}

/// Process pictures and optionally fit every one with a 2-D Gaussian
pub fn standard_images(
    pictures: ArrayView3<f64>,
    key: &[f64],
    options: &ImageOptions,
) -> Result<StandardImagesResult> {
    if options.fit_beam_waist && !options.fit_pictures {
        return Err(AnalysisError::InvalidOption(
            "a beam waist fit needs the picture fits".to_string(),
        ));
    }
    let processed = process_pictures(pictures, key, options)?;

    let picture_fits: Vec<Option<FitResult>> = if options.fit_pictures {
        let (stack, sigma_y) = match options.fit_target {
            FitTarget::Raw => (&processed.raw, options.fit_width_guess * RAW_SIGMA_Y_RATIO),
            FitTarget::MinusBackground => (&processed.minus_background, options.fit_width_guess),
            FitTarget::MinusAverage => (&processed.minus_average, options.fit_width_guess),
        };
        stack
            .outer_iter()
            .enumerate()
            .map(|(i, picture)| match fit_picture(picture, options.fit_width_guess, sigma_y) {
                Ok(fit) => Some(fit),
                Err(e) => {
                    log::warn!("2-D Gaussian fit of picture {i} failed: {e}");
                    None
                }
            })
            .collect()
    } else {
        vec![None; processed.key.len()]
    };

    let pixel = options.camera.pixel_size();
    let (waists, positions): (Vec<Waist>, Vec<Waist>) = picture_fits
        .iter()
        .map(|fit| match fit {
            Some(fit) => (
                Waist {
                    x: 2.0 * fit.params[3].abs() * pixel,
                    y: 2.0 * fit.params[4].abs() * pixel,
                },
                Waist {
                    x: fit.params[1] * pixel,
                    y: fit.params[2] * pixel,
                },
            ),
            None => (Waist::default(), Waist::default()),
        })
        .unzip();

    let beam_fits = if options.fit_beam_waist {
        let xs: Vec<f64> = waists.iter().map(|w| w.x).collect();
        let ys: Vec<f64> = waists.iter().map(|w| w.y).collect();
        match (
            fit_beam_waist(&xs, &processed.key, options.wavelength),
            fit_beam_waist(&ys, &processed.key, options.wavelength),
        ) {
            (Ok(x), Ok(y)) => Some(BeamFits { x, y }),
            (Err(e), _) | (_, Err(e)) => {
                log::warn!("Gaussian beam waist fit failed: {e}");
                None
            }
        }
    } else {
        None
    };

    Ok(StandardImagesResult {
        processed,
        picture_fits,
        waists,
        positions,
        beam_fits,
    })
}
