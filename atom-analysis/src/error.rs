//! Crate-level error type

use shared::WindowError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::diagnostics::DiagnosticsError;
use crate::fitting::FitError;
use crate::loader::LoadError;
use crate::rearrange::RearrangeLogError;
use crate::threshold::ThresholdError;

/// Errors surfaced by the analysis pipelines
///
/// Parameter validation happens up front; none of these are retried.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("key was empty")]
    KeyEmpty,

    #[error(
        "the length of the key ({key_len}) doesn't match the {variations} variations found in the data"
    )]
    KeyLengthMismatch { key_len: usize, variations: usize },

    #[error(
        "{pictures} pictures cannot be split into repetitions of {repetitions} x {pictures_per_repetition} pictures"
    )]
    IncompleteRepetitions {
        pictures: usize,
        repetitions: usize,
        pictures_per_repetition: usize,
    },

    #[error("picture {picture} is out of range for {pictures_per_repetition} pictures per repetition")]
    PictureOutOfRange {
        picture: usize,
        pictures_per_repetition: usize,
    },

    #[error("site ({row}, {col}) lies outside a {rows}x{cols} picture")]
    SiteOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("site lists differ in length: {first} vs {second}")]
    SiteCountMismatch { first: usize, second: usize },

    #[error("no sites given")]
    NoSites,

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    RearrangeLog(#[from] RearrangeLogError),

    #[error(transparent)]
    Diagnostics(#[from] DiagnosticsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
