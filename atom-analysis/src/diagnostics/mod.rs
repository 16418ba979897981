//! Text logs written by the control software: code timing and waveforms.

pub mod timing;
pub mod waveform;

pub use timing::{code_timing, TimingReport};
pub use waveform::{spectrum, waveform, Spectrum, Waveform, DEFAULT_SAMPLE_RATE};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiagnosticsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: '{token}' is not a number")]
    Parse { line: usize, token: String },
    #[error("timing log has no header line")]
    MissingHeader,
    #[error("line {line}: expected {expected} times, found {found}")]
    ColumnMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("no samples found")]
    NoSamples,
    #[error("bad samples: {0}")]
    Stats(#[from] shared::StatsError),
}

/// Read a diagnostics log into memory
pub fn read_log(path: &Path) -> Result<String, DiagnosticsError> {
    std::fs::read_to_string(path).map_err(|source| DiagnosticsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn parse_number(token: &str, line: usize) -> Result<f64, DiagnosticsError> {
    token.parse().map_err(|_| DiagnosticsError::Parse {
        line,
        token: token.to_string(),
    })
}
