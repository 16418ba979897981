//! JSON analysis configuration.
//!
//! One file can hold the options of every analysis; sections that are
//! missing fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::{AssemblyOptions, PopulationOptions, ScatterOptions, TransferOptions};
use crate::images::ImageOptions;
use crate::rearrange::RearrangeOptions;
use crate::run::SiteSpec;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub pictures_per_repetition: Option<usize>,
    /// Sites examined in the load picture
    pub sites: Option<SiteSpec>,
    /// Sites examined in the second picture, when they differ
    pub transfer_sites: Option<SiteSpec>,
    pub transfer: TransferOptions,
    pub population: PopulationOptions,
    pub assembly: AssemblyOptions,
    pub scatter: ScatterOptions,
    pub rearrange: RearrangeOptions,
    pub images: ImageOptions,
}

impl AnalysisConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save as pretty-printed JSON
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_error)
    }
}
