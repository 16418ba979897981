//! Atom detection and survival statistics for optical tweezer pictures.
//!
//! A run is a stack of camera pictures taken over several variations of a
//! scanned parameter (the key), each repeated a number of times with a fixed
//! number of pictures per repetition. The pipelines in [`analysis`] count
//! the pixel brightness at every trap site, find a threshold separating
//! empty traps from loaded ones, and turn the resulting atom states into
//! loading, survival, assembly and loss statistics.
//!
//! ```no_run
//! use atom_analysis::analysis::{transfer_analysis, TransferOptions};
//! use atom_analysis::loader::load_run;
//! use atom_analysis::run::SiteSpec;
//!
//! # fn main() -> atom_analysis::Result<()> {
//! let run = load_run("data/run_12.npy", 2)?;
//! let sites = SiteSpec::Grid([3, 3, 3, 1, 6]).unpack();
//! let result = transfer_analysis(run, &sites, &sites, &TransferOptions::default())?;
//! println!("{:?}", result.average_survival);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod counts;
pub mod diagnostics;
pub mod error;
pub mod fitting;
pub mod images;
pub mod loader;
pub mod post_select;
pub mod rearrange;
pub mod run;
pub mod statistics;
pub mod threshold;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use loader::{load_run, InMemoryRun, NpyRunLoader, PictureSource};
pub use run::{organize, ExperimentRun, OrganizeOptions, RunMetadata, Site, SiteSpec};
