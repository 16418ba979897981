//! Picture-level processing shared by the analysis pipelines

pub mod border;
#[cfg(feature = "synthetic")]
pub mod synthetic;
