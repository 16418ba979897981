//! Write a synthetic tweezer-array run for trying out the analyses.
//!
//! ```bash
//! generate_run demo.npy --survival 1.0,0.9,0.7 --repetitions 200
//! atom-analysis transfer demo.npy --sites "3,3;3,6;3,9;8,3;8,6;8,9"
//! ```

use std::path::PathBuf;

use anyhow::{bail, Result};
use atom_analysis::loader::write_run;
use atom_analysis::RunMetadata;
use clap::Parser;
use shared::image_proc::synthetic::{generate_run, TweezerArray};

#[derive(Parser, Debug)]
#[command(name = "generate_run")]
#[command(about = "Write a synthetic picture stack with a JSON metadata sidecar")]
struct Args {
    /// Output picture stack (.npy); metadata goes next to it as .json
    output: PathBuf,

    /// Survival probability between pictures, one per variation
    #[arg(long, value_delimiter = ',', default_value = "1.0,0.8,0.6")]
    survival: Vec<f64>,

    /// Key value of each variation; defaults to the survival probabilities
    #[arg(long, value_delimiter = ',')]
    key: Option<Vec<f64>>,

    #[arg(long, default_value = "survival")]
    key_name: String,

    #[arg(short, long, default_value_t = 100)]
    repetitions: usize,

    #[arg(short, long, default_value_t = 2)]
    pictures_per_repetition: usize,

    #[arg(long, default_value_t = 0.55)]
    loading_probability: f64,

    #[arg(long, default_value_t = 250.0)]
    atom_counts: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let key = args.key.unwrap_or_else(|| args.survival.clone());
    if key.len() != args.survival.len() {
        bail!(
            "{} key values given for {} variations",
            key.len(),
            args.survival.len()
        );
    }

    let array = TweezerArray {
        loading_probability: args.loading_probability,
        atom_counts: args.atom_counts,
        ..TweezerArray::default()
    };
    let run = generate_run(
        &array,
        &args.survival,
        args.repetitions,
        args.pictures_per_repetition,
        args.seed,
    )?;
    let metadata = RunMetadata {
        key_name: args.key_name,
        key,
        repetitions: args.repetitions,
    };
    write_run(&args.output, &run.pictures, &metadata)?;

    log::info!(
        "wrote {} pictures of {} sites to {}",
        run.pictures.dim().0,
        array.sites.len(),
        args.output.display()
    );
    Ok(())
}
