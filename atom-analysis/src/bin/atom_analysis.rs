//! Command line front end for the atom analysis pipelines.
//!
//! Every subcommand loads its input, runs one analysis and writes the result
//! as JSON to stdout or `--output`.
//!
//! # Usage
//!
//! ```bash
//! # Survival between the two pictures of every repetition
//! atom-analysis transfer run_12.npy --sites "grid:3,3,3,1,6"
//!
//! # Loading of picture 0, thresholds fixed by hand
//! atom-analysis population run_12.npy --sites "3,3;3,6" --manual-threshold 120
//!
//! # Options from a file, overridden by flags
//! atom-analysis --config analysis.json scatter run_12.npy --connected
//!
//! # Rearrangement success by number of moves
//! atom-analysis rearrange run_14.npy --log moves_14.txt --split-by-number-of-moves
//! ```
//!
//! `RUST_LOG` controls log verbosity (default `info`).

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use atom_analysis::analysis::{
    assembly_analysis, population_analysis, scatter_analysis, transfer_analysis, TransferOptions,
};
use atom_analysis::diagnostics::{code_timing, read_log, waveform, DEFAULT_SAMPLE_RATE};
use atom_analysis::fitting::ScanModel;
use atom_analysis::images::{standard_images, CameraType};
use atom_analysis::post_select::AssemblyCondition;
use atom_analysis::rearrange::{read_rearrange_log, rearrange_analysis};
use atom_analysis::threshold::ThresholdOptions;
use atom_analysis::{AnalysisConfig, ExperimentRun, NpyRunLoader, PictureSource, Site, SiteSpec};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "atom-analysis")]
#[command(about = "Atom detection and survival statistics for tweezer-array pictures")]
#[command(version)]
struct Cli {
    /// JSON file with analysis options; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON result to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every analysis of a picture stack
#[derive(Args, Debug)]
struct RunArgs {
    /// Picture stack (.npy) with a .json metadata file next to it
    pictures: PathBuf,

    /// Metadata file, when it is not next to the pictures
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Pictures taken in each repetition
    #[arg(short, long)]
    pictures_per_repetition: Option<usize>,

    /// Sites as "grid:top,left,spacing,width,height" or "row,col;row,col;..."
    #[arg(short, long)]
    sites: Option<SiteSpec>,

    /// Use this threshold for every site instead of fitting histograms
    #[arg(long)]
    manual_threshold: Option<f64>,

    /// Histogram bin width in counts
    #[arg(long)]
    bin_width: Option<f64>,

    /// Fit a model to the result against the key: linear, exponential_decay or gaussian
    #[arg(long, value_parser = parse_snake_case::<ScanModel>)]
    fit: Option<ScanModel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Survival between a load picture and a transfer picture
    Transfer {
        #[command(flatten)]
        run: RunArgs,

        /// Sites in the transfer picture, when they differ from the load sites
        #[arg(long)]
        transfer_sites: Option<SiteSpec>,

        #[arg(long)]
        load_picture: Option<usize>,

        #[arg(long)]
        transfer_picture: Option<usize>,

        /// Rearrangement run: load picture 1, transfer picture 2, three pictures per repetition
        #[arg(long)]
        rearrange: bool,

        /// Keep only shots with "at_least:N", "exactly:N" or "sites:i,j,..." loaded
        #[arg(long)]
        post_selection: Option<AssemblyCondition>,

        /// Also count atoms appearing in initially empty traps
        #[arg(long)]
        generation: bool,
    },

    /// Loading statistics of one picture
    Population {
        #[command(flatten)]
        run: RunArgs,

        /// Picture within each repetition
        #[arg(long, default_value_t = 0)]
        picture: usize,

        /// Treat the whole run as a single data point
        #[arg(long)]
        analyze_together: bool,
    },

    /// Assembly of a target pattern
    Assembly {
        #[command(flatten)]
        run: RunArgs,

        /// Picture holding the assembled pattern
        #[arg(long, default_value_t = 1)]
        assembly_picture: usize,

        /// Score shots by the fraction of correct sites
        #[arg(long)]
        partial_credit: bool,
    },

    /// Survival against the number of loaded sites
    Scatter {
        #[command(flatten)]
        run: RunArgs,

        /// Require the loaded sites to be neighbours
        #[arg(long)]
        connected: bool,
    },

    /// Rearrangement success per move category
    Rearrange {
        #[command(flatten)]
        run: RunArgs,

        /// Move log written during the run
        #[arg(long)]
        log: PathBuf,

        /// Read at most this many lines of the move log
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        split_by_number_of_moves: bool,

        #[arg(long)]
        split_by_target_location: bool,
    },

    /// Averaged pictures with optional 2-D Gaussian fits
    Images {
        /// Picture stack (.npy) with a .json metadata file next to it
        pictures: PathBuf,

        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Fit every averaged picture with a 2-D Gaussian
        #[arg(long)]
        fit_pictures: bool,

        /// Fit a Gaussian beam to the waists against the key
        #[arg(long)]
        fit_beam_waist: bool,

        /// data_ray, andor, basler_ace or basler_scout
        #[arg(long, value_parser = parse_snake_case::<CameraType>)]
        camera: Option<CameraType>,
    },

    /// Per-stage statistics of a code timing log
    Timing {
        file: PathBuf,
    },

    /// Channels and spectra of a two-channel waveform dump
    Waveform {
        file: PathBuf,

        /// Samples per second
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f64,

        /// Transform only the first N points of each channel
        #[arg(long)]
        fft_points: Option<usize>,
    },
}

/// Parse a snake_case enum name through its serde representation
fn parse_snake_case<T: DeserializeOwned>(s: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value '{s}'"))
}

fn load(run: &RunArgs, config: &AnalysisConfig, default_ppr: usize) -> Result<ExperimentRun> {
    let mut loader = NpyRunLoader::new(&run.pictures);
    if let Some(metadata) = &run.metadata {
        loader = loader.with_metadata(metadata);
    }
    let ppr = run
        .pictures_per_repetition
        .or(config.pictures_per_repetition)
        .unwrap_or(default_ppr);
    loader
        .load(ppr)
        .with_context(|| format!("loading {}", run.pictures.display()))
}

fn sites(run: &RunArgs, config: &AnalysisConfig) -> Result<Vec<Site>> {
    match run.sites.as_ref().or(config.sites.as_ref()) {
        Some(spec) => Ok(spec.unpack()),
        None => bail!("no sites given; pass --sites or set \"sites\" in the config"),
    }
}

fn apply_threshold_flags(run: &RunArgs, threshold: &mut ThresholdOptions) {
    if run.manual_threshold.is_some() {
        threshold.manual_threshold = run.manual_threshold;
    }
    if let Some(width) = run.bin_width {
        threshold.bin_width = width;
    }
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            log::info!("wrote {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };
    let output = cli.output.as_deref();

    match cli.command {
        Command::Transfer {
            run,
            transfer_sites,
            load_picture,
            transfer_picture,
            rearrange,
            post_selection,
            generation,
        } => {
            let mut options = if rearrange {
                TransferOptions {
                    threshold: config.transfer.threshold.clone(),
                    organize: config.transfer.organize.clone(),
                    ..TransferOptions::rearrange()
                }
            } else {
                config.transfer.clone()
            };
            apply_threshold_flags(&run, &mut options.threshold);
            options.load_picture = load_picture.unwrap_or(options.load_picture);
            options.transfer_picture = transfer_picture.unwrap_or(options.transfer_picture);
            options.post_selection = post_selection.or(options.post_selection);
            options.generation_stats |= generation;
            options.fit = run.fit.or(options.fit);

            let load_sites = sites(&run, &config)?;
            let transfer_sites = match transfer_sites.or(config.transfer_sites.clone()) {
                Some(spec) => spec.unpack(),
                None => load_sites.clone(),
            };
            let data = load(&run, &config, if rearrange { 3 } else { 2 })?;
            emit(
                &transfer_analysis(data, &load_sites, &transfer_sites, &options)?,
                output,
            )
        }
        Command::Population {
            run,
            picture,
            analyze_together,
        } => {
            let mut options = config.population.clone();
            apply_threshold_flags(&run, &mut options.threshold);
            options.analyze_together |= analyze_together;
            options.fit = run.fit.or(options.fit);
            let sites = sites(&run, &config)?;
            let data = load(&run, &config, 1)?;
            emit(&population_analysis(data, &sites, picture, &options)?, output)
        }
        Command::Assembly {
            run,
            assembly_picture,
            partial_credit,
        } => {
            let mut options = config.assembly.clone();
            apply_threshold_flags(&run, &mut options.threshold);
            options.partial_credit |= partial_credit;
            options.fit = run.fit.or(options.fit);
            let sites = sites(&run, &config)?;
            let data = load(&run, &config, 2)?;
            emit(
                &assembly_analysis(data, &sites, assembly_picture, &options)?,
                output,
            )
        }
        Command::Scatter { run, connected } => {
            let mut options = config.scatter.clone();
            apply_threshold_flags(&run, &mut options.threshold);
            options.connected |= connected;
            let sites = sites(&run, &config)?;
            let data = load(&run, &config, 3)?;
            emit(&scatter_analysis(data, &sites, &options)?, output)
        }
        Command::Rearrange {
            run,
            log,
            limit,
            split_by_number_of_moves,
            split_by_target_location,
        } => {
            let mut options = config.rearrange.clone();
            apply_threshold_flags(&run, &mut options.threshold);
            options.split_by_number_of_moves |= split_by_number_of_moves;
            options.split_by_target_location |= split_by_target_location;
            let sites = sites(&run, &config)?;
            let data = load(&run, &config, 2)?;
            let moves = read_rearrange_log(&log, limit)?;
            emit(&rearrange_analysis(&data, &moves, &sites, &options)?, output)
        }
        Command::Images {
            pictures,
            metadata,
            fit_pictures,
            fit_beam_waist,
            camera,
        } => {
            let mut options = config.images.clone();
            options.fit_pictures |= fit_pictures;
            options.fit_beam_waist |= fit_beam_waist;
            options.camera = camera.unwrap_or(options.camera);
            let mut loader = NpyRunLoader::new(&pictures);
            if let Some(metadata) = &metadata {
                loader = loader.with_metadata(metadata);
            }
            let stack = loader.pictures()?;
            let key = loader.metadata()?.key;
            emit(&standard_images(stack.view(), &key, &options)?, output)
        }
        Command::Timing { file } => emit(&code_timing(&read_log(&file)?)?, output),
        Command::Waveform {
            file,
            sample_rate,
            fft_points,
        } => emit(
            &waveform(&read_log(&file)?, sample_rate, fft_points)?,
            output,
        ),
    }
}
