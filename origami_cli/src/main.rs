//! # ORIGAMI command-line front-end
//!
//! Runs the numeric pipelines of the `origami` crate on plain-text files.
//!
//! ```bash
//! # linearize, smooth and normalize a spectrum
//! origami process spectrum.csv --config origami.toml
//!
//! # pick peaks and infer charge states
//! origami peaks spectrum.csv --charge --output peaks.json
//!
//! # combine an ORIGAMI-MS acquisition into one column per voltage
//! origami origami heatmap.csv --user-list voltages.txt --voltage-map map.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use origami::algorithm::downsample::downsample;
use origami::algorithm::origami_ms::{combine_heatmap, parse_user_steps, AcquisitionMethod};
use origami::algorithm::peaks::pick_peaks;
use origami::config::ProcessingConfig;
use origami::processing::{process_batch, process_heatmap, process_spectrum};
use origami_cli::io::{read_heatmap, read_spectrum, write_heatmap, write_json, write_spectrum};

/// ORIGAMI - ion mobility mass spectrometry processing
#[derive(Parser)]
#[command(name = "origami")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the spectrum pipeline (crop, linearize, smooth, baseline, normalize)
    Process {
        /// Two-column spectrum files
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output file, or output directory when several inputs are given
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Number of worker threads (defaults to all cores)
        #[arg(short = 't', long)]
        threads: Option<usize>,
    },

    /// Detect peaks and write them as JSON
    Peaks {
        /// Two-column spectrum file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output JSON file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Run the spectrum pipeline before peak detection
        #[arg(long)]
        process: bool,

        /// Infer the charge state of every peak
        #[arg(long)]
        charge: bool,
    },

    /// Run the heatmap pipeline (smooth, baseline, clip, normalize)
    Heatmap {
        /// Heatmap CSV file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output heatmap CSV file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Reduce the column count of a large heatmap
    Downsample {
        /// Heatmap CSV file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output heatmap CSV file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Combine ORIGAMI-MS scans into one column per collision voltage
    Origami {
        /// Heatmap CSV file with one column per scan
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Load settings from a TOML config file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Text file of `scans, voltage` pairs (selects the user-defined method)
        #[arg(long, value_name = "FILE")]
        user_list: Option<PathBuf>,

        /// Output heatmap CSV file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write the scan-to-voltage map as JSON
        #[arg(long, value_name = "FILE")]
        voltage_map: Option<PathBuf>,
    },

    /// Print the default configuration as TOML
    Config {
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Process { inputs, config, output, threads } => run_process(&inputs, config, output, threads),
        Commands::Peaks { input, config, output, process, charge } => run_peaks(&input, config, output, process, charge),
        Commands::Heatmap { input, config, output } => run_heatmap(&input, config, output),
        Commands::Downsample { input, config, output } => run_downsample(&input, config, output),
        Commands::Origami { input, config, user_list, output, voltage_map } => {
            run_origami(&input, config, user_list, output, voltage_map)
        }
        Commands::Config { output } => run_config(output),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ProcessingConfig> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ProcessingConfig::from_file(&path).with_context(|| format!("Invalid config file: {}", path.display()))
        }
        None => Ok(ProcessingConfig::default()),
    }
}

/// `<dir>/<stem>_<suffix>.<extension>` next to the input.
fn derived_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    input.with_file_name(format!("{}_{}.{}", stem, suffix, extension))
}

fn run_process(inputs: &[PathBuf], config: Option<PathBuf>, output: Option<PathBuf>, threads: Option<usize>) -> Result<()> {
    let config = load_config(config)?;

    if let [input] = inputs {
        let spectrum = read_spectrum(input)?;
        let processed = process_spectrum(&spectrum, &config.ms)
            .with_context(|| format!("Failed to process {}", input.display()))?;
        let output = output.unwrap_or_else(|| derived_path(input, "processed", "csv"));
        write_spectrum(&output, &processed)?;
        info!("Wrote {} points to {}", processed.len(), output.display());
        return Ok(());
    }

    if let Some(dir) = &output {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    }
    let spectra = inputs.iter().map(|p| read_spectrum(p)).collect::<Result<Vec<_>>>()?;
    let results = process_batch(&spectra, &config.ms, threads)?;

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(processed) => {
                let path = match &output {
                    Some(dir) => dir.join(derived_path(input, "processed", "csv").file_name().unwrap_or_default()),
                    None => derived_path(input, "processed", "csv"),
                };
                write_spectrum(&path, &processed)?;
            }
            Err(e) => {
                warn!("Skipping {}: {}", input.display(), e);
                failed += 1;
            }
        }
    }
    if failed == inputs.len() {
        bail!("none of the {} spectra could be processed", inputs.len());
    }
    info!("Processed {} of {} spectra", inputs.len() - failed, inputs.len());
    Ok(())
}

fn run_peaks(input: &Path, config: Option<PathBuf>, output: Option<PathBuf>, process: bool, charge: bool) -> Result<()> {
    let mut config = load_config(config)?;
    config.peaks.predict_charge |= charge;

    let mut spectrum = read_spectrum(input)?;
    if process {
        spectrum = process_spectrum(&spectrum, &config.ms).context("Spectrum pipeline failed")?;
    }
    let peaks = pick_peaks(&spectrum, &config.peaks).context("Peak picking failed")?;

    let output = output.unwrap_or_else(|| derived_path(input, "peaks", "json"));
    write_json(&output, &peaks)?;
    info!("Wrote {} peaks to {}", peaks.len(), output.display());
    Ok(())
}

fn run_heatmap(input: &Path, config: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let heatmap = read_heatmap(input)?;
    let processed = process_heatmap(&heatmap, &config.heatmap).context("Heatmap pipeline failed")?;

    let output = output.unwrap_or_else(|| derived_path(input, "processed", "csv"));
    write_heatmap(&output, &processed)?;
    info!("Wrote {:?} heatmap to {}", processed.shape(), output.display());
    Ok(())
}

fn run_downsample(input: &Path, config: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(config)?;
    let heatmap = read_heatmap(input)?;
    let outcome = downsample(&heatmap, &config.downsample).context("Downsampling failed")?;

    let output = output.unwrap_or_else(|| derived_path(input, "downsampled", "csv"));
    write_heatmap(&output, &outcome.heatmap)?;
    info!(
        "Reduced {} to {} columns in {} pass(es), wrote {}",
        heatmap.ncols(),
        outcome.heatmap.ncols(),
        outcome.passes,
        output.display()
    );
    Ok(())
}

fn run_origami(
    input: &Path,
    config: Option<PathBuf>,
    user_list: Option<PathBuf>,
    output: Option<PathBuf>,
    voltage_map: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if let Some(path) = user_list {
        let text = fs::read_to_string(&path).with_context(|| format!("Failed to read voltage list: {}", path.display()))?;
        config.origami.user_steps = parse_user_steps(&text).with_context(|| format!("Invalid voltage list: {}", path.display()))?;
        config.origami.method = AcquisitionMethod::UserDefined;
    }

    let heatmap = read_heatmap(input)?;
    let result = combine_heatmap(&heatmap, &config.origami).context("Voltage combination failed")?;

    let output = output.unwrap_or_else(|| derived_path(input, "combined", "csv"));
    write_heatmap(&output, &result.heatmap)?;
    if let Some(path) = voltage_map {
        write_json(&path, &result.voltage_map)?;
    }
    info!(
        "Combined {} scans into {} voltages, wrote {}",
        result.voltage_map.total_scans(),
        result.voltage_map.len(),
        output.display()
    );
    Ok(())
}

fn run_config(output: Option<PathBuf>) -> Result<()> {
    let text = ProcessingConfig::default()
        .to_toml_string()
        .context("Failed to serialize the default configuration")?;
    match output {
        Some(path) => fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}
