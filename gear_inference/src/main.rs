use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gear_inference::types::write_inference;
use gear_inference::{DrivetrainConfig, InferenceSettings, RatioModel, TirePreset};
use serde_json::json;
use telemetry_feed::table::{read_balanced, write_balanced};
use telemetry_feed::{source, BalanceOptions, EmptyVehiclePolicy, TelemetrySample};
use tracing_subscriber::EnvFilter;

const DEFAULT_BALANCED_PATH: &str = "balanced_data.csv";
const DEFAULT_RATIOS_PATH: &str = "gear_ratios.csv";

#[derive(Parser, Debug)]
#[command(name = "gear_inference", version, about = "Balance engine telemetry and infer engaged gear ratios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file overriding drivetrain constants and catalogs.
    #[arg(long, global = true, env = "GEAR_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (defaults to one per core).
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Print a JSON summary of the run on stdout.
    #[arg(long, global = true)]
    summary: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read logger documents and write the balanced table.
    Balance {
        /// Directory holding the `.txt` logger documents.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_BALANCED_PATH)]
        out: PathBuf,
        #[command(flatten)]
        balance: BalanceArgs,
    },
    /// Infer gear ratios for a balanced table.
    Infer {
        /// Balanced table written by `balance`.
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_RATIOS_PATH)]
        out: PathBuf,
        #[command(flatten)]
        infer: InferArgs,
    },
    /// Balance then infer in one go.
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_BALANCED_PATH)]
        balanced_out: PathBuf,
        #[arg(long, default_value = DEFAULT_RATIOS_PATH)]
        out: PathBuf,
        #[command(flatten)]
        balance: BalanceArgs,
        #[command(flatten)]
        infer: InferArgs,
    },
}

#[derive(Args, Debug)]
struct BalanceArgs {
    /// Seed for per-vehicle sampling; omit for a random draw.
    #[arg(long)]
    seed: Option<u64>,
    /// Leave out vehicles with no qualifying records instead of failing.
    #[arg(long)]
    skip_empty_vehicles: bool,
}

impl BalanceArgs {
    fn options(&self) -> BalanceOptions {
        BalanceOptions {
            seed: self.seed,
            empty_vehicles: if self.skip_empty_vehicles {
                EmptyVehiclePolicy::Skip
            } else {
                EmptyVehiclePolicy::Reject
            },
        }
    }
}

#[derive(Args, Debug)]
struct InferArgs {
    #[arg(long, value_enum, default_value_t = TirePreset::Road)]
    tire: TirePreset,
    /// Tire diameter in inches, overriding the preset.
    #[arg(long)]
    tire_diameter: Option<f64>,
    /// Evaluate every row in this gear instead of its recorded gear.
    #[arg(long)]
    assume_gear: Option<u8>,
}

impl InferArgs {
    fn settings(&self, config: &DrivetrainConfig) -> Result<InferenceSettings> {
        let tire_diameter_in = self
            .tire_diameter
            .unwrap_or_else(|| config.tire_diameter(self.tire));
        if !(tire_diameter_in.is_finite() && tire_diameter_in > 0.0) {
            bail!("tire diameter must be positive, got {}", tire_diameter_in);
        }
        Ok(InferenceSettings {
            tire_diameter_in,
            assume_gear: self.assume_gear,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure worker threads")?;
    }

    let config = match &cli.config {
        Some(path) => {
            let cfg = DrivetrainConfig::load(path)?;
            tracing::info!("loaded drivetrain config from {}", path.display());
            cfg
        }
        None => DrivetrainConfig::default(),
    };

    let report = match &cli.command {
        Commands::Balance { input, out, balance } => {
            let (_, feed) = run_balance(input, out, balance)?;
            json!({ "balance": feed })
        }
        Commands::Infer { input, out, infer } => {
            let samples = read_table(input)?;
            let summary = run_infer(&samples, out, infer, config)?;
            json!({ "infer": summary })
        }
        Commands::Run {
            input,
            balanced_out,
            out,
            balance,
            infer,
        } => {
            let (samples, feed) = run_balance(input, balanced_out, balance)?;
            let summary = run_infer(&samples, out, infer, config)?;
            json!({ "balance": feed, "infer": summary })
        }
    };

    if cli.summary {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn run_balance(
    input: &Path,
    out: &Path,
    args: &BalanceArgs,
) -> Result<(Vec<TelemetrySample>, telemetry_feed::FeedSummary)> {
    let set = source::read_directory(input)?;
    let prepared = telemetry_feed::prepare_dataset(&set.documents, &args.options())
        .with_context(|| format!("failed to balance telemetry from {}", input.display()))?;

    let mut summary = prepared.summary();
    summary
        .failed_documents
        .extend(set.failures.iter().map(ToString::to_string));

    let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let rows = write_balanced(BufWriter::new(file), prepared.dataset.samples())
        .with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!("balanced data saved to {} ({} rows)", out.display(), rows);

    Ok((prepared.dataset.into_samples(), summary))
}

fn read_table(path: &Path) -> Result<Vec<TelemetrySample>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let samples = read_balanced(BufReader::new(file))
        .with_context(|| format!("failed to read balanced table {}", path.display()))?;
    tracing::info!("read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

fn run_infer(
    samples: &[TelemetrySample],
    out: &Path,
    args: &InferArgs,
    config: DrivetrainConfig,
) -> Result<gear_inference::InferenceSummary> {
    let settings = args.settings(&config)?;
    let model = RatioModel::new(config)?;
    tracing::info!(
        "inferring {} samples with tire diameter {} in",
        samples.len(),
        settings.tire_diameter_in
    );

    let batch = model.infer_all(samples, &settings);
    let summary = batch.summary();
    if summary.negative_confidence > 0 {
        tracing::warn!(
            "{} rows matched with negative confidence (ratio far outside its catalog)",
            summary.negative_confidence
        );
    }

    let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let rows = write_inference(BufWriter::new(file), &batch.rows)
        .with_context(|| format!("failed to write {}", out.display()))?;
    tracing::info!("gear ratios saved to {} ({} rows)", out.display(), rows);
    Ok(summary)
}
