// Command-line driver: runs one simulated survey and writes the run table.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use plume::acquisition::RewardMode;
use plume::builders::PlannerBuilder;
use plume::config::PlannerConfig;
use plume::error::Result;
use plume::field::GaussianBumpField;
use plume::metrics::RunLog;

#[derive(Parser, Debug)]
#[command(name = "plume_sim", about = "Online-GP informative path planning simulation")]
struct Cli {
    /// JSON run configuration; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of decision epochs (overrides the config)
    #[arg(long)]
    epochs: Option<usize>,

    /// Random seed for the planner and the synthetic field (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Reward function: mean, info_gain, exp_improve, mes, naive, naive_value
    #[arg(long)]
    reward: Option<RewardMode>,

    /// Number of Gaussian bumps in the synthetic field
    #[arg(long, default_value_t = 3)]
    bumps: usize,

    /// Observation noise standard deviation of the synthetic field
    #[arg(long, default_value_t = 0.1)]
    field_noise: f64,

    /// Path of the per-epoch metrics table
    #[arg(long, default_value = "metrics.txt")]
    output: PathBuf,

    /// Optional `x y z` dump of every observation at the end of the run
    #[arg(long)]
    observations: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_config(cli: &Cli) -> Result<PlannerConfig> {
    let mut config = match &cli.config {
        Some(path) => PlannerConfig::load(path)?,
        None => PlannerConfig::default(),
    };
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(mode) = cli.reward {
        config.reward_mode = mode;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;
    let field = GaussianBumpField::random(config.extent, cli.bumps, cli.field_noise, config.seed)?;
    if let Some((loc, value)) = plume::field::FieldOracle::true_max(&field) {
        tracing::info!(x = loc[0], y = loc[1], value, "true maximum of synthetic field");
    }

    let epochs = config.epochs;
    let mut planner = PlannerBuilder::from_config(config).with_field(Box::new(field)).build()?;
    let mut log = RunLog::create(&cli.output)?;
    let completed = planner.run(epochs, &mut log)?;

    if let Some(path) = &cli.observations {
        planner.model().save_observations(path)?;
    }
    tracing::info!(
        completed,
        distance = planner.distance(),
        best = planner.current_max(),
        output = %cli.output.display(),
        "simulation complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
