use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "dbhop - kinetic Monte Carlo simulation of electron hopping in dangling-bond assemblies on H-Si(100).",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads used for ensemble replicas.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate the hopping dynamics and record a trajectory as JSON lines.
    Run(RunArgs),
    /// Sweep a tip along the sites and record the measured charges as CSV.
    Scan(ScanArgs),
    /// Average site occupations over independently seeded replicas.
    Ensemble(EnsembleArgs),
}

/// Options shared by every simulation command.
#[derive(Args, Debug, Clone)]
pub struct ProblemArgs {
    /// Path to the problem description in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Fix the number of electrons, overriding the config file.
    #[arg(short = 'n', long, value_name = "INT")]
    pub electrons: Option<usize>,

    /// Override the hopping rate model (marcus or vrh).
    #[arg(short, long, value_name = "NAME")]
    pub model: Option<String>,

    /// Override the temperature, K.
    #[arg(short = 'T', long, value_name = "FLOAT")]
    pub temperature: Option<f64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S physics.temperature=10
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub problem: ProblemArgs,

    /// Path for the output trajectory (JSON lines).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Override the simulated duration, s.
    #[arg(short, long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Override the interval between snapshots, s.
    #[arg(short, long, value_name = "SECONDS")]
    pub interval: Option<f64>,
}

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub problem: ProblemArgs,

    /// Path for the output charge matrix (CSV).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Override the number of recorded scan lines.
    #[arg(long, value_name = "INT")]
    pub scans: Option<usize>,

    /// Override the scan type (rr, wr or rw).
    #[arg(long, value_name = "TYPE")]
    pub scan_type: Option<String>,

    /// Override the tip speed, angstroms per second.
    #[arg(long, value_name = "FLOAT")]
    pub scan_rate: Option<f64>,
}

/// Arguments for the `ensemble` subcommand.
#[derive(Args, Debug)]
pub struct EnsembleArgs {
    #[command(flatten)]
    pub problem: ProblemArgs,

    /// Path for the output statistics (JSON); printed to stdout if omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Override the number of replicas.
    #[arg(short, long, value_name = "INT")]
    pub replicas: Option<usize>,

    /// Override the averaging duration of each replica, s.
    #[arg(short, long, value_name = "SECONDS")]
    pub duration: Option<f64>,
}
