use crate::cli::ProblemArgs;
use crate::error::{CliError, Result};
use dbhop::core::channels::{
    Bulk, BulkParams, Channel, ChannelError, ChannelKind, Clock, ClockParams, Tip, TipParams,
};
use dbhop::core::lattice::{DbSite, LatticeParams};
use dbhop::core::physics::coulomb::PhysicsParams;
use dbhop::core::physics::rates::{RateModelKind, RateParams};
use dbhop::engine::HoppingModel;
use dbhop::engine::config::{ConfigError, HoppingConfig, HoppingParams};
use dbhop::engine::error::EngineError;
use dbhop::workflows::ensemble::EnsembleConfig;
use dbhop::workflows::scan::LineScanConfig;
use dbhop::workflows::trajectory::TrajectoryConfig;
use nalgebra::{Point2, Vector2};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// A site given either as a bare column or as `[column, row, bottom]`.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(untagged)]
enum SiteEntry {
    Column(i64),
    Full(i64, i64, bool),
}

impl From<SiteEntry> for DbSite {
    fn from(s: SiteEntry) -> Self {
        match s {
            SiteEntry::Column(c) => DbSite::from(c),
            SiteEntry::Full(c, r, b) => DbSite::new(c, r, b),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ChannelEntry {
    Bulk(BulkParams),
    Tip(TipParams),
    Clock(ClockParams),
}

impl From<ChannelEntry> for Channel {
    fn from(entry: ChannelEntry) -> Self {
        match entry {
            ChannelEntry::Bulk(p) => Channel::Bulk(Bulk::new(p)),
            ChannelEntry::Tip(p) => Channel::Tip(Tip::new(p)),
            ChannelEntry::Clock(p) => Channel::Clock(Clock::new(p)),
        }
    }
}

/// Initial placement and motion of the tip, nm.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TipDrive {
    pub position: Option<[f64; 2]>,
    #[serde(default)]
    pub path: Vec<[f64; 2]>,
    /// Scan speed along `path`, nm/s.
    pub rate: Option<f64>,
    #[serde(default)]
    pub looping: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GradientField {
    /// Field strength, eV per angstrom.
    pub field: f64,
    #[serde(default = "default_direction")]
    pub direction: [f64; 2],
}

fn default_direction() -> [f64; 2] {
    [1.0, 0.0]
}

/// Static perturbations of the site levels.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BiasSection {
    pub gradient: Option<GradientField>,
    /// Positions of fixed electrons, angstroms.
    #[serde(default)]
    pub fixed_charges: Vec<[f64; 2]>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ProblemFile {
    #[serde(default)]
    sites: Vec<SiteEntry>,
    initial_charges: Option<Vec<u8>>,
    rate_model: Option<String>,
    seed: Option<u64>,
    #[serde(default)]
    lattice: LatticeParams,
    #[serde(default)]
    physics: PhysicsParams,
    #[serde(default)]
    hopping: HoppingParams,
    #[serde(default)]
    rates: RateParams,
    #[serde(default)]
    channels: Vec<ChannelEntry>,
    tip: Option<TipDrive>,
    #[serde(default)]
    bias: BiasSection,
    #[serde(default)]
    trajectory: TrajectoryConfig,
    #[serde(default)]
    scan: LineScanConfig,
    #[serde(default)]
    ensemble: EnsembleConfig,
}

/// A fully resolved simulation problem.
#[derive(Debug, Clone)]
pub struct Problem {
    pub sites: Vec<DbSite>,
    pub config: HoppingConfig,
    pub channels: Vec<Channel>,
    pub initial_charges: Option<Vec<u8>>,
    pub tip: Option<TipDrive>,
    pub bias: BiasSection,
    pub trajectory: TrajectoryConfig,
    pub scan: LineScanConfig,
    pub ensemble: EnsembleConfig,
}

impl ProblemFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading problem description from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies overrides with precedence CLI arguments > `--set` values > file.
    pub fn merge_with_cli(mut self, args: &ProblemArgs) -> Result<Problem> {
        self.apply_set_values(&args.set_values)?;

        if let Some(seed) = args.seed {
            self.seed = Some(seed);
        }
        if let Some(n) = args.electrons {
            self.hopping.electron_count = Some(n);
        }
        if let Some(model) = &args.model {
            self.rate_model = Some(model.clone());
        }
        if let Some(t) = args.temperature {
            self.physics.temperature = t;
        }

        if self.sites.is_empty() {
            return Err(CliError::Config(
                "`sites` must list at least one dangling bond.".to_string(),
            ));
        }

        let rate_model = match &self.rate_model {
            Some(name) => name.parse::<RateModelKind>().map_err(ConfigError::from)?,
            None => RateModelKind::default(),
        };

        let mut builder = HoppingConfig::builder()
            .lattice(self.lattice)
            .physics(self.physics)
            .hopping(self.hopping)
            .rates(self.rates)
            .rate_model(rate_model);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        let config = builder.build()?;

        self.scan.validate()?;
        self.trajectory.validate()?;

        Ok(Problem {
            sites: self.sites.into_iter().map(DbSite::from).collect(),
            config,
            channels: self.channels.into_iter().map(Channel::from).collect(),
            initial_charges: self.initial_charges,
            tip: self.tip,
            bias: self.bias,
            trajectory: self.trajectory,
            scan: self.scan,
            ensemble: self.ensemble,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                CliError::Config(format!("Invalid value for {}: {}", key, value))
            })
        }

        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "seed" => self.seed = Some(parse(key, value)?),
                "rate-model" => self.rate_model = Some(value.to_string()),
                "physics.temperature" => self.physics.temperature = parse(key, value)?,
                "physics.debye-length" => self.physics.debye_length = parse(key, value)?,
                "physics.erf-length" => self.physics.erf_length = parse(key, value)?,
                "physics.epsilon-r" => self.physics.epsilon_r = parse(key, value)?,
                "hopping.electron-count" => {
                    self.hopping.electron_count = match value {
                        "auto" => None,
                        v => Some(parse(key, v)?),
                    }
                }
                "hopping.free-rho" => self.hopping.free_rho = parse(key, value)?,
                "hopping.burn-count" => self.hopping.burn_count = parse(key, value)?,
                "hopping.enable-cohop" => self.hopping.enable_cohop = parse(key, value)?,
                "hopping.hop-range" => self.hopping.hop_range = parse(key, value)?,
                "hopping.cohop-range" => self.hopping.cohop_range = parse(key, value)?,
                "rates.hop-attenuation" => self.rates.hop_attenuation = parse(key, value)?,
                "rates.prefactor" => self.rates.prefactor = parse(key, value)?,
                "rates.reorganization-energy" => {
                    self.rates.reorganization_energy = parse(key, value)?
                }
                "rates.lambda-offset" => self.rates.lambda_offset = parse(key, value)?,
                "trajectory.duration" => self.trajectory.duration = parse(key, value)?,
                "trajectory.interval" => self.trajectory.interval = parse(key, value)?,
                "scan.scans" => self.scan.scans = parse(key, value)?,
                "scan.scan-rate" => self.scan.scan_rate = parse(key, value)?,
                "scan.scan-type" => self.scan.scan_type = parse(key, value)?,
                "scan.write-bias" => self.scan.write_bias = parse(key, value)?,
                "ensemble.replicas" => self.ensemble.replicas = parse(key, value)?,
                "ensemble.duration" => self.ensemble.duration = parse(key, value)?,
                "ensemble.warmup" => self.ensemble.warmup = parse(key, value)?,
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Problem {
    /// Builds an initialised model with every channel, bias and tip drive applied.
    pub fn build_model(&self, seed: Option<u64>) -> std::result::Result<HoppingModel, EngineError> {
        let mut config = self.config.clone();
        if seed.is_some() {
            config.seed = seed;
        }
        let mut model = HoppingModel::new(&self.sites, config)?;
        for channel in &self.channels {
            model.add_channel(channel.clone());
        }

        if let Some(g) = self.bias.gradient {
            model.set_bias_gradient(g.field, Vector2::new(g.direction[0], g.direction[1]));
        }
        for &[x, y] in &self.bias.fixed_charges {
            model.add_charge(Point2::new(x, y), true);
        }

        model.initialise(self.initial_charges.as_deref())?;

        if let Some(drive) = &self.tip {
            drive_tip(&mut model, drive)?;
        }
        Ok(model)
    }
}

/// Positions the tip and starts its scan, if requested.
fn drive_tip(model: &mut HoppingModel, drive: &TipDrive) -> std::result::Result<(), EngineError> {
    let outcome = model.configure_channel(ChannelKind::Tip, |channel: &mut Channel| -> std::result::Result<(), ChannelError> {
        let Some(tip) = channel.as_tip_mut() else {
            return Ok(());
        };
        if let Some([x, y]) = drive.position {
            tip.set_position(Point2::new(x, y));
        }
        if !drive.path.is_empty() {
            let path: Vec<Point2<f64>> = drive.path.iter().map(|&[x, y]| Point2::new(x, y)).collect();
            tip.set_scan(&path, drive.rate, drive.looping)?;
        }
        Ok(())
    });
    match outcome {
        Some(result) => result.map_err(|e| EngineError::Config(ConfigError::Channel(e))),
        None => Err(EngineError::Config(ConfigError::InvalidParameter {
            name: "tip",
            reason: "a [tip] section requires a channel of kind \"tip\"".to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use dbhop::workflows::scan::ScanType;
    use once_cell::sync::Lazy;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const PAIR_PROBLEM: &str = r#"
        sites = [0, 4, [2, 1, true]]
        rate-model = "vrh"
        seed = 9

        [physics]
        temperature = 10.0

        [hopping]
        electron-count = 1

        [[channels]]
        kind = "bulk"
        mu = 0.3

        [scan]
        scans = 3
        scan-type = "wr"
    "#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn problem_args(config: &Path, extra: &[&str]) -> ProblemArgs {
        let mut args = vec!["dbhop", "run", "-o", "out.jsonl", "-c", config.to_str().unwrap()];
        args.extend_from_slice(extra);
        match Cli::parse_from(args).command {
            Commands::Run(run) => run.problem,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    #[test]
    fn file_values_are_loaded_over_defaults() {
        let path = write_config_file("pair.toml", PAIR_PROBLEM);
        let problem = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]))
            .unwrap();

        assert_eq!(problem.sites.len(), 3);
        assert_eq!(problem.sites[2], DbSite::new(2, 1, true));
        assert_eq!(problem.config.rate_model, RateModelKind::Vrh);
        assert_eq!(problem.config.seed, Some(9));
        assert_eq!(problem.config.physics.temperature, 10.0);
        assert_eq!(problem.config.physics.debye_length, 50.0);
        assert_eq!(problem.config.hopping.electron_count, Some(1));
        assert_eq!(problem.channels.len(), 1);
        assert_eq!(problem.channels[0].kind(), ChannelKind::Bulk);
        assert_eq!(problem.scan.scans, 3);
        assert_eq!(problem.scan.scan_type, ScanType::WriteRead);
        assert_eq!(problem.scan.scan_rate, 82.0);
    }

    #[test]
    fn cli_args_override_set_values_and_file() {
        let path = write_config_file("override.toml", PAIR_PROBLEM);
        let args = problem_args(
            &path,
            &[
                "-S",
                "physics.temperature=20",
                "-T",
                "30",
                "-S",
                "hopping.hop-range=35",
                "--model",
                "marcus",
                "--seed",
                "4",
            ],
        );
        let problem = ProblemFile::from_file(&path).unwrap().merge_with_cli(&args).unwrap();
        assert_eq!(problem.config.physics.temperature, 30.0);
        assert_eq!(problem.config.hopping.hop_range, 35.0);
        assert_eq!(problem.config.rate_model, RateModelKind::Marcus);
        assert_eq!(problem.config.seed, Some(4));
    }

    #[test]
    fn electron_count_can_be_set_back_to_auto() {
        let path = write_config_file("auto.toml", PAIR_PROBLEM);
        let args = problem_args(&path, &["-S", "hopping.electron-count=auto"]);
        let problem = ProblemFile::from_file(&path).unwrap().merge_with_cli(&args).unwrap();
        assert_eq!(problem.config.hopping.electron_count, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config_file("unknown.toml", "sites = [0]\nbogus = 1\n");
        assert!(matches!(
            ProblemFile::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));

        let path = write_config_file("unknown_set.toml", "sites = [0]\n");
        let args = problem_args(&path, &["-S", "physics.colour=blue"]);
        let result = ProblemFile::from_file(&path).unwrap().merge_with_cli(&args);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("physics.colour")));
    }

    #[test]
    fn malformed_set_value_is_rejected() {
        let path = write_config_file("malformed.toml", "sites = [0]\n");
        let args = problem_args(&path, &["-S", "physics.temperature"]);
        let result = ProblemFile::from_file(&path).unwrap().merge_with_cli(&args);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn empty_geometry_and_bad_model_are_config_errors() {
        let path = write_config_file("empty.toml", "seed = 1\n");
        let result = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]));
        assert!(matches!(result, Err(CliError::Config(_))));

        let path = write_config_file("model.toml", "sites = [0]\nrate-model = \"arrhenius\"\n");
        let result = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("arrhenius")));
    }

    #[test]
    fn model_is_built_with_biases_and_initial_charges() {
        let content = r#"
            sites = [0, 4, 8]
            initial-charges = [1, 0, 0]
            seed = 2

            [hopping]
            electron-count = 1

            [bias]
            fixed-charges = [[0.0, 10.0]]
            gradient = { field = 0.001 }
        "#;
        let path = write_config_file("biased.toml", content);
        let problem = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]))
            .unwrap();
        let model = problem.build_model(None).unwrap();
        assert!(model.is_initialised());
        assert_eq!(model.charge(), &[1, 0, 0]);
        assert!(model.bias()[0] < 0.0);
        assert!(model.bias()[2] > model.bias()[1]);
    }

    #[test]
    fn tip_drive_requires_tip_channel() {
        let content = r#"
            sites = [0, 4]

            [tip]
            position = [0.0, 0.0]
        "#;
        let path = write_config_file("tipless.toml", content);
        let problem = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]))
            .unwrap();
        assert!(matches!(
            problem.build_model(Some(1)),
            Err(EngineError::Config(ConfigError::InvalidParameter { name: "tip", .. }))
        ));
    }

    #[test]
    fn tip_drive_starts_a_scan() {
        let content = r#"
            sites = [0, 4]

            [[channels]]
            kind = "tip"
            scale = 1.0

            [tip]
            position = [0.0, 0.0]
            path = [[1.5, 0.0]]
            rate = 5.0
        "#;
        let path = write_config_file("tip.toml", content);
        let problem = ProblemFile::from_file(&path)
            .unwrap()
            .merge_with_cli(&problem_args(&path, &[]))
            .unwrap();
        let model = problem.build_model(Some(1)).unwrap();
        let tip = model.get_channel(ChannelKind::Tip).and_then(|c| c.as_tip()).unwrap();
        assert!(tip.is_scanning());
    }
}
