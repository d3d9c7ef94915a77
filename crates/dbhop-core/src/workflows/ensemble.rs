use crate::core::channels::Channel;
use crate::core::lattice::DbSite;
use crate::engine::HoppingModel;
use crate::engine::config::{ConfigError, HoppingConfig};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EnsembleConfig {
    pub replicas: usize,
    /// Simulated time averaged over in each replica, s.
    pub duration: f64,
    /// Simulated time discarded before averaging, s.
    pub warmup: f64,
    /// Seed of the first replica; replica `i` uses `seed + i`.
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            replicas: 8,
            duration: 10.0,
            warmup: 0.0,
            seed: 0,
        }
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "ensemble.replicas",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.duration > 0.0 && self.duration.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "ensemble.duration",
                reason: format!("must be positive and finite, got {}", self.duration),
            });
        }
        if !(self.warmup >= 0.0 && self.warmup.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "ensemble.warmup",
                reason: format!("must be non-negative and finite, got {}", self.warmup),
            });
        }
        Ok(())
    }
}

/// Everything needed to build identical, independently seeded replicas.
#[derive(Debug, Clone)]
pub struct ReplicaTemplate<'a> {
    pub sites: &'a [DbSite],
    pub config: &'a HoppingConfig,
    pub channels: &'a [Channel],
    /// Starting charges; random if `None`.
    pub initial: Option<&'a [u8]>,
}

impl ReplicaTemplate<'_> {
    /// Builds and initialises a replica using `seed`.
    pub fn build(&self, seed: u64) -> Result<HoppingModel, EngineError> {
        let mut config = self.config.clone();
        config.seed = Some(seed);
        let mut model = HoppingModel::new(self.sites, config)?;
        for channel in self.channels {
            model.add_channel(channel.clone());
        }
        model.initialise(self.initial)?;
        Ok(model)
    }
}

/// Time-averaged statistics of a single replica.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicaStats {
    pub seed: u64,
    pub occupancy: Vec<f64>,
    pub mean_electrons: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    /// Mean occupation probability of each site.
    pub occupancy: Vec<f64>,
    pub mean_electrons: f64,
    pub replicas: Vec<ReplicaStats>,
}

/// Runs independent replicas, each with its own engine built by `factory`
/// from a distinct seed, and averages their time-averaged occupancies.
///
/// `factory` must return an initialised model.
#[instrument(skip_all, name = "ensemble_workflow", fields(replicas = config.replicas))]
pub fn run<F>(
    factory: F,
    config: &EnsembleConfig,
    reporter: &ProgressReporter,
) -> Result<EnsembleResult, EngineError>
where
    F: Fn(u64) -> Result<HoppingModel, EngineError> + Sync,
{
    config.validate()?;
    info!(duration = config.duration, "Starting ensemble.");
    reporter.report(Progress::PhaseStart { name: "Ensemble" });
    reporter.report(Progress::TaskStart {
        total_steps: config.replicas as u64,
    });

    let seeds: Vec<u64> = (0..config.replicas as u64)
        .map(|i| config.seed.wrapping_add(i))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let iterator = seeds.iter();

    #[cfg(feature = "parallel")]
    let iterator = seeds.par_iter();

    let results: Vec<Result<ReplicaStats, EngineError>> = iterator
        .map(|&seed| {
            let stats = factory(seed).and_then(|model| run_replica(model, config, seed));
            reporter.report(Progress::TaskIncrement);
            stats
        })
        .collect();

    reporter.report(Progress::TaskFinish);
    let replicas = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    let n = replicas.first().map_or(0, |r| r.occupancy.len());
    let count = replicas.len() as f64;
    let mut occupancy = vec![0.0; n];
    for stats in &replicas {
        for (total, p) in occupancy.iter_mut().zip(&stats.occupancy) {
            *total += p / count;
        }
    }
    let mean_electrons = replicas.iter().map(|r| r.mean_electrons).sum::<f64>() / count;

    reporter.report(Progress::PhaseFinish);
    info!(mean_electrons, "Ensemble complete.");
    Ok(EnsembleResult {
        occupancy,
        mean_electrons,
        replicas,
    })
}

fn run_replica(
    mut model: HoppingModel,
    config: &EnsembleConfig,
    seed: u64,
) -> Result<ReplicaStats, EngineError> {
    if !model.is_initialised() {
        return Err(EngineError::NotInitialised);
    }
    model.run(config.warmup)?;

    let n = model.site_count();
    let start = model.elapsed();
    let end = start + config.duration;
    let mut occupied_time = vec![0.0; n];
    let mut electron_time = 0.0;
    while model.elapsed() < end {
        let charge = model.charge().to_vec();
        let electrons = model.electron_count() as f64;
        let tick = model.step(end - model.elapsed())?;
        for (acc, &c) in occupied_time.iter_mut().zip(&charge) {
            *acc += c as f64 * tick;
        }
        electron_time += electrons * tick;
    }

    let span = model.elapsed() - start;
    debug!(seed, span, "Replica finished.");
    Ok(ReplicaStats {
        seed,
        occupancy: occupied_time.into_iter().map(|t| t / span).collect(),
        mean_electrons: electron_time / span,
    })
}
