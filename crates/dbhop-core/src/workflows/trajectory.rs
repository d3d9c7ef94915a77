use crate::core::channels::ChannelKind;
use crate::engine::HoppingModel;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::event::Transition;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TrajectoryConfig {
    /// Total simulated time, s.
    pub duration: f64,
    /// Simulated time between snapshots, s.
    pub interval: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            duration: 10.0,
            interval: 0.1,
        }
    }
}

impl TrajectoryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duration >= 0.0 && self.duration.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "trajectory.duration",
                reason: format!("must be non-negative and finite, got {}", self.duration),
            });
        }
        if !(self.interval > 0.0 && self.interval.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "trajectory.interval",
                reason: format!("must be positive and finite, got {}", self.interval),
            });
        }
        Ok(())
    }

    /// Number of snapshots recorded, including the one at time zero.
    pub fn snapshot_count(&self) -> usize {
        (self.duration / self.interval + 1e-9).floor() as usize + 1
    }
}

/// Tip position and height, nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TipState {
    pub x: f64,
    pub y: f64,
    pub height: f64,
}

/// Observable state of the model at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub time: f64,
    pub electrons: usize,
    pub energy: f64,
    pub signature: String,
    pub charge: Vec<u8>,
    pub beff: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip: Option<TipState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<Transition>,
}

impl Snapshot {
    pub fn capture(model: &HoppingModel) -> Self {
        let tip = model
            .get_channel(ChannelKind::Tip)
            .and_then(|c| c.as_tip())
            .map(|tip| {
                let p = tip.position();
                TipState {
                    x: p.x,
                    y: p.y,
                    height: tip.height(),
                }
            });
        Self {
            time: model.elapsed(),
            electrons: model.electron_count(),
            energy: model.energy(),
            signature: model.state_signature(),
            charge: model.charge().to_vec(),
            beff: model.beff().iter().copied().collect(),
            tip,
            last_transition: model.last_transition(),
        }
    }
}

/// Fixed geometry shared by every snapshot of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectoryHeader {
    /// Site positions, angstroms.
    pub positions: Vec<[f64; 2]>,
    pub rate_model: String,
    pub temperature: f64,
}

impl TrajectoryHeader {
    pub fn describe(model: &HoppingModel) -> Self {
        Self {
            positions: model.positions().iter().map(|p| [p.x, p.y]).collect(),
            rate_model: model.rate_model().kind().to_string(),
            temperature: model.config().physics.temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    pub header: TrajectoryHeader,
    pub snapshots: Vec<Snapshot>,
}

/// Runs an initialised model for `config.duration`, handing a snapshot to
/// `sink` every `config.interval` and once at the start.
#[instrument(skip_all, name = "trajectory_workflow", fields(duration = config.duration, interval = config.interval))]
pub fn record_into<E, F>(
    model: &mut HoppingModel,
    config: &TrajectoryConfig,
    reporter: &ProgressReporter,
    mut sink: F,
) -> Result<usize, E>
where
    E: From<EngineError>,
    F: FnMut(Snapshot) -> Result<(), E>,
{
    config.validate().map_err(EngineError::from)?;
    if !model.is_initialised() {
        return Err(EngineError::NotInitialised.into());
    }

    let count = config.snapshot_count();
    info!(snapshots = count, "Recording trajectory.");
    reporter.report(Progress::PhaseStart { name: "Trajectory" });
    reporter.report(Progress::TaskStart {
        total_steps: count as u64,
    });

    for k in 0..count {
        if k > 0 {
            model.run(config.interval)?;
        }
        sink(Snapshot::capture(model))?;
        reporter.report(Progress::TaskIncrement);
        reporter.report(Progress::Status {
            elapsed: model.elapsed(),
            electrons: model.electron_count(),
        });
    }

    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);
    info!(elapsed = model.elapsed(), "Trajectory complete.");
    Ok(count)
}

/// Collects a trajectory in memory.
pub fn record(
    model: &mut HoppingModel,
    config: &TrajectoryConfig,
    reporter: &ProgressReporter,
) -> Result<Trajectory, EngineError> {
    let header = TrajectoryHeader::describe(model);
    let mut snapshots = Vec::with_capacity(config.snapshot_count());
    record_into(model, config, reporter, |snapshot| {
        snapshots.push(snapshot);
        Ok::<(), EngineError>(())
    })?;
    Ok(Trajectory { header, snapshots })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::channels::Channel;
    use crate::core::lattice::DbSite;
    use crate::engine::config::HoppingConfig;
    use std::sync::{Arc, Mutex};

    fn model(cols: &[i64], electrons: usize) -> HoppingModel {
        let sites: Vec<DbSite> = cols.iter().map(|&c| DbSite::from(c)).collect();
        let config = HoppingConfig::builder()
            .seed(5)
            .electron_count(electrons)
            .build()
            .unwrap();
        HoppingModel::new(&sites, config).unwrap()
    }

    #[test]
    fn snapshots_are_taken_at_fixed_intervals() {
        let mut m = model(&[0, 3, 6], 1);
        m.initialise(None).unwrap();
        let config = TrajectoryConfig {
            duration: 1.0,
            interval: 0.25,
        };
        let trajectory = record(&mut m, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(trajectory.snapshots.len(), 5);
        for (k, snapshot) in trajectory.snapshots.iter().enumerate() {
            assert!((snapshot.time - 0.25 * k as f64).abs() < 1e-9);
            assert_eq!(snapshot.electrons, 1);
            assert_eq!(snapshot.charge.len(), 3);
            assert!(snapshot.tip.is_none());
        }
        assert_eq!(trajectory.header.positions.len(), 3);
    }

    #[test]
    fn snapshot_reports_tip_state_when_present() {
        let mut m = model(&[0, 3], 1);
        m.add_channel(Channel::new(ChannelKind::Tip));
        m.initialise(None).unwrap();
        let snapshot = Snapshot::capture(&m);
        let tip = snapshot.tip.unwrap();
        assert!(tip.height > 0.0);
    }

    #[test]
    fn snapshot_serialises_transition_kind() {
        let mut m = model(&[0, 3], 1);
        m.initialise(Some(&[1, 0])).unwrap();
        m.step(f64::INFINITY).unwrap();
        let json = serde_json::to_value(Snapshot::capture(&m)).unwrap();
        assert_eq!(json["last_transition"]["kind"], "hop");
        assert_eq!(json["signature"], "0x1");
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let mut m = model(&[0, 3], 1);
        m.initialise(None).unwrap();
        let config = TrajectoryConfig {
            duration: 1.0,
            interval: 0.0,
        };
        assert!(matches!(
            record(&mut m, &config, &ProgressReporter::new()),
            Err(EngineError::Config(ConfigError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn progress_is_reported_per_snapshot() {
        let mut m = model(&[0, 3], 1);
        m.initialise(None).unwrap();
        let increments = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&increments);
        let reporter = ProgressReporter::with_callback(Box::new(move |event| {
            if let Progress::TaskIncrement = event {
                *counter.lock().unwrap() += 1;
            }
        }));
        let config = TrajectoryConfig {
            duration: 0.5,
            interval: 0.1,
        };
        let count = record_into(&mut m, &config, &reporter, |_| Ok::<(), EngineError>(())).unwrap();
        assert_eq!(count, 6);
        assert_eq!(*increments.lock().unwrap(), 6);
    }
}
