use crate::engine::HoppingModel;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Lattice spacing along a dimer row, angstroms; sets the default padding.
const DEFAULT_COLUMN: f64 = 3.84;

/// Which passes of the tip write a bias pulse and which read the charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScanType {
    /// Read on both the rightward and the leftward pass.
    #[default]
    #[serde(rename = "rr")]
    ReadRead,
    /// Write on the rightward pass, read on the leftward pass.
    #[serde(rename = "wr")]
    WriteRead,
    /// Write on the leftward pass, read on the rightward pass.
    #[serde(rename = "rw")]
    ReadWrite,
}

impl FromStr for ScanType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rr" | "read-read" => Ok(Self::ReadRead),
            "wr" | "write-read" => Ok(Self::WriteRead),
            "rw" | "read-write" => Ok(Self::ReadWrite),
            _ => Err(ConfigError::InvalidParameter {
                name: "scan.scan-type",
                reason: format!("unknown scan type '{s}', choose from [rr, wr, rw]"),
            }),
        }
    }
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadRead => write!(f, "rr"),
            Self::WriteRead => write!(f, "wr"),
            Self::ReadWrite => write!(f, "rw"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LineScanConfig {
    /// Lateral tip speed, angstroms per second.
    pub scan_rate: f64,
    /// Distance the tip travels beyond the outermost sites, angstroms, (left, right).
    pub padding: (f64, f64),
    /// Bias applied under the tip while writing, eV.
    pub write_bias: f64,
    /// Lateral width of the write pulse, angstroms.
    pub write_width: f64,
    /// Number of recorded scan lines.
    pub scans: usize,
    pub scan_type: ScanType,
}

impl Default for LineScanConfig {
    fn default() -> Self {
        Self {
            scan_rate: 82.0,
            padding: (2.0 * DEFAULT_COLUMN, 2.0 * DEFAULT_COLUMN),
            write_bias: 0.01,
            write_width: 2.0,
            scans: 10,
            scan_type: ScanType::ReadRead,
        }
    }
}

impl LineScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.scan_rate > 0.0 && self.scan_rate.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                name: "scan.scan-rate",
                reason: format!("must be positive and finite, got {}", self.scan_rate),
            });
        }
        if self.padding.0 < 0.0 || self.padding.1 < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "scan.padding",
                reason: format!("must be non-negative, got {:?}", self.padding),
            });
        }
        if self.write_width < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "scan.write-width",
                reason: format!("must be non-negative, got {}", self.write_width),
            });
        }
        Ok(())
    }
}

/// One stop of the tip over a site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanStep {
    /// Index of the site in x-sorted order.
    pub index: usize,
    /// Travel time from the previous stop, s.
    pub dt: f64,
    /// Scan line this stop belongs to.
    pub line: usize,
    pub write: bool,
}

/// The sequence of tip stops for a line scan over sites at sorted positions `xs`.
///
/// The tip sweeps back and forth across the line, overshooting by the
/// padding at each end before turning around.
#[derive(Debug, Clone)]
pub struct ScanSequence<'a> {
    xs: &'a [f64],
    config: LineScanConfig,
    index: usize,
    direction: isize,
    current_x: f64,
    line: usize,
}

impl<'a> ScanSequence<'a> {
    pub fn new(xs: &'a [f64], config: LineScanConfig) -> Self {
        let (pad_left, pad_right) = config.padding;
        let (index, direction, current_x) = match (config.scan_type, xs.last()) {
            (ScanType::ReadWrite, Some(&last)) => (xs.len() - 1, -1, last + 2.0 * pad_right),
            _ => (0, 1, xs.first().map_or(0.0, |&x| x - pad_left)),
        };
        Self {
            xs,
            config,
            index,
            direction,
            current_x,
            line: 0,
        }
    }

    fn writes(&self) -> bool {
        match self.config.scan_type {
            ScanType::ReadRead => false,
            ScanType::WriteRead => self.direction > 0,
            ScanType::ReadWrite => self.direction < 0,
        }
    }
}

impl Iterator for ScanSequence<'_> {
    type Item = ScanStep;

    fn next(&mut self) -> Option<ScanStep> {
        if self.xs.is_empty() || self.line >= self.config.scans {
            return None;
        }
        let x = self.xs[self.index];
        let step = ScanStep {
            index: self.index,
            dt: (x - self.current_x).abs() / self.config.scan_rate,
            line: self.line,
            write: self.writes(),
        };
        self.current_x = x;

        let n = self.xs.len() as isize;
        let next = self.index as isize + self.direction;
        let (pad_left, pad_right) = self.config.padding;
        if next >= n {
            if self.config.scan_type != ScanType::WriteRead {
                self.line += 1;
            }
            self.direction = -1;
            self.index = self.xs.len() - 1;
            self.current_x = self.xs[self.index] + 2.0 * pad_right;
        } else if next < 0 {
            if self.config.scan_type != ScanType::ReadWrite {
                self.line += 1;
            }
            self.direction = 1;
            self.index = 0;
            self.current_x = self.xs[0] - 2.0 * pad_left;
        } else {
            self.index = next as usize;
        }
        Some(step)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineScanResult {
    /// Measured charges, one row per scan line, columns in x order.
    pub charges: Vec<Vec<u8>>,
    /// Site index of each column.
    pub order: Vec<usize>,
    /// x position of each column, angstroms.
    pub xs: Vec<f64>,
}

/// Sweeps a tip along the sites in x order, writing and reading charges
/// according to the scan type. The model must be initialised.
#[instrument(skip_all, name = "line_scan_workflow", fields(scan_type = %config.scan_type, scans = config.scans))]
pub fn run(
    model: &mut HoppingModel,
    config: &LineScanConfig,
    reporter: &ProgressReporter,
) -> Result<LineScanResult, EngineError> {
    config.validate()?;
    if !model.is_initialised() {
        return Err(EngineError::NotInitialised);
    }

    let positions = model.positions();
    let mut order: Vec<usize> = (0..positions.len()).collect();
    order.sort_by(|&a, &b| positions[a].x.total_cmp(&positions[b].x));
    let xs: Vec<f64> = order.iter().map(|&i| positions[i].x).collect();

    info!(sites = xs.len(), "Starting line scan.");
    reporter.report(Progress::PhaseStart { name: "Line scan" });
    reporter.report(Progress::TaskStart {
        total_steps: config.scans as u64,
    });

    let pulse = config.write_width / config.scan_rate;
    let mut charges = vec![vec![0u8; xs.len()]; config.scans];
    let mut line = 0;
    for step in ScanSequence::new(&xs, *config) {
        if step.line != line {
            line = step.line;
            reporter.report(Progress::TaskIncrement);
        }
        let site = order[step.index];
        if step.write {
            model.write_bias(config.write_bias, site, step.dt, pulse)?;
        } else {
            let occupied = model.measure(site, step.dt)?;
            charges[step.line][step.index] = occupied as u8;
        }
    }
    if config.scans > 0 {
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    debug!(elapsed = model.elapsed(), "Line scan finished.");
    Ok(LineScanResult { charges, order, xs })
}
