//! # Channels
//!
//! Reservoirs that exchange charge with the surface or perturb its local
//! potential: the passive [`bulk`], a biased scanning-probe [`tip`], and a
//! time-varying [`clock`] field.
//!
//! Every channel exposes the same capability set through [`Channel`]:
//!
//! - `setup` binds the channel to the site geometry and thermal energy
//! - `tick` reports the time until the channel's own internal state changes
//! - `run` advances the internal clock and the injection countdown
//! - `update` recomputes exit/entry rates for the current occupation
//! - `exit_rates` per occupied site, the rate of leaving onto this channel
//! - `biases` the potential shift induced on every site
//! - `peek` / `pop` time until, and target of, the next injected charge

pub mod bulk;
pub mod clock;
pub mod tip;

use crate::core::utils::sampling::{SamplingError, draw_lifetime, weighted_choice};
use nalgebra::{DVector, Point2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use bulk::{Bulk, BulkParams};
pub use clock::{Clock, ClockParams};
pub use tip::{Tip, TipParams};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Invalid channel type '{0}'. Choose from [bulk, tip, clock]")]
    UnknownChannel(String),

    #[error("Invalid scan path: {0}")]
    InvalidScan(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Bulk,
    Tip,
    Clock,
}

impl FromStr for ChannelKind {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bulk" => Ok(Self::Bulk),
            "tip" => Ok(Self::Tip),
            "clock" => Ok(Self::Clock),
            _ => Err(ChannelError::UnknownChannel(s.to_string())),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bulk => write!(f, "bulk"),
            Self::Tip => write!(f, "tip"),
            Self::Clock => write!(f, "clock"),
        }
    }
}

/// State shared by every channel variant.
#[derive(Debug, Clone)]
pub(crate) struct ChannelCore {
    pub enabled: bool,
    pub scale: f64,
    pub kt: f64,
    /// Remaining integrated hazard before the next injection.
    pub lifetime: f64,
    /// Total injection rate, the sum of `entry_rates`.
    pub tickrate: f64,
    pub sites: Vec<Point2<f64>>,
    pub occ: Vec<usize>,
    pub nocc: Vec<usize>,
    /// Rates from each occupied site onto the channel.
    pub exit_rates: Vec<f64>,
    /// Rates from the channel onto each unoccupied site.
    pub entry_rates: Vec<f64>,
}

impl ChannelCore {
    pub fn new(scale: f64) -> Self {
        Self {
            enabled: true,
            scale,
            kt: 1.0,
            lifetime: f64::INFINITY,
            tickrate: 0.0,
            sites: Vec::new(),
            occ: Vec::new(),
            nocc: Vec::new(),
            exit_rates: Vec::new(),
            entry_rates: Vec::new(),
        }
    }

    fn setup(&mut self, sites: Vec<Point2<f64>>, kt: f64, source_drain: bool, rng: &mut impl Rng) {
        self.kt = kt;
        self.sites = sites;
        self.lifetime = if source_drain {
            draw_lifetime(rng)
        } else {
            f64::INFINITY
        };
        self.tickrate = 0.0;
    }

    fn store_occupation(&mut self, occ: &[usize], nocc: &[usize]) {
        self.occ.clear();
        self.occ.extend_from_slice(occ);
        self.nocc.clear();
        self.nocc.extend_from_slice(nocc);
    }

    fn peek(&self, source_drain: bool) -> f64 {
        if source_drain && self.enabled && self.tickrate > 0.0 {
            self.lifetime / self.tickrate
        } else {
            f64::INFINITY
        }
    }

    fn run(&mut self, dt: f64, source_drain: bool) {
        if source_drain && self.enabled {
            self.lifetime -= dt * self.tickrate;
        }
    }

    fn pop(&mut self, rng: &mut impl Rng) -> Result<usize, SamplingError> {
        let index = weighted_choice(&self.entry_rates, rng)?;
        self.lifetime = draw_lifetime(rng);
        Ok(index)
    }
}

/// Logistic occupation factor `1 / (1 + exp(alpha·x/kt))`, safe for any `x`.
#[inline]
pub(crate) fn sigmoid(x: f64, alpha: f64, kt: f64) -> f64 {
    let z = alpha * x / kt;
    if z >= 0.0 {
        let e = (-z).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + z.exp())
    }
}

/// A charge reservoir or field coupled to the surface.
#[derive(Debug, Clone)]
pub enum Channel {
    Bulk(Bulk),
    Tip(Tip),
    Clock(Clock),
}

impl Channel {
    /// Creates a channel of the given kind with default parameters.
    pub fn new(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Bulk => Self::Bulk(Bulk::default()),
            ChannelKind::Tip => Self::Tip(Tip::default()),
            ChannelKind::Clock => Self::Clock(Clock::default()),
        }
    }

    fn core(&self) -> &ChannelCore {
        match self {
            Self::Bulk(c) => &c.core,
            Self::Tip(c) => &c.core,
            Self::Clock(c) => &c.core,
        }
    }

    fn core_mut(&mut self) -> &mut ChannelCore {
        match self {
            Self::Bulk(c) => &mut c.core,
            Self::Tip(c) => &mut c.core,
            Self::Clock(c) => &mut c.core,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Bulk(_) => ChannelKind::Bulk,
            Self::Tip(_) => ChannelKind::Tip,
            Self::Clock(_) => ChannelKind::Clock,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.core().enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.core_mut().enabled = enabled;
    }

    pub fn toggle(&mut self) {
        let core = self.core_mut();
        core.enabled = !core.enabled;
    }

    /// Attenuation applied to this channel's energy and bias contributions.
    pub fn scale(&self) -> f64 {
        self.core().scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.core_mut().scale = scale;
    }

    /// True if the induced bias depends on the occupation state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Tip(_))
    }

    /// True if the channel exchanges charge with the surface.
    pub fn is_source_drain(&self) -> bool {
        !matches!(self, Self::Clock(_))
    }

    /// Binds the channel to the site positions (angstroms) and thermal energy (eV).
    pub fn setup(&mut self, sites: &[Point2<f64>], kt: f64, rng: &mut impl Rng) {
        let source_drain = self.is_source_drain();
        match self {
            Self::Bulk(c) => c.core.setup(sites.to_vec(), kt, source_drain, rng),
            Self::Tip(c) => c.setup(sites, kt, rng),
            Self::Clock(c) => c.setup(sites, kt, rng),
        }
    }

    /// Time until the channel's internal state next changes.
    pub fn tick(&self) -> f64 {
        match self {
            Self::Bulk(_) => f64::INFINITY,
            Self::Tip(c) => c.tick(),
            Self::Clock(c) => c.tick(),
        }
    }

    pub fn run(&mut self, dt: f64) {
        let source_drain = self.is_source_drain();
        self.core_mut().run(dt, source_drain);
        match self {
            Self::Bulk(_) => {}
            Self::Tip(c) => c.advance(dt),
            Self::Clock(c) => c.advance(dt),
        }
    }

    /// Recomputes rates for the given occupied/unoccupied split and local levels.
    pub fn update(&mut self, occ: &[usize], nocc: &[usize], beff: &DVector<f64>) {
        match self {
            Self::Bulk(c) => c.update(occ, nocc, beff),
            Self::Tip(c) => c.update(occ, nocc, beff),
            Self::Clock(c) => c.update(occ, nocc),
        }
    }

    /// Rate of leaving onto this channel for each occupied site.
    pub fn exit_rates(&self) -> Vec<f64> {
        let core = self.core();
        if core.enabled {
            core.exit_rates.clone()
        } else {
            vec![0.0; core.occ.len()]
        }
    }

    /// Rate of injection onto each unoccupied site.
    pub fn entry_rates(&self) -> &[f64] {
        &self.core().entry_rates
    }

    /// Potential shift induced on every site for the given occupation.
    pub fn biases(&self, occ: &[usize]) -> DVector<f64> {
        let n = self.core().sites.len();
        if !self.is_enabled() {
            return DVector::zeros(n);
        }
        match self {
            Self::Bulk(_) => DVector::zeros(n),
            Self::Tip(c) => c.level_shifts(occ),
            Self::Clock(c) => c.bias().clone(),
        }
    }

    /// Extra energy delta of a hop from occupied `n` to unoccupied `m`.
    pub fn compute_delta(&self, n: usize, m: usize) -> f64 {
        match self {
            Self::Tip(c) if c.core.enabled => c.compute_delta(n, m),
            _ => 0.0,
        }
    }

    /// Time until the next charge hops from this channel onto the surface.
    pub fn peek(&self) -> f64 {
        self.core().peek(self.is_source_drain())
    }

    /// Chooses the unoccupied site receiving the next injected charge, as an
    /// index into the unoccupied list passed to the last `update`.
    pub fn pop(&mut self, rng: &mut impl Rng) -> Result<usize, SamplingError> {
        self.core_mut().pop(rng)
    }

    pub fn as_bulk_mut(&mut self) -> Option<&mut Bulk> {
        match self {
            Self::Bulk(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tip(&self) -> Option<&Tip> {
        match self {
            Self::Tip(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tip_mut(&mut self) -> Option<&mut Tip> {
        match self {
            Self::Tip(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_clock_mut(&mut self) -> Option<&mut Clock> {
        match self {
            Self::Clock(c) => Some(c),
            _ => None,
        }
    }
}
