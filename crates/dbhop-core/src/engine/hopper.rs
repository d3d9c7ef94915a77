use super::config::{ConfigError, HoppingConfig};
use super::error::EngineError;
use super::event::{Event, Transition};
use super::neighbors::NeighborTables;
use super::state::ChargeState;
use crate::core::channels::{Channel, ChannelKind};
use crate::core::lattice::{DbSite, distance_matrix};
use crate::core::physics::coulomb::coupling_matrix;
use crate::core::physics::rates::RateModel;
use crate::core::utils::sampling::{draw_lifetime, weighted_choice};
use nalgebra::{DMatrix, DVector, Point2, Vector2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, trace, warn};

/// Smallest time advance, guards against zero-length steps.
pub const MIN_TICK: f64 = 1e-16;

/// A feasible single hop from an occupied site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HopOption {
    pub target: usize,
    /// Energy change of the hop, eV.
    pub delta: f64,
    pub rate: f64,
}

/// A feasible cohop for one source pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohopOption {
    pub targets: (usize, usize),
    pub delta: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, Default)]
struct CohopRates {
    options: Vec<CohopOption>,
    tickrate: f64,
}

/// Kinetic Monte Carlo model of electrons hopping among dangling bonds.
///
/// Every competing process (each occupied site, each cohopping pair and each
/// charge-injecting channel) owns a residual lifetime drawn from a unit
/// exponential. Lifetimes are consumed at the process's current total rate,
/// and the first to reach zero fires. Rates are recomputed by [`Self::update`]
/// after every change of the charge state, so the lifetimes stay valid
/// across rate changes without being redrawn.
#[derive(Debug, Clone)]
pub struct HoppingModel {
    config: HoppingConfig,
    sites: Vec<DbSite>,
    positions: Vec<Point2<f64>>,
    distances: DMatrix<f64>,
    coupling: DMatrix<f64>,
    bias: DVector<f64>,
    transient_bias: DVector<f64>,
    rate_model: RateModel,
    channels: Vec<Channel>,
    neighbors: NeighborTables,
    rng: ChaCha8Rng,

    fixed_population: bool,
    target_nel: usize,
    initialised: bool,
    state: ChargeState,

    beff: DVector<f64>,
    hop_options: Vec<Vec<HopOption>>,
    exit_rates: Vec<f64>,
    tickrates: Vec<f64>,
    lifetimes: Vec<f64>,
    cohops: Vec<CohopRates>,
    cohop_lifetimes: Vec<f64>,

    elapsed: f64,
    last_transition: Option<Transition>,
}

impl HoppingModel {
    pub fn new(sites: &[DbSite], config: HoppingConfig) -> Result<Self, EngineError> {
        config.validate()?;
        if sites.is_empty() {
            return Err(ConfigError::EmptyGeometry.into());
        }
        let n = sites.len();
        let positions = config.lattice.positions(sites);
        let distances = distance_matrix(&positions);
        let coupling = coupling_matrix(&distances, &config.physics);
        let h = config.hopping;
        let neighbors = NeighborTables::build(
            &positions,
            &distances,
            h.hop_range,
            h.cohop_range,
            h.enable_cohop,
        );

        let (fixed_population, target_nel) = match h.electron_count {
            Some(count) if count > n => {
                return Err(EngineError::TooManyElectrons {
                    requested: count,
                    sites: n,
                });
            }
            Some(count) => (true, count),
            None => (false, Self::free_population(n, h.free_rho)),
        };

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let rate_model = RateModel::new(config.rate_model, config.rates);
        let cohop_count = neighbors.cohop_pairs().len();

        info!(
            sites = n,
            model = %config.rate_model,
            electrons = target_nel,
            fixed_population,
            "Created hopping model"
        );

        Ok(Self {
            sites: sites.to_vec(),
            positions,
            distances,
            coupling,
            bias: DVector::zeros(n),
            transient_bias: DVector::zeros(n),
            rate_model,
            channels: Vec::new(),
            neighbors,
            rng,
            fixed_population,
            target_nel,
            initialised: false,
            state: ChargeState::empty(n),
            beff: DVector::zeros(n),
            hop_options: vec![Vec::new(); n],
            exit_rates: vec![0.0; n],
            tickrates: vec![0.0; n],
            lifetimes: vec![f64::INFINITY; n],
            cohops: vec![CohopRates::default(); cohop_count],
            cohop_lifetimes: vec![f64::INFINITY; cohop_count],
            elapsed: 0.0,
            last_transition: None,
            config,
        })
    }

    fn free_population(n: usize, free_rho: f64) -> usize {
        ((n as f64 * free_rho).round() as usize).min(n)
    }

    // ---- channels -------------------------------------------------------

    /// Adds a channel and returns its index.
    pub fn add_channel(&mut self, mut channel: Channel) -> usize {
        debug!(kind = %channel.kind(), enabled = channel.is_enabled(), "Adding channel");
        if self.initialised {
            channel.setup(&self.positions, self.config.physics.kt(), &mut self.rng);
        }
        self.channels.push(channel);
        if self.initialised {
            self.update();
        }
        self.channels.len() - 1
    }

    /// Adds a default-parameter channel by name.
    pub fn add_channel_by_name(&mut self, name: &str, enabled: bool) -> Result<usize, EngineError> {
        let kind: ChannelKind = name.parse().map_err(ConfigError::from)?;
        let mut channel = Channel::new(kind);
        channel.set_enabled(enabled);
        Ok(self.add_channel(channel))
    }

    /// Removes the first channel of the given kind.
    pub fn remove_channel(&mut self, kind: ChannelKind) -> Option<Channel> {
        let index = self.channels.iter().position(|c| c.kind() == kind)?;
        let channel = self.channels.remove(index);
        debug!(%kind, "Removed channel");
        if self.initialised {
            self.update();
        }
        Some(channel)
    }

    pub fn get_channel(&self, kind: ChannelKind) -> Option<&Channel> {
        self.channels.iter().find(|c| c.kind() == kind)
    }

    /// Looks a channel up by its configuration name, e.g. `"tip"`.
    pub fn get_channel_by_name(&self, name: &str) -> Result<Option<&Channel>, EngineError> {
        let kind: ChannelKind = name.parse().map_err(ConfigError::from)?;
        Ok(self.get_channel(kind))
    }

    /// Applies `f` to the first channel of the given kind, then refreshes rates.
    pub fn configure_channel<R>(
        &mut self,
        kind: ChannelKind,
        f: impl FnOnce(&mut Channel) -> R,
    ) -> Option<R> {
        let channel = self.channels.iter_mut().find(|c| c.kind() == kind)?;
        let result = f(channel);
        if self.initialised {
            self.update();
        }
        Some(result)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    fn exchanges_charge(&self) -> bool {
        !self.channels.is_empty() && !self.fixed_population
    }

    // ---- population and bias ------------------------------------------

    /// Fixes the number of electrons, or restores automatic filling with `None`.
    pub fn fix_electron_count(&mut self, count: Option<usize>) -> Result<(), EngineError> {
        let n = self.site_count();
        match count {
            Some(c) if c > n => {
                return Err(EngineError::TooManyElectrons {
                    requested: c,
                    sites: n,
                });
            }
            Some(c) => {
                self.target_nel = c;
                self.fixed_population = true;
            }
            None => {
                self.target_nel = Self::free_population(n, self.config.hopping.free_rho);
                self.fixed_population = false;
            }
        }
        debug!(electrons = self.target_nel, fixed = self.fixed_population, "Set electron count");

        if self.initialised {
            let changed = self.state.set_nel(self.target_nel);
            for site in changed {
                if self.state.is_occupied(site) {
                    self.lifetimes[site] = draw_lifetime(&mut self.rng);
                }
                self.rebirth_cohops(site);
            }
            self.update();
        }
        Ok(())
    }

    /// Adds a linear potential of `field` eV/Å along `direction`.
    pub fn add_bias_gradient(&mut self, field: f64, direction: Vector2<f64>) {
        let gradient = self.gradient(field, direction);
        self.bias += gradient;
        if self.initialised {
            self.update();
        }
    }

    /// Replaces the static bias with a linear potential of `field` eV/Å along `direction`.
    pub fn set_bias_gradient(&mut self, field: f64, direction: Vector2<f64>) {
        self.bias = self.gradient(field, direction);
        if self.initialised {
            self.update();
        }
    }

    fn gradient(&self, field: f64, direction: Vector2<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.positions.len(),
            self.positions.iter().map(|p| field * direction.dot(&p.coords)),
        )
    }

    /// Adds (or with `add = false`, removes) the potential of a fixed
    /// electron at `position`, angstroms.
    pub fn add_charge(&mut self, position: Point2<f64>, add: bool) {
        let physics = self.config.physics;
        let potential = DVector::from_iterator(
            self.positions.len(),
            self.positions
                .iter()
                .map(|p| physics.screened_coulomb(nalgebra::distance(p, &position))),
        );
        if add {
            self.bias -= potential;
        } else {
            self.bias += potential;
        }
        if self.initialised {
            self.update();
        }
    }

    /// Applies a square bias pulse of `width` seconds to `site`, ending `dt`
    /// seconds from now.
    pub fn write_bias(&mut self, bias: f64, site: usize, dt: f64, width: f64) -> Result<(), EngineError> {
        self.check_site(site)?;
        self.run((dt - width).max(0.0))?;
        self.transient_bias[site] = bias;
        self.update();
        self.run(width)?;
        self.transient_bias[site] = 0.0;
        self.update();
        Ok(())
    }

    // ---- rate model tuning --------------------------------------------

    /// Rebuilds the finite-range tables and redraws every cohop lifetime.
    pub fn update_hop_ranges(&mut self, hop_range: Option<f64>, cohop_range: Option<f64>) {
        let h = &mut self.config.hopping;
        if let Some(r) = hop_range {
            h.hop_range = r;
        }
        if let Some(r) = cohop_range {
            h.cohop_range = r;
        }
        let h = self.config.hopping;
        self.neighbors = NeighborTables::build(
            &self.positions,
            &self.distances,
            h.hop_range,
            h.cohop_range,
            h.enable_cohop,
        );
        let pairs = self.neighbors.cohop_pairs().len();
        self.cohops = vec![CohopRates::default(); pairs];
        self.cohop_lifetimes = (0..pairs).map(|_| draw_lifetime(&mut self.rng)).collect();
        if self.initialised {
            self.update();
        }
    }

    pub fn set_rate_attenuation(&mut self, attenuation: f64) {
        self.rate_model.set_attenuation(attenuation);
        self.refresh_rates();
    }

    pub fn set_rate_prefactor(&mut self, prefactor: f64) {
        self.rate_model.set_prefactor(prefactor);
        self.refresh_rates();
    }

    pub fn set_reorganization_energy(&mut self, lambda: f64) {
        self.rate_model.set_reorganization_energy(lambda);
        self.refresh_rates();
    }

    pub fn set_lambda_offset(&mut self, offset: f64) {
        self.rate_model.set_lambda_offset(offset);
        self.refresh_rates();
    }

    fn refresh_rates(&mut self) {
        debug!(params = ?self.rate_model.params(), "Rate model retuned");
        if self.initialised {
            self.update();
        }
    }

    // ---- lifecycle ------------------------------------------------------

    /// Sets the starting occupation, random if `charges` is `None`, and
    /// primes every countdown.
    ///
    /// With a fixed electron count the explicit charges must hold exactly
    /// that many electrons; otherwise their count becomes the population.
    pub fn initialise(&mut self, charges: Option<&[u8]>) -> Result<(), EngineError> {
        let n = self.site_count();
        self.state = match charges {
            None => ChargeState::random(n, self.target_nel, &mut self.rng),
            Some(c) => {
                if c.len() != n {
                    return Err(EngineError::ChargeLengthMismatch {
                        expected: n,
                        found: c.len(),
                    });
                }
                let state = ChargeState::from_charges(c);
                if self.fixed_population && state.nel() != self.target_nel {
                    return Err(EngineError::ElectronCountMismatch {
                        expected: self.target_nel,
                        found: state.nel(),
                    });
                }
                self.target_nel = state.nel();
                state
            }
        };

        let kt = self.config.physics.kt();
        self.rate_model.setup(&self.distances, kt);
        for channel in &mut self.channels {
            channel.setup(&self.positions, kt, &mut self.rng);
        }

        self.lifetimes = (0..n).map(|_| draw_lifetime(&mut self.rng)).collect();
        self.cohop_lifetimes = (0..self.cohops.len())
            .map(|_| draw_lifetime(&mut self.rng))
            .collect();

        self.initialised = true;
        self.last_transition = None;
        self.update();

        if charges.is_none() {
            self.burn(self.config.hopping.burn_count * n)?;
        }
        self.elapsed = 0.0;

        info!(
            electrons = self.state.nel(),
            state = %self.state.signature(),
            "Initialised charge state"
        );
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Recomputes effective levels, channel rates, hop rates and cohop rates
    /// for the current charge state.
    pub fn update(&mut self) {
        if !self.initialised {
            return;
        }
        let occ = self.state.occupied().to_vec();
        let nocc = self.state.unoccupied().to_vec();
        let charge = DVector::from_iterator(
            self.site_count(),
            self.state.charge().iter().map(|&c| c as f64),
        );

        let base = &self.bias + &self.transient_bias - &self.coupling * charge;
        let mut beff = base.clone();
        for channel in self.channels.iter().filter(|c| c.is_enabled()) {
            beff += channel.biases(&occ) * channel.scale();
        }
        for channel in &mut self.channels {
            channel.update(&occ, &nocc, &beff);
        }
        self.beff = beff;

        let mut hop_options = vec![Vec::new(); self.site_count()];
        for &src in &occ {
            hop_options[src] = self
                .neighbors
                .hop_targets(src)
                .iter()
                .filter(|&&trg| !self.state.is_occupied(trg))
                .map(|&trg| {
                    let delta = self.hop_delta(&base, src, trg);
                    HopOption {
                        target: trg,
                        delta,
                        rate: self.rate_model.rate(delta, src, trg),
                    }
                })
                .collect();
        }

        let mut exit_rates = vec![0.0; self.site_count()];
        if self.exchanges_charge() {
            for channel in &self.channels {
                for (&src, rate) in occ.iter().zip(channel.exit_rates()) {
                    exit_rates[src] += rate;
                }
            }
        }

        let mut tickrates = vec![0.0; self.site_count()];
        for &src in &occ {
            tickrates[src] = hop_options[src].iter().map(|o| o.rate).sum::<f64>() + exit_rates[src];
        }

        let mut cohops = vec![CohopRates::default(); self.neighbors.cohop_pairs().len()];
        for (slot, pair) in cohops.iter_mut().zip(self.neighbors.cohop_pairs()) {
            let (i, j) = pair.sources;
            if hop_options[i].is_empty() || hop_options[j].is_empty() {
                continue;
            }
            slot.options = pair
                .targets
                .iter()
                .filter(|&&(k, l)| !self.state.is_occupied(k) && !self.state.is_occupied(l))
                .map(|&(k, l)| {
                    let v = &self.coupling;
                    let delta = self.hop_delta(&base, i, k)
                        + self.hop_delta(&base, j, l)
                        + v[(k, l)]
                        + v[(i, j)]
                        - v[(i, l)]
                        - v[(j, k)];
                    CohopOption {
                        targets: (k, l),
                        delta,
                        rate: self.rate_model.cohopping_rate(delta, (i, j), (k, l)),
                    }
                })
                .collect();
            slot.tickrate = slot.options.iter().map(|o| o.rate).sum();
        }

        self.hop_options = hop_options;
        self.exit_rates = exit_rates;
        self.tickrates = tickrates;
        self.cohops = cohops;
    }

    /// Energy change of moving the electron at `src` to the empty site `trg`,
    /// with `base` the static-plus-Coulomb levels of the current state.
    fn hop_delta(&self, base: &DVector<f64>, src: usize, trg: usize) -> f64 {
        // levels as seen with the hopping electron removed
        let src_level = base[src];
        let trg_level = base[trg] + self.coupling[(trg, src)];
        let channel_delta: f64 = self
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.scale() * c.compute_delta(src, trg))
            .sum();
        src_level - trg_level + channel_delta
    }

    // ---- event loop -----------------------------------------------------

    /// Time until the next event and the event itself, or `None` if no
    /// process has a non-zero rate.
    pub fn peek(&self) -> Option<(f64, Event)> {
        if !self.initialised {
            return None;
        }
        let mut best: Option<(f64, Event)> = None;
        let mut consider = |dt: f64, event: Event| {
            if dt.is_finite() && best.is_none_or(|(t, _)| dt < t) {
                best = Some((dt, event));
            }
        };

        for &src in self.state.occupied() {
            let rate = self.tickrates[src];
            if rate > 0.0 {
                consider(self.lifetimes[src] / rate, Event::Hop { source: src });
            }
        }
        for (pair, (slot, table)) in self
            .cohops
            .iter()
            .zip(self.neighbors.cohop_pairs())
            .enumerate()
        {
            if slot.tickrate > 0.0 {
                consider(
                    self.cohop_lifetimes[pair] / slot.tickrate,
                    Event::Cohop {
                        pair,
                        sources: table.sources,
                    },
                );
            }
        }
        if self.exchanges_charge() {
            for (index, channel) in self.channels.iter().enumerate() {
                if channel.is_enabled() {
                    consider(channel.peek(), Event::ChannelPop { channel: index });
                }
            }
        }
        best
    }

    /// Advances by the smaller of `max_dt`, the next event time and the next
    /// channel state change, applying the event if it falls within the step.
    /// Returns the time advanced.
    pub fn step(&mut self, max_dt: f64) -> Result<f64, EngineError> {
        if !self.initialised {
            return Err(EngineError::NotInitialised);
        }
        let next = self.peek();
        let dt_event = next.map_or(f64::INFINITY, |(dt, _)| dt);
        let dt_channel = self
            .channels
            .iter()
            .filter(|c| c.is_enabled())
            .map(Channel::tick)
            .fold(f64::INFINITY, f64::min);

        let bound = max_dt.min(dt_event).min(dt_channel);
        if bound.is_infinite() {
            return Err(EngineError::Stalled);
        }
        let tick = bound.max(MIN_TICK);
        self.advance(tick);

        if let Some((dt, event)) = next {
            if dt <= max_dt.min(dt_channel) + MIN_TICK {
                self.apply(event)?;
            }
        }
        self.update();
        Ok(tick)
    }

    /// Runs the dynamics for `dt` seconds.
    pub fn run(&mut self, dt: f64) -> Result<(), EngineError> {
        let mut remaining = dt;
        while remaining > 0.0 {
            remaining -= self.step(remaining)?;
        }
        Ok(())
    }

    /// Runs for up to `dt` seconds, checking `cancel` between steps.
    /// Returns the simulated time actually covered.
    pub fn run_interruptible(&mut self, dt: f64, cancel: &AtomicBool) -> Result<f64, EngineError> {
        let mut covered = 0.0;
        while covered < dt {
            if cancel.load(Ordering::Relaxed) {
                debug!(covered, "Run interrupted");
                break;
            }
            covered += self.step(dt - covered)?;
        }
        Ok(covered)
    }

    /// Runs for `dt` seconds, then reports whether `site` is occupied.
    pub fn measure(&mut self, site: usize, dt: f64) -> Result<bool, EngineError> {
        self.check_site(site)?;
        self.run(dt)?;
        Ok(self.state.is_occupied(site))
    }

    /// Burns through `events` events, stopping early if none can occur.
    pub fn burn(&mut self, events: usize) -> Result<(), EngineError> {
        if events > 0 {
            debug!(events, "Burning initial state");
        }
        for _ in 0..events {
            let Some((dt, _)) = self.peek() else {
                warn!("No events available, ending burn early");
                break;
            };
            self.run(dt)?;
        }
        Ok(())
    }

    fn advance(&mut self, dt: f64) {
        for &src in self.state.occupied() {
            self.lifetimes[src] -= dt * self.tickrates[src];
        }
        for channel in self.channels.iter_mut().filter(|c| c.is_enabled()) {
            channel.run(dt);
        }
        for (lifetime, slot) in self.cohop_lifetimes.iter_mut().zip(&self.cohops) {
            *lifetime -= dt * slot.tickrate;
        }
        self.elapsed += dt;
    }

    fn apply(&mut self, event: Event) -> Result<(), EngineError> {
        let transition = match event {
            Event::Hop { source } => {
                let mut weights: Vec<f64> = self.hop_options[source].iter().map(|o| o.rate).collect();
                if self.exchanges_charge() {
                    weights.push(self.exit_rates[source]);
                }
                let choice = weighted_choice(&weights, &mut self.rng)?;
                match self.hop_options[source].get(choice).map(|o| o.target) {
                    Some(target) => {
                        self.surface_hop(source, target);
                        Transition::Hop { source, target }
                    }
                    None => {
                        self.state.remove(source);
                        self.rebirth_cohops(source);
                        Transition::Exit { source }
                    }
                }
            }
            Event::Cohop { pair, sources } => {
                let options = &self.cohops[pair].options;
                let weights: Vec<f64> = options.iter().map(|o| o.rate).collect();
                let choice = weighted_choice(&weights, &mut self.rng)?;
                let (k, l) = options[choice].targets;
                self.surface_hop(sources.0, k);
                self.surface_hop(sources.1, l);
                Transition::Cohop {
                    sources,
                    targets: (k, l),
                }
            }
            Event::ChannelPop { channel } => {
                let index = self.channels[channel].pop(&mut self.rng)?;
                if self.state.nel() + index >= self.site_count() {
                    return Err(EngineError::Internal(format!(
                        "channel {channel} chose unoccupied slot {index} of {}",
                        self.site_count() - self.state.nel()
                    )));
                }
                let target = self.state.inject(index);
                self.lifetimes[target] = draw_lifetime(&mut self.rng);
                self.rebirth_cohops(target);
                Transition::Inject { channel, target }
            }
        };
        trace!(
            t = self.elapsed,
            ?transition,
            state = %self.state.signature(),
            "Applied event"
        );
        self.last_transition = Some(transition);
        Ok(())
    }

    fn surface_hop(&mut self, src: usize, trg: usize) {
        self.state.surface_hop(src, trg);
        self.lifetimes[trg] = draw_lifetime(&mut self.rng);
        self.rebirth_cohops(src);
    }

    fn rebirth_cohops(&mut self, site: usize) {
        for &pair in self.neighbors.pairs_touching(site) {
            self.cohop_lifetimes[pair] = draw_lifetime(&mut self.rng);
        }
    }

    // ---- observers ------------------------------------------------------

    fn check_site(&self, site: usize) -> Result<(), EngineError> {
        if site < self.site_count() {
            Ok(())
        } else {
            Err(EngineError::InvalidSite {
                index: site,
                sites: self.site_count(),
            })
        }
    }

    /// Direct electrostatic energy of the current configuration, eV.
    pub fn energy(&self) -> f64 {
        let occ = self.state.occupied();
        let charge = DVector::from_iterator(
            self.site_count(),
            self.state.charge().iter().map(|&c| c as f64),
        );
        let mut levels = &self.bias + &self.transient_bias - (&self.coupling * charge) * 0.5;
        for channel in self.channels.iter().filter(|c| self.initialised && c.is_enabled()) {
            levels += channel.biases(occ) * channel.scale();
        }
        -occ.iter().map(|&i| levels[i]).sum::<f64>()
    }

    /// Effective level of each feasible target as seen from the occupied `src`.
    pub fn levels(&self, src: usize) -> Result<Vec<(usize, f64)>, EngineError> {
        self.check_site(src)?;
        let level = self.beff[src];
        Ok(self.hop_options[src]
            .iter()
            .map(|o| (o.target, level - o.delta))
            .collect())
    }

    /// Expected remaining lifetime of the electron at `site`, s; zero if empty.
    pub fn lifetime(&self, site: usize) -> Result<f64, EngineError> {
        self.check_site(site)?;
        if !self.initialised || !self.state.is_occupied(site) {
            return Ok(0.0);
        }
        let rate = self.tickrates[site];
        Ok(if rate > 0.0 {
            self.lifetimes[site] / rate
        } else {
            f64::INFINITY
        })
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn sites(&self) -> &[DbSite] {
        &self.sites
    }

    /// Site positions, angstroms.
    pub fn positions(&self) -> &[Point2<f64>] {
        &self.positions
    }

    pub fn charge(&self) -> &[u8] {
        self.state.charge()
    }

    pub fn beff(&self) -> &DVector<f64> {
        &self.beff
    }

    pub fn bias(&self) -> &DVector<f64> {
        &self.bias
    }

    pub fn coupling(&self) -> &DMatrix<f64> {
        &self.coupling
    }

    pub fn electron_count(&self) -> usize {
        self.state.nel()
    }

    pub fn is_fixed_population(&self) -> bool {
        self.fixed_population
    }

    pub fn charge_state(&self) -> &ChargeState {
        &self.state
    }

    pub fn state_signature(&self) -> String {
        self.state.signature()
    }

    /// Simulated time since initialisation, s.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn last_transition(&self) -> Option<Transition> {
        self.last_transition
    }

    /// Feasible single hops from `site`; empty unless occupied.
    pub fn hop_options(&self, site: usize) -> Result<&[HopOption], EngineError> {
        self.check_site(site)?;
        Ok(&self.hop_options[site])
    }

    /// Total outgoing rate of the electron at `site`, channel exits included.
    pub fn tickrate(&self, site: usize) -> Result<f64, EngineError> {
        self.check_site(site)?;
        Ok(self.tickrates[site])
    }

    /// Source pair and feasible cohops of every cohopping pair with a non-zero rate.
    pub fn cohop_options(&self) -> impl Iterator<Item = ((usize, usize), &[CohopOption], f64)> {
        self.cohops
            .iter()
            .zip(self.neighbors.cohop_pairs())
            .filter(|(slot, _)| !slot.options.is_empty())
            .map(|(slot, pair)| (pair.sources, slot.options.as_slice(), slot.tickrate))
    }

    pub fn config(&self) -> &HoppingConfig {
        &self.config
    }

    pub fn rate_model(&self) -> &RateModel {
        &self.rate_model
    }
}
