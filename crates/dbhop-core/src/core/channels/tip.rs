use super::{ChannelCore, ChannelError, sigmoid};
use crate::core::utils::sampling::draw_lifetime;
use nalgebra::{DVector, Point2, Vector2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const EPSILON_0: f64 = 8.854e-12; // F/m
const ELEMENTARY_CHARGE: f64 = 1.602e-19; // C
const ANGSTROM_TO_NM: f64 = 0.1;

/// Parameters of the scanning-probe tip. Lengths are in nanometres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TipParams {
    /// Dielectric constant between tip and surface.
    pub epsilon_r: f64,
    /// Height difference between neutral and charged sites from lattice relaxation.
    pub relaxation_height: f64,
    /// Tip radius for image-charge induced band bending.
    pub image_radius: f64,
    /// Tip radius for tip-induced band bending.
    pub bending_radius: f64,
    /// Tip-surface separation.
    pub height: f64,
    /// Tip-sample work-function difference, eV.
    pub work_function_delta: f64,
    /// Fraction of the work-function difference dropped across the surface.
    pub screening: f64,
    /// Tunnelling rate prefactor, Hz.
    pub tunnelling_prefactor: f64,
    /// Spatial decay of the tunnelling rate, 1/nm.
    pub tunnelling_decay: f64,
    /// Chemical potential, eV.
    pub mu: f64,
    /// Self-trapping energy, eV.
    pub lambda: f64,
    pub alpha: f64,
    /// Scan rate, nm/s.
    pub scan_rate: f64,
    /// Travel distance between internal state changes while scanning.
    pub step: f64,
    pub scale: f64,
    pub enabled: bool,
}

impl Default for TipParams {
    fn default() -> Self {
        Self {
            epsilon_r: 9.0,
            relaxation_height: 0.038,
            image_radius: 5.0,
            bending_radius: 50.0,
            height: 0.2,
            work_function_delta: 0.65,
            screening: 0.3,
            tunnelling_prefactor: 1e-9,
            tunnelling_decay: 6.28,
            mu: 0.1,
            lambda: 0.1,
            alpha: 1.0,
            scan_rate: 10.0,
            step: 0.1,
            scale: 0.0,
            enabled: true,
        }
    }
}

/// Biased scanning-probe tip.
///
/// The tip shifts site levels through two contributions: a static
/// tip-induced band bending (TIBB) that depends only on the lateral
/// distance to the apex, and an image-charge induced band bending (ICIBB)
/// built from the image of every occupied site in a sphere of radius
/// `image_radius`. The latter depends on the occupation, so the tip is an
/// active channel.
///
/// The tip walks a waypoint path at a constant scan rate, optionally
/// looping back to the first waypoint after the last.
#[derive(Debug, Clone)]
pub struct Tip {
    pub(crate) core: ChannelCore,
    params: TipParams,
    /// Site positions, nm.
    sites: Vec<Point2<f64>>,
    position: Point2<f64>,
    path: VecDeque<Point2<f64>>,
    looping: bool,
    velocity: Vector2<f64>,
    time_to_target: f64,
    /// Lateral site-apex separations.
    lateral: DVector<f64>,
    tibb: DVector<f64>,
    base_rates: DVector<f64>,
    current_shifts: DVector<f64>,
}

impl Default for Tip {
    fn default() -> Self {
        Self::new(TipParams::default())
    }
}

impl Tip {
    pub fn new(params: TipParams) -> Self {
        let mut core = ChannelCore::new(params.scale);
        core.enabled = params.enabled;
        Self {
            core,
            params,
            sites: Vec::new(),
            position: Point2::origin(),
            path: VecDeque::new(),
            looping: false,
            velocity: Vector2::zeros(),
            time_to_target: 0.0,
            lateral: DVector::zeros(0),
            tibb: DVector::zeros(0),
            base_rates: DVector::zeros(0),
            current_shifts: DVector::zeros(0),
        }
    }

    pub fn params(&self) -> &TipParams {
        &self.params
    }

    /// Coulomb strength, eV·nm.
    fn coulomb_strength() -> f64 {
        1e9 * ELEMENTARY_CHARGE / (4.0 * std::f64::consts::PI * EPSILON_0)
    }

    pub(super) fn setup(&mut self, sites: &[Point2<f64>], kt: f64, rng: &mut impl Rng) {
        self.core.kt = kt;
        self.core.sites = sites.to_vec();
        self.core.lifetime = draw_lifetime(rng);
        self.core.tickrate = 0.0;
        self.sites = sites
            .iter()
            .map(|p| Point2::new(p.x * ANGSTROM_TO_NM, p.y * ANGSTROM_TO_NM))
            .collect();
        self.set_position(self.position);
    }

    /// Apex position, nm.
    pub fn position(&self) -> Point2<f64> {
        self.position
    }

    pub fn height(&self) -> f64 {
        self.params.height
    }

    /// Remaining waypoints, in visiting order.
    pub fn path(&self) -> impl Iterator<Item = &Point2<f64>> {
        self.path.iter()
    }

    pub fn is_scanning(&self) -> bool {
        !self.path.is_empty()
    }

    /// Moves the apex immediately.
    pub fn set_position(&mut self, position: Point2<f64>) {
        self.position = position;
        self.lateral = DVector::from_iterator(
            self.sites.len(),
            self.sites.iter().map(|s| nalgebra::distance(s, &position)),
        );
        self.refresh_tibb();
    }

    /// Sets a single waypoint to travel to at `rate` (nm/s, current rate if `None`).
    pub fn set_target(&mut self, target: Point2<f64>, rate: Option<f64>) -> Result<(), ChannelError> {
        self.set_scan(&[target], rate, false)
    }

    /// Defines the scan path. Looping only applies to paths of two or more points.
    pub fn set_scan(
        &mut self,
        path: &[Point2<f64>],
        rate: Option<f64>,
        looping: bool,
    ) -> Result<(), ChannelError> {
        let Some(&first) = path.first() else {
            return Err(ChannelError::InvalidScan("path has no waypoints".to_string()));
        };
        if let Some(rate) = rate {
            if !(rate > 0.0 && rate.is_finite()) {
                return Err(ChannelError::InvalidScan(format!(
                    "scan rate must be positive, got {rate}"
                )));
            }
            self.params.scan_rate = rate;
        }
        let looping = looping && path.len() > 1;
        if looping {
            let closed_length: f64 = path
                .iter()
                .zip(path.iter().cycle().skip(1))
                .map(|(a, b)| nalgebra::distance(a, b))
                .sum();
            if closed_length == 0.0 {
                return Err(ChannelError::InvalidScan(
                    "looping path has zero length".to_string(),
                ));
            }
        }
        self.path = path.iter().copied().collect();
        self.looping = looping;
        self.aim_at(first);
        Ok(())
    }

    pub fn set_height(&mut self, height: f64) {
        self.params.height = height;
        self.refresh_tibb();
    }

    /// Updates the band-bending and/or image-charge tip radii, nm.
    pub fn set_radius(&mut self, bending: Option<f64>, image: Option<f64>) {
        if let Some(r) = bending {
            self.params.bending_radius = r;
        }
        if let Some(r) = image {
            self.params.image_radius = r;
        }
        self.refresh_tibb();
    }

    pub(super) fn tick(&self) -> f64 {
        if self.core.enabled && !self.path.is_empty() {
            self.params.step / self.params.scan_rate
        } else {
            f64::INFINITY
        }
    }

    pub(super) fn advance(&mut self, mut dt: f64) {
        while dt > 0.0 && self.core.enabled {
            let Some(&target) = self.path.front() else {
                break;
            };
            if dt < self.time_to_target {
                let next = self.position + self.velocity * dt;
                self.set_position(next);
                self.time_to_target -= dt;
                dt = 0.0;
            } else {
                self.path.pop_front();
                self.set_position(target);
                dt -= self.time_to_target;
                if self.looping {
                    self.path.push_back(target);
                }
                if let Some(&next) = self.path.front() {
                    self.aim_at(next);
                } else {
                    self.time_to_target = 0.0;
                    self.velocity = Vector2::zeros();
                }
            }
        }
    }

    pub(super) fn update(&mut self, occ: &[usize], nocc: &[usize], beff: &DVector<f64>) {
        let p = self.params;
        let kt = self.core.kt;
        let reach = (p.image_radius + p.height).powi(2);
        self.base_rates = self.lateral.map(|r| {
            p.tunnelling_prefactor
                * (-p.tunnelling_decay * ((r * r + reach).sqrt() - p.image_radius)).exp()
        });

        self.core.store_occupation(occ, nocc);
        self.core.exit_rates = occ
            .iter()
            .map(|&i| self.base_rates[i] * sigmoid(beff[i] + p.mu + p.lambda, p.alpha, kt))
            .collect();
        self.core.entry_rates = nocc
            .iter()
            .map(|&i| self.base_rates[i] * sigmoid(-(beff[i] + p.mu), p.alpha, kt))
            .collect();
        self.core.tickrate = self.core.entry_rates.iter().sum();
        self.current_shifts = self.level_shifts(occ);
    }

    /// Tip-induced level shift at every site when `occ` are occupied, eV.
    pub fn level_shifts(&self, occ: &[usize]) -> DVector<f64> {
        let p = &self.params;
        let n = self.sites.len();
        let mut occupied = vec![false; n];
        for &i in occ {
            occupied[i] = true;
        }

        let reach = (p.image_radius + p.height).powi(2);
        let mut icibb = DVector::zeros(n);
        for &o in occ {
            let site = self.sites[o];
            let f = p.image_radius.powi(2) / (self.lateral[o].powi(2) + reach);
            let offset = (site - self.position) * (1.0 - f);
            let image = site - offset;
            let z = (1.0 - f) * (p.height + p.image_radius);
            let q = f.sqrt();
            for (j, s) in self.sites.iter().enumerate() {
                let dz = if occupied[j] { 0.0 } else { p.relaxation_height };
                let d = *s - image;
                icibb[j] += q / (d.norm_squared() + dz * dz + z * z).sqrt();
            }
        }
        icibb *= Self::coulomb_strength() / p.epsilon_r;

        icibb - &self.tibb
    }

    /// Change in the tip-induced shift for the occupied site `n` hopping to `m`.
    pub(super) fn compute_delta(&self, n: usize, m: usize) -> f64 {
        let moved: Vec<usize> = self
            .core
            .occ
            .iter()
            .map(|&o| if o == n { m } else { o })
            .collect();
        self.current_shifts[n] - self.level_shifts(&moved)[m]
    }

    fn aim_at(&mut self, target: Point2<f64>) {
        let delta = target - self.position;
        self.time_to_target = delta.norm() / self.params.scan_rate;
        self.velocity = if self.time_to_target == 0.0 {
            Vector2::zeros()
        } else {
            delta / self.time_to_target
        };
    }

    /// Analytic sphere-potential band-bending profile over the lateral distances.
    fn refresh_tibb(&mut self) {
        let p = &self.params;
        let amplitude = p.screening * p.work_function_delta * p.bending_radius;
        let reach = (p.bending_radius + p.height).powi(2);
        self.tibb = self.lateral.map(|r| amplitude / (r * r + reach).sqrt());
    }
}
