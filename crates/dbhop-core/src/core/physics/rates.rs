use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid rate model '{0}'. Choose from [marcus, vrh]")]
pub struct UnknownRateModel(pub String);

/// Energy dependence of the hopping rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateModelKind {
    /// Nonadiabatic Marcus-theory transfer.
    #[default]
    Marcus,
    /// Thermally activated variable-range hopping.
    Vrh,
}

impl FromStr for RateModelKind {
    type Err = UnknownRateModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marcus" => Ok(Self::Marcus),
            "vrh" => Ok(Self::Vrh),
            _ => Err(UnknownRateModel(s.to_string())),
        }
    }
}

impl fmt::Display for RateModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marcus => write!(f, "marcus"),
            Self::Vrh => write!(f, "vrh"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RateParams {
    /// Hopping attenuation length, angstroms.
    pub hop_attenuation: f64,
    /// Attenuation over the separation of a cohopping pair, angstroms.
    pub cohop_attenuation: f64,
    /// Calibration hopping frequency at `calibration_distance`, Hz.
    pub calibration_frequency: f64,
    /// Calibration pair distance, angstroms.
    pub calibration_distance: f64,
    /// Marcus reorganization energy, eV.
    pub reorganization_energy: f64,
    /// Constant offset added to every energy delta, eV.
    pub lambda_offset: f64,
    /// Additional prefactor on all rates.
    pub prefactor: f64,
    /// Ceiling applied to every exponent before evaluation.
    pub exponent_ceiling: f64,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            hop_attenuation: 10.0,
            cohop_attenuation: 100.0,
            calibration_frequency: 0.02,
            calibration_distance: 19.2,
            reorganization_energy: 0.04,
            lambda_offset: 0.0,
            prefactor: 1.0,
            exponent_ceiling: 1e2,
        }
    }
}

/// Hopping rate model over a fixed site geometry.
///
/// Rates are `exp(T0[n,m] + E(ΔG))` where `T0` is the log spatial prefactor,
/// cached from the geometry, and `E` is the model-specific energy term. The
/// exponent is clipped to `exponent_ceiling` so a rate is never infinite.
#[derive(Debug, Clone)]
pub struct RateModel {
    kind: RateModelKind,
    params: RateParams,
    beta: f64,
    distances: DMatrix<f64>,
    spatial: DMatrix<f64>,
}

impl RateModel {
    pub fn new(kind: RateModelKind, params: RateParams) -> Self {
        Self {
            kind,
            params,
            beta: 0.0,
            distances: DMatrix::zeros(0, 0),
            spatial: DMatrix::zeros(0, 0),
        }
    }

    /// Precomputes the spatial terms for the given separations and thermal energy.
    pub fn setup(&mut self, distances: &DMatrix<f64>, kt: f64) {
        self.beta = 1.0 / kt;
        self.distances = distances.clone();
        self.refresh_spatial();
    }

    pub fn kind(&self) -> RateModelKind {
        self.kind
    }

    pub fn params(&self) -> &RateParams {
        &self.params
    }

    /// Single-electron hopping rate from site `src` to site `trg`.
    pub fn rate(&self, delta_g: f64, src: usize, trg: usize) -> f64 {
        self.clipped_exp(self.spatial[(src, trg)] + self.energy_term(delta_g + self.params.lambda_offset))
    }

    /// Rate of the correlated transfer of the electrons at `(i, j)` onto `(k, l)`.
    pub fn cohopping_rate(&self, delta_g: f64, (i, j): (usize, usize), (k, l): (usize, usize)) -> f64 {
        self.clipped_exp(
            self.cohop_spatial(i, j, k, l) + self.energy_term(delta_g + self.params.lambda_offset),
        )
    }

    pub fn set_attenuation(&mut self, hop_attenuation: f64) {
        self.params.hop_attenuation = hop_attenuation;
        self.refresh_spatial();
    }

    pub fn set_prefactor(&mut self, prefactor: f64) {
        self.params.prefactor = prefactor;
        self.refresh_spatial();
    }

    pub fn set_reorganization_energy(&mut self, lambda: f64) {
        self.params.reorganization_energy = lambda;
    }

    pub fn set_lambda_offset(&mut self, offset: f64) {
        self.params.lambda_offset = offset;
    }

    fn energy_term(&self, dg: f64) -> f64 {
        match self.kind {
            RateModelKind::Vrh => -dg * self.beta,
            RateModelKind::Marcus => {
                let lambda = self.params.reorganization_energy;
                if lambda == 0.0 {
                    if dg == 0.0 { 0.0 } else { f64::NEG_INFINITY }
                } else {
                    -dg * (dg + 2.0 * lambda) * 0.25 * self.beta / lambda
                }
            }
        }
    }

    fn refresh_spatial(&mut self) {
        let p = &self.params;
        let log_nu = (p.prefactor * p.calibration_frequency).ln();
        self.spatial = self
            .distances
            .map(|r| log_nu - 2.0 * (r - p.calibration_distance) / p.hop_attenuation);
    }

    fn cohop_spatial(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        let t = &self.spatial;
        let a = t[(i, k)] + t[(j, l)];
        let b = t[(i, l)] + t[(j, k)];
        let (hi, lo) = if a > b { (a, b) } else { (b, a) };
        let log_sum = hi + (lo - hi).exp().ln_1p();
        0.5 * (log_sum - std::f64::consts::LN_2)
            - 2.0 * self.distances[(i, j)] / self.params.cohop_attenuation
    }

    #[inline]
    fn clipped_exp(&self, arg: f64) -> f64 {
        if arg.is_nan() {
            return 0.0;
        }
        arg.min(self.params.exponent_ceiling).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() <= TOLERANCE * a.abs().max(b.abs()).max(1.0)
    }

    fn pair_distances(r: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[0.0, r, r, 0.0])
    }

    fn model(kind: RateModelKind) -> RateModel {
        let mut m = RateModel::new(kind, RateParams::default());
        m.setup(&pair_distances(19.2), 4.0 * 8.617e-5);
        m
    }

    #[test]
    fn rate_model_names_parse_case_insensitively() {
        assert_eq!("VRH".parse::<RateModelKind>(), Ok(RateModelKind::Vrh));
        assert_eq!("marcus".parse::<RateModelKind>(), Ok(RateModelKind::Marcus));
        assert!("hopping".parse::<RateModelKind>().is_err());
    }

    #[test]
    fn vrh_rate_at_calibration_distance_and_zero_delta_is_calibration_frequency() {
        let m = model(RateModelKind::Vrh);
        assert!(f64_approx_equal(m.rate(0.0, 0, 1), 0.02));
    }

    #[test]
    fn marcus_rate_at_zero_delta_is_calibration_frequency() {
        let m = model(RateModelKind::Marcus);
        assert!(f64_approx_equal(m.rate(0.0, 0, 1), 0.02));
    }

    #[test]
    fn marcus_rate_peaks_at_minus_lambda() {
        let m = model(RateModelKind::Marcus);
        let peak = m.rate(-0.04, 0, 1);
        assert!(peak > m.rate(-0.03, 0, 1));
        assert!(peak > m.rate(-0.05, 0, 1));
    }

    #[test]
    fn vrh_favours_negative_energy_deltas() {
        let m = model(RateModelKind::Vrh);
        assert!(m.rate(-0.001, 0, 1) > m.rate(0.001, 0, 1));
    }

    #[test]
    fn extreme_energy_deltas_never_overflow() {
        let m = model(RateModelKind::Vrh);
        let r = m.rate(-1e6, 0, 1);
        assert!(r.is_finite());
        assert!(f64_approx_equal(r, 1e2f64.exp()));
        assert_eq!(model(RateModelKind::Vrh).rate(1e6, 0, 1), 0.0);
    }

    #[test]
    fn marcus_with_zero_lambda_only_allows_resonant_hops() {
        let mut m = model(RateModelKind::Marcus);
        m.set_reorganization_energy(0.0);
        assert_eq!(m.rate(0.01, 0, 1), 0.0);
        assert!(m.rate(0.0, 0, 1) > 0.0);
    }

    #[test]
    fn shorter_attenuation_reduces_long_range_rates() {
        let mut m = RateModel::new(RateModelKind::Vrh, RateParams::default());
        m.setup(&pair_distances(40.0), 1.0);
        let before = m.rate(0.0, 0, 1);
        m.set_attenuation(5.0);
        assert!(m.rate(0.0, 0, 1) < before);
    }

    #[test]
    fn prefactor_scales_rates_linearly() {
        let mut m = model(RateModelKind::Vrh);
        let before = m.rate(0.0, 0, 1);
        m.set_prefactor(3.0);
        assert!(f64_approx_equal(m.rate(0.0, 0, 1), 3.0 * before));
    }

    #[test]
    fn cohop_spatial_term_is_geometric_mean_for_symmetric_assignments() {
        let d = DMatrix::from_fn(4, 4, |i, j| (i as f64 - j as f64).abs() * 10.0);
        let mut m = RateModel::new(RateModelKind::Vrh, RateParams::default());
        m.setup(&d, 1.0);
        let rate = m.cohopping_rate(0.0, (0, 1), (2, 3));
        let a = m.rate(0.0, 0, 2) * m.rate(0.0, 1, 3);
        let b = m.rate(0.0, 0, 3) * m.rate(0.0, 1, 2);
        let expected = (0.5 * (a + b)).sqrt() * (-2.0 * 10.0 / 100.0f64).exp();
        assert!(f64_approx_equal(rate, expected));
    }
}
