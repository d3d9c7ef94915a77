use super::{ChannelCore, sigmoid};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BulkParams {
    /// Maximum exchange rate between bulk and surface, Hz.
    pub nu: f64,
    /// Local level at which electrons start to exchange, eV.
    pub mu: f64,
    /// Self-trapping energy, eV.
    pub lambda: f64,
    /// Sharpness of the transition; larger is sharper.
    pub alpha: f64,
    pub scale: f64,
    pub enabled: bool,
}

impl Default for BulkParams {
    fn default() -> Self {
        Self {
            nu: 1e3,
            mu: 0.25,
            lambda: 0.0,
            alpha: 1.0,
            scale: 1.0,
            enabled: true,
        }
    }
}

/// Passive charge exchange with the bulk, a spatially uniform reservoir.
#[derive(Debug, Clone)]
pub struct Bulk {
    pub(crate) core: ChannelCore,
    params: BulkParams,
}

impl Default for Bulk {
    fn default() -> Self {
        Self::new(BulkParams::default())
    }
}

impl Bulk {
    pub fn new(params: BulkParams) -> Self {
        let mut core = ChannelCore::new(params.scale);
        core.enabled = params.enabled;
        Self { core, params }
    }

    pub fn params(&self) -> &BulkParams {
        &self.params
    }

    pub fn set_mu(&mut self, mu: f64) {
        self.params.mu = mu;
    }

    pub fn set_nu(&mut self, nu: f64) {
        self.params.nu = nu;
    }

    pub(super) fn update(&mut self, occ: &[usize], nocc: &[usize], beff: &DVector<f64>) {
        let BulkParams {
            nu,
            mu,
            lambda,
            alpha,
            ..
        } = self.params;
        let kt = self.core.kt;
        self.core.store_occupation(occ, nocc);
        self.core.exit_rates = occ
            .iter()
            .map(|&i| nu * sigmoid(beff[i] + mu + lambda, alpha, kt))
            .collect();
        self.core.entry_rates = nocc
            .iter()
            .map(|&i| nu * sigmoid(-(beff[i] + mu), alpha, kt))
            .collect();
        self.core.tickrate = self.core.entry_rates.iter().sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KT: f64 = 4.0 * 8.617e-5;

    fn bulk_with_biases(biases: &[f64], occ: &[usize], nocc: &[usize]) -> Bulk {
        let mut bulk = Bulk::default();
        bulk.core.kt = KT;
        bulk.update(occ, nocc, &DVector::from_row_slice(biases));
        bulk
    }

    #[test]
    fn deep_levels_keep_electrons_and_attract_new_ones() {
        let bulk = bulk_with_biases(&[1.0, 1.0], &[0], &[1]);
        assert!(bulk.core.exit_rates[0] < 1e-100);
        assert!((bulk.core.entry_rates[0] - 1e3).abs() < 1e-9);
    }

    #[test]
    fn shallow_levels_empty_onto_the_bulk() {
        let bulk = bulk_with_biases(&[-1.0, -1.0], &[0], &[1]);
        assert!((bulk.core.exit_rates[0] - 1e3).abs() < 1e-9);
        assert!(bulk.core.entry_rates[0] < 1e-100);
    }

    #[test]
    fn rates_balance_at_the_chemical_potential() {
        let bulk = bulk_with_biases(&[-0.25, -0.25], &[0], &[1]);
        assert!((bulk.core.exit_rates[0] - 500.0).abs() < 1e-9);
        assert!((bulk.core.entry_rates[0] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn nu_scales_both_directions() {
        let biases = DVector::from_row_slice(&[-0.25, -0.25]);
        let mut bulk = bulk_with_biases(biases.as_slice(), &[0], &[1]);
        bulk.set_nu(4e3);
        bulk.update(&[0], &[1], &biases);
        assert_eq!(bulk.params().nu, 4e3);
        assert!((bulk.core.exit_rates[0] - 2e3).abs() < 1e-9);
        assert!((bulk.core.entry_rates[0] - 2e3).abs() < 1e-9);
    }

    #[test]
    fn mu_moves_the_balance_point() {
        let biases = DVector::from_row_slice(&[-0.5, -0.5]);
        let mut bulk = bulk_with_biases(biases.as_slice(), &[0], &[1]);
        assert!((bulk.core.exit_rates[0] - 1e3).abs() < 1e-9);
        assert!(bulk.core.entry_rates[0] < 1e-100);

        bulk.set_mu(0.5);
        bulk.update(&[0], &[1], &biases);
        assert!((bulk.core.exit_rates[0] - 500.0).abs() < 1e-9);
        assert!((bulk.core.entry_rates[0] - 500.0).abs() < 1e-9);

        bulk.set_mu(1.5);
        bulk.update(&[0], &[1], &biases);
        assert!(bulk.core.exit_rates[0] < 1e-100);
        assert!((bulk.core.entry_rates[0] - 1e3).abs() < 1e-9);
    }

    #[test]
    fn tickrate_is_sum_of_entry_rates() {
        let bulk = bulk_with_biases(&[-0.2, -0.3, -0.25], &[], &[0, 1, 2]);
        let total: f64 = bulk.core.entry_rates.iter().sum();
        assert_eq!(bulk.core.tickrate, total);
        assert!(bulk.core.exit_rates.is_empty());
    }
}
