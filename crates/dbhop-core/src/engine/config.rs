use crate::core::channels::ChannelError;
use crate::core::lattice::LatticeParams;
use crate::core::physics::coulomb::PhysicsParams;
use crate::core::physics::rates::{RateModelKind, RateParams, UnknownRateModel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("No dangling-bond sites were given")]
    EmptyGeometry,

    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    RateModel(#[from] UnknownRateModel),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Population and finite-range hopping settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HoppingParams {
    /// Fixed number of electrons; `None` lets channels change the population.
    pub electron_count: Option<usize>,
    /// Filling density used when the population is not fixed.
    pub free_rho: f64,
    /// Burn-in events per site after a random initialisation.
    pub burn_count: usize,
    pub enable_cohop: bool,
    /// Maximum single-hop distance, angstroms.
    pub hop_range: f64,
    /// Maximum separation of a cohopping pair, angstroms.
    pub cohop_range: f64,
}

impl Default for HoppingParams {
    fn default() -> Self {
        Self {
            electron_count: None,
            free_rho: 0.5,
            burn_count: 0,
            enable_cohop: true,
            hop_range: 20.0,
            cohop_range: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HoppingConfig {
    pub lattice: LatticeParams,
    pub physics: PhysicsParams,
    pub hopping: HoppingParams,
    pub rates: RateParams,
    pub rate_model: RateModelKind,
    /// Seed for the simulation's random stream; drawn from entropy if absent.
    pub seed: Option<u64>,
}

impl HoppingConfig {
    pub fn builder() -> HoppingConfigBuilder {
        HoppingConfigBuilder::new()
    }

    /// Checks every parameter for physically meaningful values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be positive and finite, got {value}"),
                })
            }
        }
        fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
            if value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be non-negative, got {value}"),
                })
            }
        }

        positive("lattice.a", self.lattice.a)?;
        positive("lattice.b", self.lattice.b)?;
        non_negative("lattice.c", self.lattice.c)?;

        positive("physics.temperature", self.physics.temperature)?;
        positive("physics.debye-length", self.physics.debye_length)?;
        positive("physics.erf-length", self.physics.erf_length)?;
        positive("physics.epsilon-r", self.physics.epsilon_r)?;

        let h = &self.hopping;
        if !(0.0..=1.0).contains(&h.free_rho) {
            return Err(ConfigError::InvalidParameter {
                name: "hopping.free-rho",
                reason: format!("must lie in [0, 1], got {}", h.free_rho),
            });
        }
        non_negative("hopping.hop-range", h.hop_range)?;
        non_negative("hopping.cohop-range", h.cohop_range)?;

        let r = &self.rates;
        positive("rates.hop-attenuation", r.hop_attenuation)?;
        positive("rates.cohop-attenuation", r.cohop_attenuation)?;
        positive("rates.calibration-frequency", r.calibration_frequency)?;
        positive("rates.prefactor", r.prefactor)?;
        non_negative("rates.reorganization-energy", r.reorganization_energy)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct HoppingConfigBuilder {
    lattice: Option<LatticeParams>,
    physics: Option<PhysicsParams>,
    hopping: Option<HoppingParams>,
    rates: Option<RateParams>,
    rate_model: Option<RateModelKind>,
    temperature: Option<f64>,
    electron_count: Option<usize>,
    hop_range: Option<f64>,
    cohop_range: Option<f64>,
    enable_cohop: Option<bool>,
    burn_count: Option<usize>,
    seed: Option<u64>,
}

impl HoppingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lattice(mut self, lattice: LatticeParams) -> Self {
        self.lattice = Some(lattice);
        self
    }
    pub fn physics(mut self, physics: PhysicsParams) -> Self {
        self.physics = Some(physics);
        self
    }
    pub fn hopping(mut self, hopping: HoppingParams) -> Self {
        self.hopping = Some(hopping);
        self
    }
    pub fn rates(mut self, rates: RateParams) -> Self {
        self.rates = Some(rates);
        self
    }
    pub fn rate_model(mut self, kind: RateModelKind) -> Self {
        self.rate_model = Some(kind);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn electron_count(mut self, n: usize) -> Self {
        self.electron_count = Some(n);
        self
    }
    pub fn hop_range(mut self, range: f64) -> Self {
        self.hop_range = Some(range);
        self
    }
    pub fn cohop_range(mut self, range: f64) -> Self {
        self.cohop_range = Some(range);
        self
    }
    pub fn enable_cohop(mut self, enable: bool) -> Self {
        self.enable_cohop = Some(enable);
        self
    }
    pub fn burn_count(mut self, count: usize) -> Self {
        self.burn_count = Some(count);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Assembles the configuration. Individual setters override the
    /// corresponding fields of any parameter group given as a whole.
    pub fn build(self) -> Result<HoppingConfig, ConfigError> {
        let mut physics = self.physics.unwrap_or_default();
        if let Some(t) = self.temperature {
            physics.temperature = t;
        }

        let mut hopping = self.hopping.unwrap_or_default();
        if let Some(n) = self.electron_count {
            hopping.electron_count = Some(n);
        }
        if let Some(r) = self.hop_range {
            hopping.hop_range = r;
        }
        if let Some(r) = self.cohop_range {
            hopping.cohop_range = r;
        }
        if let Some(enable) = self.enable_cohop {
            hopping.enable_cohop = enable;
        }
        if let Some(count) = self.burn_count {
            hopping.burn_count = count;
        }

        let config = HoppingConfig {
            lattice: self.lattice.unwrap_or_default(),
            physics,
            hopping,
            rates: self.rates.unwrap_or_default(),
            rate_model: self.rate_model.unwrap_or_default(),
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_surface_constants() {
        let config = HoppingConfig::builder().build().unwrap();
        assert_eq!(config.rate_model, RateModelKind::Marcus);
        assert_eq!(config.hopping.hop_range, 20.0);
        assert_eq!(config.hopping.cohop_range, 20.0);
        assert!(config.hopping.enable_cohop);
        assert_eq!(config.hopping.electron_count, None);
        assert_eq!(config.physics.temperature, 4.0);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn scalar_setters_override_parameter_groups() {
        let config = HoppingConfig::builder()
            .hopping(HoppingParams {
                hop_range: 50.0,
                ..Default::default()
            })
            .hop_range(30.0)
            .temperature(77.0)
            .electron_count(3)
            .seed(9)
            .build()
            .unwrap();
        assert_eq!(config.hopping.hop_range, 30.0);
        assert_eq!(config.physics.temperature, 77.0);
        assert_eq!(config.hopping.electron_count, Some(3));
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn build_rejects_non_positive_temperature() {
        let err = HoppingConfig::builder().temperature(0.0).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "physics.temperature",
                ..
            }
        ));
    }

    #[test]
    fn build_rejects_negative_ranges() {
        assert!(HoppingConfig::builder().hop_range(-1.0).build().is_err());
        assert!(HoppingConfig::builder().cohop_range(-1.0).build().is_err());
        assert!(HoppingConfig::builder().hop_range(0.0).build().is_ok());
    }

    #[test]
    fn build_rejects_filling_density_outside_unit_interval() {
        let result = HoppingConfig::builder()
            .hopping(HoppingParams {
                free_rho: 1.5,
                ..Default::default()
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn rate_model_errors_convert_into_config_errors() {
        let err: ConfigError = "sideways"
            .parse::<RateModelKind>()
            .map_err(ConfigError::from)
            .unwrap_err();
        assert!(err.to_string().contains("sideways"));
    }

    #[test]
    fn config_deserializes_from_partial_kebab_case_document() {
        let json = r#"{"rate-model":"vrh","hopping":{"hop-range":12.5},"seed":4}"#;
        let config: HoppingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rate_model, RateModelKind::Vrh);
        assert_eq!(config.hopping.hop_range, 12.5);
        assert_eq!(config.hopping.cohop_range, 20.0);
        assert_eq!(config.seed, Some(4));
    }
}
