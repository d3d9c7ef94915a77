use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;

const EPSILON_0: f64 = 8.854e-12; // F/m
const ELEMENTARY_CHARGE: f64 = 1.602e-19; // C
pub const BOLTZMANN_EV: f64 = 8.617e-05; // eV/K

/// Surface electrostatics and thermal environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PhysicsParams {
    /// System temperature, K.
    pub temperature: f64,
    /// Debye screening length, angstroms.
    pub debye_length: f64,
    /// Length of the erf-based short-range screening, angstroms.
    pub erf_length: f64,
    /// Relative permittivity of the surface.
    pub epsilon_r: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            temperature: 4.0,
            debye_length: 50.0,
            erf_length: 5.0,
            epsilon_r: 6.35,
        }
    }
}

impl PhysicsParams {
    /// Thermal energy, eV.
    #[inline]
    pub fn kt(&self) -> f64 {
        BOLTZMANN_EV * self.temperature
    }

    /// Coulomb strength, eV·Å.
    #[inline]
    pub fn coulomb_strength(&self) -> f64 {
        1e10 * ELEMENTARY_CHARGE / (4.0 * std::f64::consts::PI * self.epsilon_r * EPSILON_0)
    }

    /// Screened interaction energy between two unit charges separated by `dist` angstroms.
    #[inline]
    pub fn screened_coulomb(&self, dist: f64) -> f64 {
        screened_coulomb(
            dist,
            self.coulomb_strength(),
            self.erf_length,
            self.debye_length,
        )
    }
}

/// `kc/r · erf(r/erf_length) · exp(-r/debye)`, finite as `r → 0`.
#[inline]
pub fn screened_coulomb(dist: f64, kc: f64, erf_length: f64, debye: f64) -> f64 {
    if dist < 1e-9 {
        return kc * 2.0 / (std::f64::consts::PI.sqrt() * erf_length);
    }
    kc / dist * erf(dist / erf_length) * (-dist / debye).exp()
}

/// Pairwise coupling matrix for the given separations, with a zero diagonal.
pub fn coupling_matrix(distances: &DMatrix<f64>, params: &PhysicsParams) -> DMatrix<f64> {
    let n = distances.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            params.screened_coulomb(distances[(i, j)])
        }
    })
}
