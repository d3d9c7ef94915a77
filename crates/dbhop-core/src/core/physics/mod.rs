//! Physical models of the surface: screened electrostatic coupling between
//! sites ([`coulomb`]) and the energy- and distance-dependent hopping rates
//! ([`rates`]).

pub mod coulomb;
pub mod rates;
