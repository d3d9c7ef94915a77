//! # Core Module
//!
//! Stateless foundations of the hopping simulator: surface geometry, the
//! physics of site-site interactions and hopping rates, and the channels that
//! couple the surface to its environment.
//!
//! ## Architecture
//!
//! - **Geometry** ([`lattice`]) - H-Si(100)-2x1 lattice constants, site parsing, pairwise distances
//! - **Physics** ([`physics`]) - Screened Coulomb coupling and the VRH/Marcus rate models
//! - **Channels** ([`channels`]) - Bulk reservoir, scanning-probe tip and clocking field
//! - **Utilities** ([`utils`]) - Exponential lifetime draws and weighted random choice
//!
//! Nothing in this layer owns a charge configuration; the [`crate::engine`]
//! layer drives these components with the current occupation.

pub mod channels;
pub mod lattice;
pub mod physics;
pub mod utils;
