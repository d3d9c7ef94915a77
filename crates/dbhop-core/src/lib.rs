//! # dbhop Core Library
//!
//! Kinetic Monte Carlo simulation of charge dynamics in dangling-bond
//! assemblies on the hydrogen-passivated Si(100)-2x1 surface.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless building blocks: the surface
//!   lattice, screened Coulomb coupling, hopping rate models and the
//!   charge channels (bulk reservoir, scanning tip, clocking field).
//!
//! - **[`engine`]: The Logic Core.** The stateful [`engine::HoppingModel`],
//!   which tracks the charge configuration, keeps every competing process's
//!   rate current and advances simulated time event by event.
//!
//! - **[`workflows`]: The Public API.** Complete procedures driving the
//!   engine: line-scan AFM measurement, trajectory recording and replica
//!   ensembles.

pub mod core;
pub mod engine;
pub mod workflows;
