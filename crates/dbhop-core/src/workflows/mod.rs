//! # Workflows Module
//!
//! High-level procedures that drive a [`HoppingModel`](crate::engine::HoppingModel)
//! through a complete experiment.
//!
//! - **Line Scan** ([`scan`]) - AFM-style sweeps over the sites in x order,
//!   reading charges and optionally writing bias pulses on alternate passes.
//! - **Trajectory** ([`trajectory`]) - Snapshots of the observable state at
//!   fixed simulated-time intervals.
//! - **Ensemble** ([`ensemble`]) - Independently seeded replicas averaged into
//!   per-site occupation probabilities, in parallel with the `parallel` feature.

pub mod ensemble;
pub mod scan;
pub mod trajectory;
