//! # Engine Module
//!
//! The stateful simulation core: a rejection-free kinetic Monte Carlo model
//! of electrons hopping among dangling bonds and exchanging charge with
//! external channels.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Geometry, physics, population and rate settings with a validating builder
//! - **State** ([`state`]) - Permutation-based charge configuration with O(1) hop, exit and injection
//! - **Neighbor Tables** ([`neighbors`]) - Finite-range single-hop targets and cohopping pairs
//! - **Events** ([`event`]) - Competing processes and the transitions they produce
//! - **Hopping Model** ([`hopper`]) - Rate bookkeeping, lifetime countdowns and the event loop
//! - **Progress Monitoring** ([`progress`]) - Callbacks for long-running workflows
//! - **Error Handling** ([`error`]) - Engine-specific error types
//!
//! The model is single-threaded. Independent replicas each own their own
//! [`HoppingModel`] and random stream.

pub mod config;
pub mod error;
pub mod event;
pub mod hopper;
pub mod neighbors;
pub mod progress;
pub mod state;

pub use hopper::HoppingModel;
