use thiserror::Error;

use super::config::ConfigError;
use crate::core::utils::sampling::SamplingError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot place {requested} electrons on {sites} sites")]
    TooManyElectrons { requested: usize, sites: usize },

    #[error("Electron count mismatch: expected {expected}, initial charges hold {found}")]
    ElectronCountMismatch { expected: usize, found: usize },

    #[error("Initial charge list has {found} entries for {expected} sites")]
    ChargeLengthMismatch { expected: usize, found: usize },

    #[error("Invalid site index {index} for a system of {sites} sites")]
    InvalidSite { index: usize, sites: usize },

    #[error("The hopping model has not been initialised")]
    NotInitialised,

    #[error("No event can occur and no finite time limit was given")]
    Stalled,

    #[error("Event target selection failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
