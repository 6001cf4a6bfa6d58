//! # Engine Error Types
//!
//! Errors of the registry and configuration layers, plus the rejection type
//! of the consumer validation contract. Build failures are not errors at
//! this level; they surface as [`BuildOutcome`](crate::BuildOutcome) values.

use std::path::PathBuf;

use sightline_core::{EntityId, RegionId};
use thiserror::Error;

use crate::validation::Validation;

/// Errors returned by [`GridManager`](crate::GridManager).
#[derive(Error, Debug)]
pub enum EngineError {
    /// No region with this id is registered.
    #[error("{0} is not registered")]
    UnknownRegion(RegionId),

    /// A region with this id is already registered.
    #[error("{0} is already registered")]
    RegionAlreadyRegistered(RegionId),

    /// The region's configured cell size is unusable.
    #[error("invalid cell size {size} for {region}")]
    InvalidCellSize {
        /// Region being registered.
        region: RegionId,
        /// Rejected cell size.
        size: f32,
    },

    /// The manager is shutting down and accepts no new work.
    #[error("grid manager is shutting down")]
    ShuttingDown,

    /// Invalid engine configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A background thread could not be started.
    #[error("failed to spawn {name}: {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// OS error.
        source: std::io::Error,
    },
}

/// Errors loading or validating [`EngineConfig`](crate::EngineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// OS error.
        source: std::io::Error,
    },

    /// The config text is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why [`ActionGate::act_on`](crate::ActionGate::act_on) refused to run an action.
#[derive(Error, Debug)]
pub enum ActionRejected<E> {
    /// The cheap snapshot pre-check failed.
    #[error("snapshot pre-check failed: {0:?}")]
    Implausible(Validation),

    /// The authoritative side no longer knows the entity.
    #[error("{0} no longer exists")]
    Gone(EntityId),

    /// The live entity no longer satisfies the action's requirement.
    #[error("{0} no longer satisfies the action requirement")]
    NoLongerMatches(EntityId),

    /// The authoritative confirmation itself failed.
    #[error("authoritative confirmation failed: {0}")]
    Authority(E),
}

/// Result type for registry operations.
pub type EngineResult<T> = Result<T, EngineError>;
