//! Errors surfaced by the simulation runtime.

use synrad_core::{ConfigError, DistributionError, GeometryError, ScenarioError};
use thiserror::Error;

/// Errors that can occur while loading or running a simulation.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Physics table error: {0}")]
    Table(#[from] DistributionError),

    #[error("Scenario error: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Aggregator is no longer reachable")]
    AggregatorDisconnected,

    #[error("Worker {0} is no longer reachable")]
    WorkerDisconnected(usize),

    #[error("Worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("No geometry loaded")]
    NotLoaded,
}

/// Result type for simulation operations.
pub type SimulationResult<T> = Result<T, SimulationError>;
