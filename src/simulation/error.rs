//! Error types for the highway simulation
//!
//! Configuration problems are user errors and abort a sweep before any trial
//! starts. Invariant violations are logic faults in the stepping code; they
//! abort the run they occur in and are reported separately so tests can
//! assert they never fire.

use thiserror::Error;

use super::types::{Lane, VehicleId};

/// Invalid configuration, always naming the offending field
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be a finite number >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("{field} must lie in [0, 1], got {value}")]
    OutsideUnitInterval { field: &'static str, value: f64 },

    #[error("{field} must be at least 1")]
    Zero { field: &'static str },

    #[error("lane_count must be between 1 and {max}, got {value}")]
    LaneCount { value: usize, max: usize },

    #[error(
        "num_cars ({num_cars}) exceeds the highway capacity of {capacity} vehicles for this length and lane count"
    )]
    OverCapacity { num_cars: usize, capacity: usize },

    #[error("{field} ({value}) must not be smaller than min_gap ({min_gap})")]
    BelowMinGap {
        field: &'static str,
        value: f64,
        min_gap: f64,
    },

    #[error("bad_practice_ratios must contain at least one value")]
    EmptySweep,

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Name of the configuration field that caused the error
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::NotPositive { field, .. }
            | ConfigError::Negative { field, .. }
            | ConfigError::OutsideUnitInterval { field, .. }
            | ConfigError::Zero { field }
            | ConfigError::BelowMinGap { field, .. } => *field,
            ConfigError::LaneCount { .. } => "lane_count",
            ConfigError::OverCapacity { .. } => "num_cars",
            ConfigError::EmptySweep => "bad_practice_ratios",
            ConfigError::Parse(_) => "<input>",
        }
    }
}

/// A committed tick state that breaks one of the model's hard invariants
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("tick {tick}: vehicles {behind} and {ahead} are {gap} apart in lane {lane}")]
    Collision {
        tick: u64,
        lane: Lane,
        behind: VehicleId,
        ahead: VehicleId,
        gap: f64,
    },

    #[error("tick {tick}: vehicle {id} moved backwards from {from} to {to}")]
    PositionRegressed {
        tick: u64,
        id: VehicleId,
        from: f64,
        to: f64,
    },

    #[error("tick {tick}: vehicle {id} has speed {speed} outside [0, {max_speed}]")]
    SpeedOutOfBounds {
        tick: u64,
        id: VehicleId,
        speed: f64,
        max_speed: f64,
    },

    #[error("tick {tick}: vehicle {id} is in lane {lane} but the highway has {lane_count} lanes")]
    LaneOutOfRange {
        tick: u64,
        id: VehicleId,
        lane: Lane,
        lane_count: usize,
    },
}

/// Rejected manual placement of a vehicle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlacementError {
    #[error("lane {lane} does not exist on a highway with {lane_count} lanes")]
    NoSuchLane { lane: Lane, lane_count: usize },

    #[error("position {position} is outside the highway [0, {length})")]
    OffHighway { position: f64, length: f64 },

    #[error("speed {speed} and top speed {top_speed} must satisfy 0 <= speed <= top speed <= {max_speed}")]
    BadSpeed {
        speed: f64,
        top_speed: f64,
        max_speed: f64,
    },

    #[error("lane {lane} at position {position} is within min_gap of vehicle {other}")]
    Occupied {
        lane: Lane,
        position: f64,
        other: VehicleId,
    },
}

/// Errors surfaced by a sweep
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("trial {trial} at bad-practice ratio {ratio} aborted: {source}")]
    Invariant {
        ratio: f64,
        trial: usize,
        #[source]
        source: InvariantViolation,
    },

    #[error("failed to start the trial worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
