//! Highway lane-discipline simulation
//!
//! A multi-lane highway where each vehicle either keeps right except to
//! overtake or, as a bad-practice driver, stays in whatever lane it reached.
//! A Monte-Carlo sweep measures how often jams form as the share of
//! bad-practice drivers grows. Everything here runs headless.

mod config;
mod error;
mod highway;
mod jam_detector;
mod lane_occupancy;
mod lane_policy;
mod snapshot;
mod trial_runner;
mod types;
mod vehicle;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{
    SimConfig, DEFAULT_LANE_COUNT, DEFAULT_LENGTH, DEFAULT_MAX_SPEED, DEFAULT_NUM_CARS,
    DEFAULT_NUM_TRIALS, DEFAULT_SPAWN_PROBABILITY, DEFAULT_TICK_HORIZON,
};
#[allow(unused_imports)]
pub use error::{ConfigError, InvariantViolation, PlacementError, SimError};
pub use highway::{SimHighway, TickReport};
#[allow(unused_imports)]
pub use jam_detector::{JamDetector, JamObservation};
#[allow(unused_imports)]
pub use lane_occupancy::{LaneOccupancy, Occupant};
#[allow(unused_imports)]
pub use lane_policy::{decide, LaneAction, LaneContext, LeaderInfo};
#[allow(unused_imports)]
pub use snapshot::{check_transition, TickSnapshot, VehicleSnapshot};
pub use trial_runner::{
    trial_seed, RatioResult, RunTrace, SweepReport, TrialResult, TrialRunner, TrendStep,
};
#[allow(unused_imports)]
pub use types::{Lane, SimId, VehicleId, MAX_LANES, POSITION_EPSILON};
#[allow(unused_imports)]
pub use vehicle::{SimVehicle, VehicleStatus};
