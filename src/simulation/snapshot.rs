//! Read-only per-tick records of the highway
//!
//! Snapshots are what the outside world gets to see: the animation side
//! replays them and the invariant checks compare consecutive ones.

use serde::Serialize;
use std::collections::HashMap;

use super::config::SimConfig;
use super::error::InvariantViolation;
use super::lane_policy::LaneAction;
use super::types::{Lane, VehicleId, POSITION_EPSILON};
use super::vehicle::{SimVehicle, VehicleStatus};

/// One vehicle at the end of a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub lane: Lane,
    pub position: f64,
    pub speed: f64,
    pub status: VehicleStatus,
    pub is_bad_practice: bool,
    pub blocked_ticks: u32,
    pub last_action: LaneAction,
}

impl VehicleSnapshot {
    pub fn capture(vehicle: &SimVehicle, persistence_threshold: u32) -> Self {
        Self {
            id: vehicle.id,
            lane: vehicle.lane,
            position: vehicle.position,
            speed: vehicle.speed,
            status: vehicle.status(persistence_threshold),
            is_bad_practice: vehicle.is_bad_practice,
            blocked_ticks: vehicle.blocked_ticks,
            last_action: vehicle.last_action,
        }
    }
}

/// All active vehicles at the end of a tick, in id order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickSnapshot {
    pub tick: u64,
    pub jam_declared: bool,
    pub vehicles: Vec<VehicleSnapshot>,
}

/// Check the hard invariants of a committed tick
///
/// `previous` is the state the tick started from; vehicles that appear only
/// in `next` were spawned and vehicles missing from it left the highway.
pub fn check_transition(
    previous: &[VehicleSnapshot],
    next: &TickSnapshot,
    config: &SimConfig,
) -> Result<(), InvariantViolation> {
    let tick = next.tick;
    let previous_positions: HashMap<VehicleId, f64> = previous
        .iter()
        .map(|vehicle| (vehicle.id, vehicle.position))
        .collect();

    let mut by_lane: Vec<Vec<&VehicleSnapshot>> = vec![Vec::new(); config.lane_count];

    for vehicle in &next.vehicles {
        if vehicle.lane.index() >= config.lane_count {
            return Err(InvariantViolation::LaneOutOfRange {
                tick,
                id: vehicle.id,
                lane: vehicle.lane,
                lane_count: config.lane_count,
            });
        }

        if !(0.0..=config.max_speed).contains(&vehicle.speed) {
            return Err(InvariantViolation::SpeedOutOfBounds {
                tick,
                id: vehicle.id,
                speed: vehicle.speed,
                max_speed: config.max_speed,
            });
        }

        if let Some(&from) = previous_positions.get(&vehicle.id) {
            if vehicle.position < from {
                return Err(InvariantViolation::PositionRegressed {
                    tick,
                    id: vehicle.id,
                    from,
                    to: vehicle.position,
                });
            }
        }

        by_lane[vehicle.lane.index()].push(vehicle);
    }

    for (lane, mut vehicles) in by_lane.into_iter().enumerate() {
        vehicles.sort_by(|a, b| a.position.total_cmp(&b.position));
        for pair in vehicles.windows(2) {
            let (behind, ahead) = (pair[0], pair[1]);
            let gap = ahead.position - behind.position;
            if gap < config.min_gap - POSITION_EPSILON {
                return Err(InvariantViolation::Collision {
                    tick,
                    lane: Lane(lane),
                    behind: behind.id,
                    ahead: ahead.id,
                    gap,
                });
            }
        }
    }

    Ok(())
}
