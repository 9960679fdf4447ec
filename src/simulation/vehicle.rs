//! Vehicle state and the car-following rule

use serde::Serialize;

use super::config::SimConfig;
use super::lane_policy::{LaneAction, LeaderInfo};
use super::types::{Lane, VehicleId};

/// Congestion status of a vehicle, derived from its blocked counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Normal,
    Blocked,
    Jammed,
}

impl VehicleStatus {
    /// Status for a vehicle that has been blocked for `blocked_ticks` ticks
    pub fn from_blocked_ticks(blocked_ticks: u32, persistence_threshold: u32) -> Self {
        if blocked_ticks > persistence_threshold {
            VehicleStatus::Jammed
        } else if blocked_ticks >= 1 {
            VehicleStatus::Blocked
        } else {
            VehicleStatus::Normal
        }
    }
}

/// A vehicle on the highway
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub lane: Lane,
    pub position: f64,
    pub speed: f64,
    /// This driver's own top speed, never above the global `max_speed`
    pub top_speed: f64,
    /// Fixed at spawn: once out of the rightmost lane this driver never returns
    pub is_bad_practice: bool,
    /// Consecutive ticks this vehicle has been blocked
    pub blocked_ticks: u32,
    /// Lane action applied during the most recent tick
    pub last_action: LaneAction,
}

impl SimVehicle {
    pub fn new(
        id: VehicleId,
        lane: Lane,
        position: f64,
        speed: f64,
        top_speed: f64,
        is_bad_practice: bool,
    ) -> Self {
        Self {
            id,
            lane,
            position,
            speed,
            top_speed,
            is_bad_practice,
            blocked_ticks: 0,
            last_action: LaneAction::Hold,
        }
    }

    pub fn status(&self, persistence_threshold: u32) -> VehicleStatus {
        VehicleStatus::from_blocked_ticks(self.blocked_ticks, persistence_threshold)
    }

    /// Speed for the next tick given the leader in the vehicle's lane
    ///
    /// With room ahead the vehicle accelerates toward its top speed; when
    /// closer than the safe following distance it drops to the leader's
    /// speed minus the margin. Either way the result never exceeds
    /// `gap - min_gap`, so a leader that does not move backwards cannot be
    /// reached.
    pub fn next_speed(&self, leader: Option<LeaderInfo>, config: &SimConfig) -> f64 {
        let accelerated = (self.speed + config.acceleration).min(self.top_speed);

        let Some(leader) = leader else {
            return accelerated.max(0.0);
        };

        let target = if leader.gap >= config.following_distance(self.speed) {
            accelerated
        } else {
            self.speed.min(leader.speed - config.speed_margin)
        };

        target.min(leader.gap - config.min_gap).max(0.0)
    }

    /// A leader sits closer than the following distance at this driver's
    /// top speed, so the desired speed cannot be reached
    ///
    /// A vehicle with nothing ahead is never held back, however slow it is.
    pub fn is_held_back(&self, leader: Option<LeaderInfo>, config: &SimConfig) -> bool {
        leader.is_some_and(|leader| leader.gap < config.following_distance(self.top_speed))
    }

    /// Update the blocked counter after this tick's move
    pub fn record_blocked(&mut self, blocked: bool) {
        if blocked {
            self.blocked_ticks = self.blocked_ticks.saturating_add(1);
        } else {
            self.blocked_ticks = 0;
        }
    }

    /// Advance along the lane by the current speed
    pub fn advance(&mut self) {
        self.position += self.speed;
    }
}
