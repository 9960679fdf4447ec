//! Lane-change rules
//!
//! Passing is only allowed on the left. Disciplined drivers return to the
//! rightmost free lane once they are done passing; bad-practice drivers stay
//! wherever they ended up. The decision is a pure function of what the
//! vehicle can see in the previous tick's snapshot.

use serde::Serialize;

use super::config::SimConfig;
use super::types::Lane;

/// What a vehicle does with its lane this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneAction {
    /// Stay in the current lane
    Hold,
    /// Move one lane left to pass a slower leader
    Overtake,
    /// Move one lane right because it is free
    ReturnRight,
}

impl LaneAction {
    /// Target lane for this action, `None` when the vehicle keeps its lane
    /// or the move would leave the highway
    pub fn target_lane(self, lane: Lane, lane_count: usize) -> Option<Lane> {
        match self {
            LaneAction::Hold => None,
            LaneAction::Overtake => lane.left(lane_count),
            LaneAction::ReturnRight => lane.right(),
        }
    }
}

/// Nearest vehicle ahead in the same lane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderInfo {
    /// Distance from this vehicle to the leader
    pub gap: f64,
    /// Leader's speed in the snapshot
    pub speed: f64,
}

/// Everything the policy needs to know about one vehicle's surroundings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneContext {
    pub lane: Lane,
    pub lane_count: usize,
    pub speed: f64,
    /// The speed this driver wants to reach (its top speed)
    pub desired_speed: f64,
    pub is_bad_practice: bool,
    pub leader: Option<LeaderInfo>,
    /// The lane to the left exists and has enough room ahead and behind
    pub left_clear: bool,
    /// The lane to the right exists and has enough room ahead and behind
    pub right_clear: bool,
}

impl LaneContext {
    /// The leader is too close for the desired speed and slower than it
    pub fn wants_to_pass(&self, config: &SimConfig) -> bool {
        self.leader.is_some_and(|leader| {
            leader.gap < config.following_distance(self.desired_speed)
                && leader.speed < self.desired_speed
        })
    }

    /// Still closing in on a slower leader, so moving right would mean
    /// passing it on the right
    pub fn is_mid_overtake(&self, config: &SimConfig) -> bool {
        self.leader.is_some_and(|leader| {
            leader.gap < config.passing_lookahead && leader.speed < self.desired_speed
        })
    }
}

/// Pick this tick's lane action
///
/// Overtake is checked first: avoiding a block matters more than lane
/// discipline when both are possible.
pub fn decide(ctx: &LaneContext, config: &SimConfig) -> LaneAction {
    if ctx.left_clear && ctx.lane.left(ctx.lane_count).is_some() && ctx.wants_to_pass(config) {
        return LaneAction::Overtake;
    }

    if !ctx.is_bad_practice
        && !ctx.lane.is_rightmost()
        && ctx.right_clear
        && !ctx.is_mid_overtake(config)
    {
        return LaneAction::ReturnRight;
    }

    LaneAction::Hold
}
