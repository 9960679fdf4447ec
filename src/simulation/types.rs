//! Core types for the highway simulation

use serde::Serialize;
use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SimId(pub usize);

/// A wrapper type for vehicle IDs
///
/// Ids are handed out in spawn order, so ascending id order is also the
/// order in which lane-change contention is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VehicleId(pub SimId);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0 .0)
    }
}

/// A lane index: 0 is the rightmost lane, higher indices are further left
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Lane(pub usize);

impl Lane {
    /// The rightmost lane, where vehicles enter the highway
    pub const RIGHTMOST: Lane = Lane(0);

    /// The lane immediately to the left, if the highway has one
    pub fn left(self, lane_count: usize) -> Option<Lane> {
        (self.0 + 1 < lane_count).then_some(Lane(self.0 + 1))
    }

    /// The lane immediately to the right, if any
    pub fn right(self) -> Option<Lane> {
        self.0.checked_sub(1).map(Lane)
    }

    pub fn is_rightmost(self) -> bool {
        self.0 == 0
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Highest lane count the highway model accepts
pub const MAX_LANES: usize = 3;

/// Tolerance used when comparing committed positions against `min_gap`
pub const POSITION_EPSILON: f64 = 1e-9;
