//! Per-lane ordered index of vehicle positions
//!
//! Built from the previous tick's state at the start of every tick. Lane
//! changes committed during the resolve pass are applied to the index so
//! later requests in id order see them.

use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::ops::Bound;

use super::types::{Lane, VehicleId};
use super::vehicle::SimVehicle;

/// A vehicle as seen by its neighbours in the snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occupant {
    pub id: VehicleId,
    pub speed: f64,
}

/// Maps each lane to its vehicles ordered by position
#[derive(Debug, Clone, Default)]
pub struct LaneOccupancy {
    lanes: Vec<BTreeMap<OrderedFloat<f64>, Occupant>>,
}

impl LaneOccupancy {
    pub fn new(lane_count: usize) -> Self {
        Self {
            lanes: vec![BTreeMap::new(); lane_count],
        }
    }

    /// Index the given vehicles by lane and position
    pub fn from_vehicles<'a>(
        lane_count: usize,
        vehicles: impl IntoIterator<Item = &'a SimVehicle>,
    ) -> Self {
        let mut occupancy = Self::new(lane_count);
        for vehicle in vehicles {
            occupancy.insert(
                vehicle.lane,
                vehicle.position,
                Occupant {
                    id: vehicle.id,
                    speed: vehicle.speed,
                },
            );
        }
        occupancy
    }

    /// Insert an occupant, returning whatever already held that exact spot
    pub fn insert(&mut self, lane: Lane, position: f64, occupant: Occupant) -> Option<Occupant> {
        self.lanes
            .get_mut(lane.index())
            .and_then(|map| map.insert(OrderedFloat(position), occupant))
    }

    /// Remove the occupant at an exact spot
    pub fn remove(&mut self, lane: Lane, position: f64) -> Option<Occupant> {
        self.lanes
            .get_mut(lane.index())
            .and_then(|map| map.remove(&OrderedFloat(position)))
    }

    /// Move an occupant sideways between lanes at the same position
    pub fn move_lane(&mut self, from: Lane, to: Lane, position: f64) -> bool {
        match self.remove(from, position) {
            Some(occupant) => {
                self.insert(to, position, occupant);
                true
            }
            None => false,
        }
    }

    /// Nearest vehicle strictly ahead of `position` in `lane`
    pub fn find_ahead(&self, lane: Lane, position: f64) -> Option<(f64, Occupant)> {
        self.lanes.get(lane.index()).and_then(|map| {
            map.range((Bound::Excluded(OrderedFloat(position)), Bound::Unbounded))
                .next()
                .map(|(pos, occupant)| (pos.into_inner(), *occupant))
        })
    }

    /// Nearest vehicle at or behind `position` in `lane`
    pub fn find_behind(&self, lane: Lane, position: f64) -> Option<(f64, Occupant)> {
        self.lanes.get(lane.index()).and_then(|map| {
            map.range(..=OrderedFloat(position))
                .next_back()
                .map(|(pos, occupant)| (pos.into_inner(), *occupant))
        })
    }

    /// Collision-safety predicate for moving into `lane` at `position`
    ///
    /// Both the nearest vehicle ahead and the nearest one behind must be at
    /// least `clearance` away. A missing lane is never clear.
    pub fn is_clear(&self, lane: Lane, position: f64, clearance: f64) -> bool {
        if lane.index() >= self.lanes.len() {
            return false;
        }

        let ahead_ok = self
            .find_ahead(lane, position)
            .map_or(true, |(ahead, _)| ahead - position >= clearance);
        let behind_ok = self
            .find_behind(lane, position)
            .map_or(true, |(behind, _)| position - behind >= clearance);

        ahead_ok && behind_ok
    }
}
