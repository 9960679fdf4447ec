//! The highway: owns every vehicle of one run and advances them tick by tick
//!
//! This is the run context. Each trial builds its own highway with its own
//! seeded RNG, so nothing is shared between runs.

use log::{trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::SimConfig;
use super::error::{ConfigError, InvariantViolation, PlacementError};
use super::jam_detector::JamDetector;
use super::lane_occupancy::LaneOccupancy;
use super::lane_policy::{self, LaneAction, LaneContext, LeaderInfo};
use super::snapshot::{check_transition, TickSnapshot, VehicleSnapshot};
use super::types::{Lane, SimId, VehicleId};
use super::vehicle::{SimVehicle, VehicleStatus};

/// Placement attempts per vehicle when scattering the initial traffic
const PREFILL_ATTEMPTS_PER_CAR: usize = 4;

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub lane_changes: usize,
    /// Lane-change requests that lost contention or became unsafe
    pub denied_lane_changes: usize,
    pub despawned: Vec<VehicleId>,
    /// Below `num_cars` with a free entry cell, so a spawn could happen
    pub spawn_eligible: bool,
    pub spawned: Option<VehicleId>,
    pub blocked: usize,
    pub jammed: usize,
    /// True only on the tick the run's jam is declared
    pub jam_declared: bool,
}

/// One highway run
pub struct SimHighway {
    config: SimConfig,
    bad_practice_ratio: f64,
    rng: StdRng,
    /// Active vehicles, always in ascending id order
    vehicles: Vec<SimVehicle>,
    next_id: usize,
    tick: u64,
    detector: JamDetector,
    /// Vehicles created by prefill, spawning or manual placement
    pub vehicles_created: usize,
    /// Vehicles that reached the end of the highway
    pub vehicles_exited: usize,
}

impl SimHighway {
    /// Create a highway for one run, scattering initial traffic when
    /// `prefill` is set
    pub fn new(config: SimConfig, bad_practice_ratio: f64, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        if !(0.0..=1.0).contains(&bad_practice_ratio) {
            return Err(ConfigError::OutsideUnitInterval {
                field: "bad_practice_ratio",
                value: bad_practice_ratio,
            });
        }

        let detector = JamDetector::new(&config);
        let mut highway = Self {
            config,
            bad_practice_ratio,
            rng: StdRng::seed_from_u64(seed),
            vehicles: Vec::new(),
            next_id: 0,
            tick: 0,
            detector,
            vehicles_created: 0,
            vehicles_exited: 0,
        };

        if highway.config.prefill {
            highway.prefill();
        }

        Ok(highway)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Number of ticks simulated so far
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn vehicles(&self) -> &[SimVehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles
            .binary_search_by_key(&id, |vehicle| vehicle.id)
            .ok()
            .map(|index| &self.vehicles[index])
    }

    pub fn active_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn jam_detector(&self) -> &JamDetector {
        &self.detector
    }

    pub fn jam_tick(&self) -> Option<u64> {
        self.detector.jam_tick()
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(SimId(self.next_id));
        self.next_id += 1;
        id
    }

    /// Roll a new driver and put them on the highway at free-flow speed
    fn create_vehicle(&mut self, lane: Lane, position: f64) -> VehicleId {
        let id = self.next_vehicle_id();
        let spread = self.config.speed_variance * self.rng.random::<f64>();
        let top_speed = self.config.max_speed * (1.0 - spread);
        let is_bad_practice = self.rng.random_bool(self.bad_practice_ratio);

        self.vehicles.push(SimVehicle::new(
            id,
            lane,
            position,
            top_speed,
            top_speed,
            is_bad_practice,
        ));
        self.vehicles_created += 1;
        id
    }

    /// True when no vehicle in `lane` is closer than `clearance` to `position`
    fn spot_is_free(&self, lane: Lane, position: f64, clearance: f64) -> bool {
        !self
            .vehicles
            .iter()
            .any(|other| other.lane == lane && (other.position - position).abs() < clearance)
    }

    fn prefill(&mut self) {
        let attempts = self.config.num_cars.saturating_mul(PREFILL_ATTEMPTS_PER_CAR);
        let clearance = self.config.spawn_clearance;

        for _ in 0..attempts {
            if self.vehicles.len() >= self.config.num_cars {
                break;
            }
            let position = self.rng.random_range(0.0..self.config.length);
            let lane = Lane(self.rng.random_range(0..self.config.lane_count));
            if self.spot_is_free(lane, position, clearance) {
                self.create_vehicle(lane, position);
            }
        }

        if self.vehicles.len() < self.config.num_cars {
            warn!(
                "Prefill placed only {} of {} vehicles; the highway is too crowded for spawn_clearance {}",
                self.vehicles.len(),
                self.config.num_cars,
                clearance
            );
        }
    }

    /// Put a vehicle at an exact spot, for scenarios and tests
    ///
    /// A top speed of 0 models a stalled vehicle.
    pub fn place_vehicle(
        &mut self,
        lane: Lane,
        position: f64,
        speed: f64,
        top_speed: f64,
        is_bad_practice: bool,
    ) -> Result<VehicleId, PlacementError> {
        if lane.index() >= self.config.lane_count {
            return Err(PlacementError::NoSuchLane {
                lane,
                lane_count: self.config.lane_count,
            });
        }
        if !(0.0..self.config.length).contains(&position) {
            return Err(PlacementError::OffHighway {
                position,
                length: self.config.length,
            });
        }
        if !(speed >= 0.0 && speed <= top_speed && top_speed <= self.config.max_speed) {
            return Err(PlacementError::BadSpeed {
                speed,
                top_speed,
                max_speed: self.config.max_speed,
            });
        }
        if let Some(other) = self.vehicles.iter().find(|other| {
            other.lane == lane && (other.position - position).abs() < self.config.min_gap
        }) {
            return Err(PlacementError::Occupied {
                lane,
                position,
                other: other.id,
            });
        }

        let id = self.next_vehicle_id();
        self.vehicles.push(SimVehicle::new(
            id,
            lane,
            position,
            speed,
            top_speed,
            is_bad_practice,
        ));
        self.vehicles_created += 1;
        Ok(id)
    }

    /// Local view of one vehicle for the lane policy
    fn lane_context(&self, vehicle: &SimVehicle, occupancy: &LaneOccupancy) -> LaneContext {
        let lane_count = self.config.lane_count;
        let clearance = self.config.lane_change_clearance;

        let leader = occupancy
            .find_ahead(vehicle.lane, vehicle.position)
            .map(|(position, occupant)| LeaderInfo {
                gap: position - vehicle.position,
                speed: occupant.speed,
            });

        let left_clear = vehicle
            .lane
            .left(lane_count)
            .is_some_and(|lane| occupancy.is_clear(lane, vehicle.position, clearance));
        let right_clear = vehicle
            .lane
            .right()
            .is_some_and(|lane| occupancy.is_clear(lane, vehicle.position, clearance));

        LaneContext {
            lane: vehicle.lane,
            lane_count,
            speed: vehicle.speed,
            desired_speed: vehicle.top_speed,
            is_bad_practice: vehicle.is_bad_practice,
            leader,
            left_clear,
            right_clear,
        }
    }

    /// Apply lane-change requests in ascending id order
    ///
    /// Each request is re-checked against the lanes as already modified by
    /// earlier moves this tick. Returns, per vehicle, whether it changed lane
    /// and whether its request was denied.
    fn resolve_lane_changes(
        &mut self,
        actions: &[LaneAction],
        occupancy: &mut LaneOccupancy,
    ) -> (Vec<bool>, Vec<bool>) {
        let lane_count = self.config.lane_count;
        let clearance = self.config.lane_change_clearance;
        let tick = self.tick;

        let mut changed = vec![false; self.vehicles.len()];
        let mut denied = vec![false; self.vehicles.len()];

        for (index, (vehicle, &action)) in self.vehicles.iter_mut().zip(actions).enumerate() {
            let Some(target) = action.target_lane(vehicle.lane, lane_count) else {
                vehicle.last_action = LaneAction::Hold;
                continue;
            };

            if occupancy.is_clear(target, vehicle.position, clearance) {
                occupancy.move_lane(vehicle.lane, target, vehicle.position);
                trace!(
                    "tick {}: vehicle {} {:?} from lane {} to lane {}",
                    tick,
                    vehicle.id,
                    action,
                    vehicle.lane,
                    target
                );
                vehicle.lane = target;
                vehicle.last_action = action;
                changed[index] = true;
            } else {
                trace!(
                    "tick {}: vehicle {} denied {:?} into lane {}",
                    tick,
                    vehicle.id,
                    action,
                    target
                );
                vehicle.last_action = LaneAction::Hold;
                denied[index] = true;
            }
        }

        (changed, denied)
    }

    fn despawn_exited(&mut self) -> Vec<VehicleId> {
        let length = self.config.length;
        let mut exited = Vec::new();
        self.vehicles.retain(|vehicle| {
            if vehicle.position >= length {
                exited.push(vehicle.id);
                false
            } else {
                true
            }
        });
        self.vehicles_exited += exited.len();
        exited
    }

    /// Maybe inject one vehicle at the start of the rightmost lane
    ///
    /// Returns whether a spawn was possible this tick and the new vehicle.
    fn spawn_at_entry(&mut self) -> (bool, Option<VehicleId>) {
        let below_target = self.vehicles.len() < self.config.num_cars;
        let eligible =
            below_target && self.spot_is_free(Lane::RIGHTMOST, 0.0, self.config.spawn_clearance);

        if !eligible || !self.rng.random_bool(self.config.spawn_probability) {
            return (eligible, None);
        }

        let id = self.create_vehicle(Lane::RIGHTMOST, 0.0);
        trace!("tick {}: vehicle {} entered the highway", self.tick, id);
        (eligible, Some(id))
    }

    /// Advance the highway by one tick
    ///
    /// Every decision is taken against the state left by the previous tick;
    /// speeds, lanes and positions are committed together afterwards.
    pub fn step(&mut self) -> Result<TickReport, InvariantViolation> {
        self.tick += 1;

        let previous = self
            .config
            .check_invariants
            .then(|| self.vehicle_snapshots());

        let mut occupancy = LaneOccupancy::from_vehicles(self.config.lane_count, &self.vehicles);

        // Decide
        let contexts: Vec<LaneContext> = self
            .vehicles
            .iter()
            .map(|vehicle| self.lane_context(vehicle, &occupancy))
            .collect();
        let actions: Vec<LaneAction> = contexts
            .iter()
            .map(|context| lane_policy::decide(context, &self.config))
            .collect();

        // Resolve
        let (changed, denied) = self.resolve_lane_changes(&actions, &mut occupancy);

        // Follow, using the updated lanes and the previous positions
        let (speeds, held_back): (Vec<f64>, Vec<bool>) = self
            .vehicles
            .iter()
            .map(|vehicle| {
                let leader = occupancy
                    .find_ahead(vehicle.lane, vehicle.position)
                    .map(|(position, occupant)| LeaderInfo {
                        gap: position - vehicle.position,
                        speed: occupant.speed,
                    });
                (
                    vehicle.next_speed(leader, &self.config),
                    vehicle.is_held_back(leader, &self.config),
                )
            })
            .unzip();

        // Commit
        let blocked_threshold = self.config.blocked_speed_threshold();
        for (index, vehicle) in self.vehicles.iter_mut().enumerate() {
            vehicle.speed = speeds[index];
            vehicle.advance();

            let lane_change_available =
                changed[index] || (contexts[index].left_clear && !denied[index]);
            vehicle.record_blocked(
                vehicle.speed < blocked_threshold && held_back[index] && !lane_change_available,
            );
        }

        let despawned = self.despawn_exited();
        let (spawn_eligible, spawned) = self.spawn_at_entry();
        let observation = self.detector.observe(self.tick, &self.vehicles);

        if let Some(previous) = previous {
            check_transition(&previous, &self.snapshot(), &self.config)?;
        }

        Ok(TickReport {
            tick: self.tick,
            lane_changes: changed.iter().filter(|&&moved| moved).count(),
            denied_lane_changes: denied.iter().filter(|&&lost| lost).count(),
            despawned,
            spawn_eligible,
            spawned,
            blocked: observation.blocked,
            jammed: observation.jammed,
            jam_declared: observation.newly_declared,
        })
    }

    fn vehicle_snapshots(&self) -> Vec<VehicleSnapshot> {
        let threshold = self.config.blocked_persistence_threshold;
        self.vehicles
            .iter()
            .map(|vehicle| VehicleSnapshot::capture(vehicle, threshold))
            .collect()
    }

    /// Read-only picture of the highway at the current tick boundary
    pub fn snapshot(&self) -> TickSnapshot {
        TickSnapshot {
            tick: self.tick,
            jam_declared: self.detector.jam_declared(),
            vehicles: self.vehicle_snapshots(),
        }
    }

    /// Print a summary of the highway state
    pub fn print_summary(&self) {
        let threshold = self.config.blocked_persistence_threshold;
        let mut per_lane = vec![0usize; self.config.lane_count];
        for vehicle in &self.vehicles {
            per_lane[vehicle.lane.index()] += 1;
        }
        let bad_practice = self.vehicles.iter().filter(|v| v.is_bad_practice).count();
        let jammed = self
            .vehicles
            .iter()
            .filter(|v| v.status(threshold) == VehicleStatus::Jammed)
            .count();
        let mean_speed = if self.vehicles.is_empty() {
            0.0
        } else {
            self.vehicles.iter().map(|v| v.speed).sum::<f64>() / self.vehicles.len() as f64
        };

        println!("=== Highway Summary ===");
        println!(
            "Tick: {}, bad-practice ratio: {:.2}",
            self.tick, self.bad_practice_ratio
        );
        println!(
            "Active vehicles: {} ({} bad practice), created: {}, exited: {}",
            self.vehicles.len(),
            bad_practice,
            self.vehicles_created,
            self.vehicles_exited
        );
        for (lane, count) in per_lane.iter().enumerate().rev() {
            println!("  Lane {}: {} vehicles", lane, count);
        }
        println!("Mean speed: {:.2}", mean_speed);
        println!(
            "Blocked: {}, jammed: {}, jam: {}",
            self.detector.blocked_count,
            jammed,
            match self.detector.jam_tick() {
                Some(tick) => format!("declared at tick {}", tick),
                None => "none".to_string(),
            }
        );
    }

    /// Draw the lanes in the terminal, leftmost lane on top
    pub fn draw_lanes(&self, width: usize) {
        let width = width.max(1);
        let threshold = self.config.blocked_persistence_threshold;
        let mut grid = vec![vec!['.'; width]; self.config.lane_count];

        for vehicle in &self.vehicles {
            let col = ((vehicle.position / self.config.length) * width as f64) as usize;
            let cell = &mut grid[vehicle.lane.index()][col.min(width - 1)];
            let glyph = match (vehicle.status(threshold), vehicle.is_bad_practice) {
                (VehicleStatus::Jammed, _) => '#',
                (VehicleStatus::Blocked, _) => '!',
                (VehicleStatus::Normal, true) => 'b',
                (VehicleStatus::Normal, false) => 'o',
            };
            // Congestion wins when several vehicles share a column
            if *cell == '.' || glyph == '#' || (glyph == '!' && *cell != '#') {
                *cell = glyph;
            }
        }

        println!("\n=== Highway Map (tick {}) ===", self.tick);
        println!("Legend: o=Vehicle, b=Bad practice, !=Blocked, #=Jammed, .=Road");
        for (lane, row) in grid.iter().enumerate().rev() {
            let line: String = row.iter().collect();
            println!("{} |{}|", lane, line);
        }
        println!();
    }
}
