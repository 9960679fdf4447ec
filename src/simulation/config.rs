//! Simulation configuration
//!
//! Every policy threshold lives here rather than in constants so that
//! experiments can vary them. Defaults were picked empirically so that the
//! default sweep shows jam probability rising with the bad-practice ratio
//! without saturating at either end.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::types::MAX_LANES;

pub const DEFAULT_LENGTH: f64 = 1000.0;
pub const DEFAULT_LANE_COUNT: usize = 3;
pub const DEFAULT_NUM_CARS: usize = 120;
pub const DEFAULT_SPAWN_PROBABILITY: f64 = 0.3;
pub const DEFAULT_MAX_SPEED: f64 = 5.0;
pub const DEFAULT_TICK_HORIZON: u64 = 800;
pub const DEFAULT_NUM_TRIALS: usize = 100;

/// Full configuration for one sweep (and for every highway it creates)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimConfig {
    /// Length of the highway segment in distance units
    pub length: f64,
    /// Number of lanes, lane 0 being the rightmost
    pub lane_count: usize,
    /// Target number of active vehicles
    pub num_cars: usize,
    /// Per-tick chance of spawning when below `num_cars`
    pub spawn_probability: f64,
    /// Global top speed in distance units per tick
    pub max_speed: f64,
    /// Spread of per-vehicle top speeds: each vehicle gets
    /// `max_speed * (1 - speed_variance * u)` for a uniform `u` in [0, 1)
    pub speed_variance: f64,
    /// Speed gained per tick when the road ahead is clear
    pub acceleration: f64,
    /// Constant part of the safe following distance
    pub following_base: f64,
    /// Speed-proportional part of the safe following distance, in ticks
    pub following_headway: f64,
    /// How much slower than its leader a too-close vehicle drives
    pub speed_margin: f64,
    /// Minimum bumper-to-bumper separation in one lane
    pub min_gap: f64,
    /// Required free gap ahead and behind in a lane-change target lane
    pub lane_change_clearance: f64,
    /// A slower leader closer than this means the vehicle is still passing
    pub passing_lookahead: f64,
    /// Entry cell size: no spawn while a rightmost-lane vehicle is this close to 0
    pub spawn_clearance: f64,
    /// Start each run with `num_cars` vehicles scattered over the highway
    pub prefill: bool,
    /// Bad-practice ratios swept by the trial runner
    pub bad_practice_ratios: Vec<f64>,
    /// Independent trials per ratio
    pub num_trials: usize,
    /// Ticks after which a trial without a jam ends
    pub tick_horizon: u64,
    /// Jams are not declared before this tick
    pub warmup_ticks: u64,
    /// Below `blocked_speed_fraction * max_speed` a vehicle may count as blocked
    pub blocked_speed_fraction: f64,
    /// A vehicle is jammed once blocked for more than this many ticks
    pub blocked_persistence_threshold: u32,
    /// Jammed vehicles needed to declare a jam
    pub jam_cluster_size: usize,
    /// Base seed; every trial derives its own stream from it
    pub seed: u64,
    /// Trial worker threads, 0 for one per core
    pub workers: usize,
    /// Verify the committed state after every tick
    pub check_invariants: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_LENGTH,
            lane_count: DEFAULT_LANE_COUNT,
            num_cars: DEFAULT_NUM_CARS,
            spawn_probability: DEFAULT_SPAWN_PROBABILITY,
            max_speed: DEFAULT_MAX_SPEED,
            speed_variance: 0.5,
            acceleration: 0.2,
            following_base: 2.0,
            following_headway: 2.0,
            speed_margin: 1.0,
            min_gap: 1.0,
            lane_change_clearance: 8.0,
            passing_lookahead: 30.0,
            spawn_clearance: 8.0,
            prefill: true,
            bad_practice_ratios: (0..=10).map(|step| step as f64 / 10.0).collect(),
            num_trials: DEFAULT_NUM_TRIALS,
            tick_horizon: DEFAULT_TICK_HORIZON,
            warmup_ticks: 0,
            blocked_speed_fraction: 0.5,
            blocked_persistence_threshold: 8,
            jam_cluster_size: 5,
            seed: 0,
            workers: 0,
            check_invariants: cfg!(debug_assertions),
        }
    }
}

impl SimConfig {
    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Safe following distance at the given speed
    pub fn following_distance(&self, speed: f64) -> f64 {
        self.following_base + self.following_headway * speed
    }

    /// Speed under which a vehicle without a lane-change option is blocked
    pub fn blocked_speed_threshold(&self) -> f64 {
        self.blocked_speed_fraction * self.max_speed
    }

    /// Most vehicles the highway can physically hold at `min_gap` spacing
    pub fn capacity(&self) -> usize {
        let per_lane = (self.length / self.min_gap).floor();
        if per_lane.is_finite() && per_lane >= 0.0 {
            self.lane_count.saturating_mul(per_lane as usize)
        } else {
            0
        }
    }

    /// Check every field, failing on the first invalid one
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("length", self.length)?;
        positive("max_speed", self.max_speed)?;
        positive("acceleration", self.acceleration)?;
        positive("min_gap", self.min_gap)?;
        non_negative("following_base", self.following_base)?;
        non_negative("following_headway", self.following_headway)?;
        non_negative("speed_margin", self.speed_margin)?;
        non_negative("passing_lookahead", self.passing_lookahead)?;
        unit_interval("spawn_probability", self.spawn_probability)?;
        unit_interval("speed_variance", self.speed_variance)?;
        unit_interval("blocked_speed_fraction", self.blocked_speed_fraction)?;

        if self.lane_count == 0 || self.lane_count > MAX_LANES {
            return Err(ConfigError::LaneCount {
                value: self.lane_count,
                max: MAX_LANES,
            });
        }

        at_least_min_gap("lane_change_clearance", self.lane_change_clearance, self.min_gap)?;
        at_least_min_gap("spawn_clearance", self.spawn_clearance, self.min_gap)?;

        let capacity = self.capacity();
        if self.num_cars > capacity {
            return Err(ConfigError::OverCapacity {
                num_cars: self.num_cars,
                capacity,
            });
        }

        if self.bad_practice_ratios.is_empty() {
            return Err(ConfigError::EmptySweep);
        }
        for &ratio in &self.bad_practice_ratios {
            unit_interval("bad_practice_ratios", ratio)?;
        }

        if self.num_trials == 0 {
            return Err(ConfigError::Zero { field: "num_trials" });
        }
        if self.tick_horizon == 0 {
            return Err(ConfigError::Zero {
                field: "tick_horizon",
            });
        }
        if self.jam_cluster_size == 0 {
            return Err(ConfigError::Zero {
                field: "jam_cluster_size",
            });
        }

        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { field, value })
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutsideUnitInterval { field, value })
    }
}

fn at_least_min_gap(field: &'static str, value: f64, min_gap: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min_gap {
        Ok(())
    } else {
        Err(ConfigError::BelowMinGap {
            field,
            value,
            min_gap,
        })
    }
}
