//! Jam detection for a single run
//!
//! A jam is declared the first tick at which enough vehicles are jammed at
//! once. The declaration is one-way: later recovery does not undo it.

use log::debug;

use super::config::SimConfig;
use super::vehicle::{SimVehicle, VehicleStatus};

/// Counts for one observed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JamObservation {
    pub blocked: usize,
    pub jammed: usize,
    /// True only on the tick the jam is first declared
    pub newly_declared: bool,
}

/// Run-scoped jam detector state
#[derive(Debug, Clone, Default)]
pub struct JamDetector {
    persistence_threshold: u32,
    cluster_size: usize,
    warmup_ticks: u64,
    /// Vehicles blocked in the last observed tick
    pub blocked_count: usize,
    /// Vehicles jammed in the last observed tick
    pub jammed_count: usize,
    /// Consecutive ticks the jammed count has reached the cluster size
    pub consecutive_jam_ticks: u64,
    pub peak_blocked: usize,
    pub peak_jammed: usize,
    jam_tick: Option<u64>,
}

impl JamDetector {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            persistence_threshold: config.blocked_persistence_threshold,
            cluster_size: config.jam_cluster_size,
            warmup_ticks: config.warmup_ticks,
            ..Default::default()
        }
    }

    /// Tick of the first jam, if one has been declared
    pub fn jam_tick(&self) -> Option<u64> {
        self.jam_tick
    }

    pub fn jam_declared(&self) -> bool {
        self.jam_tick.is_some()
    }

    /// Look at the committed vehicles of `tick` and update the jam signal
    pub fn observe<'a>(
        &mut self,
        tick: u64,
        vehicles: impl IntoIterator<Item = &'a SimVehicle>,
    ) -> JamObservation {
        let mut blocked = 0;
        let mut jammed = 0;
        for vehicle in vehicles {
            match vehicle.status(self.persistence_threshold) {
                VehicleStatus::Normal => {}
                VehicleStatus::Blocked => blocked += 1,
                VehicleStatus::Jammed => {
                    blocked += 1;
                    jammed += 1;
                }
            }
        }

        self.blocked_count = blocked;
        self.jammed_count = jammed;
        self.peak_blocked = self.peak_blocked.max(blocked);
        self.peak_jammed = self.peak_jammed.max(jammed);

        let cluster_present = jammed >= self.cluster_size;
        if cluster_present {
            self.consecutive_jam_ticks += 1;
        } else {
            self.consecutive_jam_ticks = 0;
        }

        let newly_declared =
            self.jam_tick.is_none() && cluster_present && tick >= self.warmup_ticks;
        if newly_declared {
            debug!(
                "Jam declared at tick {}: {} jammed, {} blocked",
                tick, jammed, blocked
            );
            self.jam_tick = Some(tick);
        }

        JamObservation {
            blocked,
            jammed,
            newly_declared,
        }
    }
}
