//! Monte-Carlo sweep over bad-practice ratios
//!
//! Every trial gets its own highway and its own RNG stream derived from the
//! base seed, the ratio and the trial index. Results are therefore the same
//! no matter how many workers run them or in which order they finish.

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use super::config::SimConfig;
use super::error::SimError;
use super::highway::SimHighway;
use super::snapshot::TickSnapshot;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Seed of one trial's RNG stream
pub fn trial_seed(base_seed: u64, ratio: f64, trial: usize) -> u64 {
    let ratio_stream = splitmix64(base_seed ^ splitmix64(ratio.to_bits()));
    splitmix64(ratio_stream ^ trial as u64)
}

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub ratio: f64,
    pub trial: usize,
    pub seed: u64,
    pub jam_occurred: bool,
    pub jam_tick: Option<u64>,
    /// Ticks simulated before the run stopped
    pub ticks_run: u64,
    pub peak_blocked: usize,
    pub peak_jammed: usize,
    pub vehicles_created: usize,
    pub vehicles_exited: usize,
}

/// All trials for one ratio and their jam probability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioResult {
    pub ratio: f64,
    pub trials: Vec<TrialResult>,
    pub jammed_trials: usize,
    pub jam_probability: f64,
}

impl RatioResult {
    fn from_trials(ratio: f64, trials: Vec<TrialResult>) -> Self {
        let jammed_trials = trials.iter().filter(|trial| trial.jam_occurred).count();
        let jam_probability = if trials.is_empty() {
            0.0
        } else {
            jammed_trials as f64 / trials.len() as f64
        };
        Self {
            ratio,
            trials,
            jammed_trials,
            jam_probability,
        }
    }

    /// Mean tick of jam onset over the trials that jammed
    pub fn mean_jam_tick(&self) -> Option<f64> {
        let ticks: Vec<u64> = self.trials.iter().filter_map(|trial| trial.jam_tick).collect();
        if ticks.is_empty() {
            None
        } else {
            Some(ticks.iter().sum::<u64>() as f64 / ticks.len() as f64)
        }
    }
}

/// Change in jam probability between two neighbouring ratios
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendStep {
    pub from_ratio: f64,
    pub to_ratio: f64,
    pub change: f64,
}

/// Result of a full sweep, ratios in the configured order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub ratios: Vec<RatioResult>,
}

impl SweepReport {
    /// `(ratio, jam probability)` pairs
    pub fn probabilities(&self) -> Vec<(f64, f64)> {
        self.ratios
            .iter()
            .map(|result| (result.ratio, result.jam_probability))
            .collect()
    }

    pub fn trend(&self) -> Vec<TrendStep> {
        self.ratios
            .windows(2)
            .map(|pair| TrendStep {
                from_ratio: pair[0].ratio,
                to_ratio: pair[1].ratio,
                change: pair[1].jam_probability - pair[0].jam_probability,
            })
            .collect()
    }

    /// True if no step drops the jam probability by more than `tolerance`
    pub fn is_non_decreasing_within(&self, tolerance: f64) -> bool {
        self.trend().iter().all(|step| step.change >= -tolerance)
    }

    /// Jam probability at the last ratio minus the one at the first
    pub fn overall_change(&self) -> f64 {
        match (self.ratios.first(), self.ratios.last()) {
            (Some(first), Some(last)) => last.jam_probability - first.jam_probability,
            _ => 0.0,
        }
    }
}

/// Per-tick history of one run, for animation or inspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub ratio: f64,
    pub seed: u64,
    /// Tick 0 is the initial state
    pub snapshots: Vec<TickSnapshot>,
    pub outcome: TrialResult,
}

/// Runs independent trials for every configured ratio
pub struct TrialRunner {
    config: SimConfig,
}

impl TrialRunner {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Run one trial until a jam is declared or the horizon is reached
    pub fn run_trial(&self, ratio: f64, trial: usize) -> Result<TrialResult, SimError> {
        self.run(ratio, trial, |_| {})
    }

    /// Run one trial and keep a snapshot of every tick
    pub fn trace(&self, ratio: f64, trial: usize) -> Result<RunTrace, SimError> {
        let mut snapshots = Vec::new();
        let outcome = self.run(ratio, trial, |highway| snapshots.push(highway.snapshot()))?;
        Ok(RunTrace {
            ratio,
            seed: outcome.seed,
            snapshots,
            outcome,
        })
    }

    /// Shared trial loop; `observe` sees the initial state and every tick
    fn run(
        &self,
        ratio: f64,
        trial: usize,
        mut observe: impl FnMut(&SimHighway),
    ) -> Result<TrialResult, SimError> {
        let seed = trial_seed(self.config.seed, ratio, trial);
        let mut highway = SimHighway::new(self.config.clone(), ratio, seed)?;
        observe(&highway);

        while highway.tick_count() < self.config.tick_horizon {
            let report = highway
                .step()
                .map_err(|source| SimError::Invariant {
                    ratio,
                    trial,
                    source,
                })?;
            observe(&highway);
            if report.jam_declared {
                break;
            }
        }

        let detector = highway.jam_detector();
        let result = TrialResult {
            ratio,
            trial,
            seed,
            jam_occurred: detector.jam_declared(),
            jam_tick: detector.jam_tick(),
            ticks_run: highway.tick_count(),
            peak_blocked: detector.peak_blocked,
            peak_jammed: detector.peak_jammed,
            vehicles_created: highway.vehicles_created,
            vehicles_exited: highway.vehicles_exited,
        };
        debug!(
            "Trial {} at ratio {:.2}: jam {:?} after {} ticks",
            trial, ratio, result.jam_tick, result.ticks_run
        );
        Ok(result)
    }

    /// Run every trial of every ratio
    ///
    /// The configuration is validated before any trial starts. The first
    /// aborted trial aborts the sweep.
    pub fn sweep(&self) -> Result<SweepReport, SimError> {
        self.config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()?;
        info!(
            "Sweeping {} ratios x {} trials on {} workers",
            self.config.bad_practice_ratios.len(),
            self.config.num_trials,
            pool.current_num_threads()
        );

        let mut ratios = Vec::with_capacity(self.config.bad_practice_ratios.len());
        for &ratio in &self.config.bad_practice_ratios {
            let trials = pool.install(|| {
                (0..self.config.num_trials)
                    .into_par_iter()
                    .map(|trial| self.run_trial(ratio, trial))
                    .collect::<Result<Vec<_>, _>>()
            })?;

            let result = RatioResult::from_trials(ratio, trials);
            info!(
                "Ratio {:.2}: {}/{} trials jammed (p = {:.3})",
                ratio, result.jammed_trials, self.config.num_trials, result.jam_probability
            );
            ratios.push(result);
        }

        Ok(SweepReport { ratios })
    }
}
