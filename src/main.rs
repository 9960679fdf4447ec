use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::fs;
use std::path::PathBuf;

use highway_sim::simulation::{SimConfig, SimHighway, SweepReport, TrialRunner};

#[derive(Parser)]
#[command(name = "highway_sim")]
#[command(about = "Highway lane-discipline simulation and jam-probability sweep")]
struct Cli {
    /// JSON configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Highway length in distance units
    #[arg(long)]
    length: Option<f64>,

    /// Target number of active vehicles
    #[arg(long)]
    num_cars: Option<usize>,

    /// Per-tick spawn probability
    #[arg(long)]
    spawn_probability: Option<f64>,

    /// Trials per bad-practice ratio
    #[arg(long)]
    trials: Option<usize>,

    /// Tick horizon of each trial
    #[arg(long)]
    horizon: Option<u64>,

    /// Comma-separated bad-practice ratios to sweep
    #[arg(long, value_delimiter = ',')]
    ratios: Option<Vec<f64>>,

    /// Base seed for every trial
    #[arg(long)]
    seed: Option<u64>,

    /// Trial worker threads, 0 for one per core
    #[arg(long)]
    workers: Option<usize>,

    /// Write the per-tick trace of one run to this JSON file
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Bad-practice ratio of the traced or watched run
    #[arg(long, default_value = "1.0")]
    trace_ratio: f64,

    /// Watch a single run in the terminal instead of sweeping
    #[arg(long)]
    watch: bool,

    /// Ticks to run in watch mode
    #[arg(long, default_value = "300")]
    watch_ticks: u64,

    /// Ticks between frames in watch mode
    #[arg(long, default_value = "20")]
    watch_interval: u64,

    /// Pause between frames in watch mode, in milliseconds
    #[arg(long, default_value = "200")]
    frame_delay_ms: u64,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    if cli.watch {
        return run_watch(config, &cli);
    }

    let runner = TrialRunner::new(config);
    let report = runner.sweep().context("sweep aborted")?;
    log_report(&report);
    print_report(&report);

    if let Some(path) = &cli.trace_out {
        let trace = runner
            .trace(cli.trace_ratio, 0)
            .context("traced run aborted")?;
        let json = serde_json::to_string(&trace).context("failed to serialize trace")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        info!(
            "Wrote {} snapshots of ratio {:.2} to {}",
            trace.snapshots.len(),
            cli.trace_ratio,
            path.display()
        );
    }

    Ok(())
}

/// Defaults, then the config file, then command-line overrides
fn build_config(cli: &Cli) -> Result<SimConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SimConfig::from_json_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => SimConfig::default(),
    };

    if let Some(length) = cli.length {
        config.length = length;
    }
    if let Some(num_cars) = cli.num_cars {
        config.num_cars = num_cars;
    }
    if let Some(spawn_probability) = cli.spawn_probability {
        config.spawn_probability = spawn_probability;
    }
    if let Some(trials) = cli.trials {
        config.num_trials = trials;
    }
    if let Some(horizon) = cli.horizon {
        config.tick_horizon = horizon;
    }
    if let Some(ratios) = &cli.ratios {
        config.bad_practice_ratios = ratios.clone();
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Run one highway in the terminal, printing a frame every few ticks
fn run_watch(config: SimConfig, cli: &Cli) -> Result<()> {
    let seed = config.seed;
    let mut highway =
        SimHighway::new(config, cli.trace_ratio, seed).context("invalid configuration")?;
    let interval = cli.watch_interval.max(1);

    println!("Initial state:");
    highway.print_summary();
    highway.draw_lanes(100);

    while highway.tick_count() < cli.watch_ticks {
        let report = highway.step().context("run aborted")?;
        if report.jam_declared {
            info!("Jam declared at tick {}", report.tick);
        }

        if highway.tick_count() % interval == 0 {
            println!("--- After tick {} ---", highway.tick_count());
            highway.print_summary();
            highway.draw_lanes(100);
            if cli.frame_delay_ms > 0 && highway.tick_count() < cli.watch_ticks {
                std::thread::sleep(std::time::Duration::from_millis(cli.frame_delay_ms));
            }
        }
    }

    println!("=== Final State ===");
    highway.print_summary();
    highway.draw_lanes(100);
    Ok(())
}

fn log_report(report: &SweepReport) {
    info!("=== SWEEP COMPLETE ===");
    for result in &report.ratios {
        info!(
            "Jam probability at ratio {:.2}: {:.3} ({}/{})",
            result.ratio,
            result.jam_probability,
            result.jammed_trials,
            result.trials.len()
        );
    }
    info!("Overall change: {:+.3}", report.overall_change());
}

fn print_report(report: &SweepReport) {
    println!("{:>6} {:>8} {:>8} {:>14}", "ratio", "jammed", "p(jam)", "mean jam tick");
    for result in &report.ratios {
        let mean_tick = result
            .mean_jam_tick()
            .map(|tick| format!("{:.1}", tick))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6.2} {:>8} {:>8.3} {:>14}",
            result.ratio,
            result.jammed_trials,
            result.jam_probability,
            mean_tick
        );
    }

    println!();
    println!("Trend:");
    for step in report.trend() {
        println!(
            "  {:.2} -> {:.2}: {:+.3}",
            step.from_ratio, step.to_ratio, step.change
        );
    }
    if report.is_non_decreasing_within(0.05) {
        println!("Jam probability rises with the bad-practice ratio");
    } else {
        println!("Jam probability is not monotone in the bad-practice ratio");
    }
}
