//! Stance balance controller CLI.
//!
//! - `run`: drive the control cycle on a fixed-period real-time thread
//!   against loopback joints, with a non-real-time thread feeding body
//!   state and contact flags and draining telemetry
//! - `config`: print the default configuration as TOML
//! - `check`: load and validate a configuration file

mod sim;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stance_control::{
    ControlCycle, ControllerConfig, Counters, InputPorts, TelemetrySample, input_channels,
    telemetry_channel,
};
use stance_core::{
    BodyState, ConfigError, ControllerMode, InitError, JointMeasurement, N_LEGS, SnapshotReader,
};
use stance_model::RobotModel;

use crate::sim::{LoopbackJoint, loopback_joints};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Real-time quadruped balance controller.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against simulated joints.
    Run {
        /// Configuration file (TOML). Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of control cycles to run.
        #[arg(short = 'n', long, default_value_t = 10_000)]
        cycles: u64,

        /// Override the control period (s).
        #[arg(short, long)]
        period: Option<f64>,
    },

    /// Print the default configuration.
    Config,

    /// Validate a configuration file.
    Check {
        config: PathBuf,
    },
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Init(#[from] InitError),

    #[error("Cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Cannot spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Thread {0} panicked")]
    Panicked(&'static str),
}

// ---------------------------------------------------------------------------
// Real-time side
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunStats {
    cycles: u64,
    overruns: u64,
    worst: Duration,
    elapsed: Duration,
    mode: ControllerMode,
    transitioned_at: Option<u64>,
    counters: Counters,
}

fn run_cycles(mut cycle: ControlCycle<LoopbackJoint>, cycles: u64, period: Duration) -> RunStats {
    let start = Instant::now();
    let mut next = start;
    let mut overruns = 0;
    let mut worst = Duration::ZERO;

    for _ in 0..cycles {
        let tick = Instant::now();
        let report = cycle.update();
        let took = tick.elapsed();
        worst = worst.max(took);

        if took > period {
            overruns += 1;
            if overruns == 1 {
                warn!(
                    cycle = report.cycle,
                    took_us = u64::try_from(took.as_micros()).unwrap_or(u64::MAX),
                    "Control budget exceeded"
                );
            }
        }

        next += period;
        let now = Instant::now();
        if next > now {
            spin_sleep::sleep(next - now);
        } else {
            // Late: start the next period immediately.
            next = now;
        }
    }

    RunStats {
        cycles: cycle.cycle(),
        overruns,
        worst,
        elapsed: start.elapsed(),
        mode: cycle.mode(),
        transitioned_at: cycle.arbiter().transitioned_at(),
        counters: *cycle.counters(),
    }
}

// ---------------------------------------------------------------------------
// Non-real-time side
// ---------------------------------------------------------------------------

const FEED_INTERVAL: Duration = Duration::from_millis(2);
const TELEMETRY_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Publish a fixed standing estimate and loaded contacts until `stop`;
/// log telemetry at a low rate.
fn feed(
    mut ports: InputPorts,
    telemetry: &SnapshotReader<Option<TelemetrySample>>,
    body: BodyState,
    foot_load: f64,
    stop: &AtomicBool,
) {
    let load = Vector3::new(0.0, 0.0, foot_load);
    let mut last_version = 0;
    let mut last_log = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        ports.body.submit(body);
        for contact in &mut ports.contacts {
            contact.submit_force(&load);
        }

        let latest = telemetry.read();
        if latest.version() != last_version && last_log.elapsed() >= TELEMETRY_LOG_INTERVAL {
            last_version = latest.version();
            last_log = Instant::now();
            if let Some(sample) = latest.as_ref() {
                let total = sample.forces.total();
                info!(
                    cycle = sample.cycle,
                    mode = %sample.mode,
                    fz = total.z,
                    saturated = sample.saturated,
                    solve_failed = sample.solve_failed,
                    "telemetry"
                );
            }
        }

        thread::sleep(FEED_INTERVAL);
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<ControllerConfig, ConfigError> {
    match path {
        Some(path) => ControllerConfig::from_file(path),
        None => Ok(ControllerConfig::default()),
    }
}

fn run(config_path: Option<&Path>, cycles: u64, period: Option<f64>) -> Result<(), AppError> {
    let mut config = load_config(config_path)?;
    if let Some(period) = period {
        config.control.period = period;
        config.validate()?;
    }

    let model = RobotModel::from_specs(&config.legs, config.mpc.gravity)?;
    let names = model.joint_names();
    let gains = config.initial_gains(&names)?;

    // Trunk level at rest with the feet of the zero configuration on the ground.
    let home = model.evaluate(&JointMeasurement::zeros());
    let height = home
        .frames
        .iter()
        .zip(model.hip_offsets())
        .map(|(frame, hip)| -(hip.z + frame.foot_position.z))
        .fold(0.0, f64::max);
    let body = BodyState::at_rest(Vector3::new(0.0, 0.0, height));

    let (ports, inputs) = input_channels(&names, gains, body);
    let (sink, telemetry) = telemetry_channel();
    let joints = loopback_joints(&model, config.control.period);
    let cycle = ControlCycle::new(&config, joints, inputs, Box::new(sink))?;

    #[allow(clippy::cast_precision_loss)]
    let foot_load = config.body.mass * config.mpc.gravity / N_LEGS as f64;
    let period_dur = Duration::from_secs_f64(config.control.period);
    let stop = Arc::new(AtomicBool::new(false));

    info!(cycles, period = config.control.period, height, "Starting control loop");

    let feeder = {
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name("stance-feed".into())
            .spawn(move || feed(ports, &telemetry, body, foot_load, &stop))?
    };
    let realtime = thread::Builder::new()
        .name("stance-rt".into())
        .spawn(move || run_cycles(cycle, cycles, period_dur))?;

    let stats = realtime.join().map_err(|_| AppError::Panicked("stance-rt"));
    stop.store(true, Ordering::Relaxed);
    feeder.join().map_err(|_| AppError::Panicked("stance-feed"))?;
    let stats = stats?;

    let c = &stats.counters;
    println!(
        "cycles={}, elapsed={:.3}s, overruns={}, worst={}us",
        stats.cycles,
        stats.elapsed.as_secs_f64(),
        stats.overruns,
        stats.worst.as_micros()
    );
    println!(
        "mode={}, switched_at={}, solve_failures={}, saturation_events={}, max_solve={}us",
        stats.mode,
        stats
            .transitioned_at
            .map_or_else(|| "-".to_owned(), |k| k.to_string()),
        c.solve_failures,
        c.saturation_events,
        c.max_solve_us
    );
    Ok(())
}

fn print_default_config() -> Result<(), AppError> {
    print!("{}", ControllerConfig::default().to_toml()?);
    Ok(())
}

fn check(path: &Path) -> Result<(), AppError> {
    let config = ControllerConfig::from_file(path)?;
    RobotModel::from_specs(&config.legs, config.mpc.gravity)?;
    println!("{}: ok", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Run {
            config,
            cycles,
            period,
        }) => run(config.as_deref(), cycles, period),
        Some(Commands::Config) => print_default_config(),
        Some(Commands::Check { config }) => check(&config),
        None => run(None, 10_000, None),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
