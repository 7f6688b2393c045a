//! Trig-cam-capture binary: run a programmed exposure sequence.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trig_cam_capture::sim::{SimCamera, SimProvider};
use trig_cam_capture::{
    discover_with_retries, PersistenceWorker, PgmWriter, PlanPolicy, RunConfig, Sequencer,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Single fastest exposure per repetition, full bracket on fallback.
    Fast,
    /// Every requested exposure per repetition.
    Bracket,
}

impl From<PolicyArg> for PlanPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Fast => Self::FastestWithFallback,
            PolicyArg::Bracket => Self::FullBracket,
        }
    }
}

/// Acquire a programmed sequence of software-triggered exposures.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Exposure times in microseconds, fastest path first (repeatable).
    #[arg(long = "exposure", default_values_t = [100_000.0, 80_000.0, 25_000.0])]
    exposures: Vec<f64>,

    /// Counted frames per burst.
    #[arg(long, default_value_t = 50)]
    num_images: u32,

    /// Sequence repetitions.
    #[arg(long, default_value_t = 1)]
    num_seq: u32,

    /// Exposure plan policy.
    #[arg(long, value_enum, default_value_t = PolicyArg::Fast)]
    policy: PolicyArg,

    /// Directory receiving persisted frames.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Leading component of persisted file names.
    #[arg(long, default_value = "capture")]
    stem: String,

    /// Seconds to wait between device discovery attempts.
    #[arg(long, default_value_t = 10)]
    discovery_wait: u64,

    /// Run against the simulated camera instead of real hardware.
    #[arg(long)]
    simulate: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> trig_cam_capture::Result<()> {
    if !args.simulate {
        return Err(trig_cam_capture::CaptureError::Config {
            reason: "no vendor SDK backend is compiled in; run with --simulate".to_owned(),
        });
    }

    let config = RunConfig {
        exposures_us: args.exposures,
        num_images: args.num_images,
        num_seq: args.num_seq,
        plan_policy: args.policy.into(),
        base_dir: args.output_dir.clone(),
        file_stem: args.stem.clone(),
        discovery_wait: Duration::from_secs(args.discovery_wait),
        ..RunConfig::default()
    };

    info!("image acquisition sequence started");
    let mut provider = SimProvider::with_camera(SimCamera::new());
    let mut camera = discover_with_retries(
        &mut provider,
        config.discovery_tries,
        config.discovery_wait,
    )?;

    let mut worker = PersistenceWorker::spawn(
        PgmWriter,
        config.base_dir.clone(),
        config.file_stem.clone(),
        config.queue_depth,
    );

    let sequencer = Sequencer::new(config)?;
    let result = sequencer.run(&mut camera, &mut worker);
    let written = worker.finish();

    let stats = result?;
    let written = written?;
    info!(
        frames = stats.frames_persisted(),
        written,
        elapsed_s = stats.elapsed.as_secs_f64(),
        "image acquisition sequence completed"
    );
    Ok(())
}
