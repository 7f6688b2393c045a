//! Acquisition sequencer.
//!
//! Drives a whole run: discover the device with bounded retries, snapshot
//! the controls it will mutate, program the trigger and exposure plan,
//! stream the bursts, and restore the snapshot unconditionally at the end.
//! Whatever the acquisition body does, the device never ends a run in a
//! mutated trigger/exposure state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::RunConfig;
use crate::error::{CaptureError, Result};
use crate::persist::FrameSink;
use crate::pipeline::{run_burst, BurstStats};
use crate::plan::ExposurePlan;
use crate::snapshot::ControlSnapshot;
use crate::traits::{controls, ControlValue, DeviceProvider, TriggerCamera};

/// Controls captured before mutation; restore runs in this order, putting
/// the exposure settings back before the trigger mode comes off.
const SNAPSHOT_CONTROLS: [&str; 5] = [
    controls::EXPOSURE_TIME,
    controls::EXPOSURE_AUTO,
    controls::TRIGGER_SELECTOR,
    controls::TRIGGER_SOURCE,
    controls::TRIGGER_MODE,
];

/// Cooperative cancellation flag, checked between frames and levels.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Request that the run end at the next check point. Teardown still
    /// runs.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Result of a completed (or aborted) run.
#[derive(Debug)]
pub struct RunStats {
    /// The resolved exposure plan the run executed.
    pub plan: ExposurePlan,
    /// Per-burst statistics in acquisition order.
    pub bursts: Vec<BurstStats>,
    /// Total wall time from first control write to teardown start.
    pub elapsed: Duration,
    /// True when the run ended on an abort request.
    pub aborted: bool,
}

impl RunStats {
    /// Total counted frames persisted across all bursts.
    #[must_use]
    pub fn frames_persisted(&self) -> u64 {
        self.bursts
            .iter()
            .map(|burst| u64::from(burst.frames_persisted))
            .sum()
    }
}

/// Obtain one capture device, waiting for it to be connected.
///
/// Each empty enumeration sleeps `wait` (reported in one-second slices for
/// operator feedback) before re-querying, up to `tries` enumerations.
pub fn discover_with_retries<P: DeviceProvider>(
    provider: &mut P,
    tries: u32,
    wait: Duration,
) -> Result<P::Device> {
    for attempt in 1..=tries {
        let mut devices = provider.create_devices()?;
        if !devices.is_empty() {
            info!(attempt, "device found");
            return Ok(devices.remove(0));
        }
        if attempt == tries {
            break;
        }
        info!(
            attempt,
            tries,
            wait_s = wait.as_secs_f64(),
            "no device connected yet, waiting"
        );
        let mut remaining = wait;
        let mut waited = Duration::ZERO;
        while remaining > Duration::ZERO {
            let slice = remaining.min(Duration::from_secs(1));
            thread::sleep(slice);
            waited += slice;
            remaining -= slice;
            info!(waited_s = waited.as_secs_f64(), "still waiting for device");
        }
    }
    Err(CaptureError::DeviceNotFound { tries })
}

/// Orchestrates one acquisition run over a discovered device.
#[derive(Debug)]
pub struct Sequencer {
    config: RunConfig,
    abort: AbortHandle,
}

impl Sequencer {
    /// Create a sequencer for a validated configuration.
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            abort: AbortHandle::default(),
        })
    }

    /// Handle for cooperative cancellation from another thread.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Execute the run against a device, handing frames to `sink`.
    ///
    /// The control snapshot is restored even when the acquisition body
    /// fails; a body error takes precedence over a restore error.
    pub fn run<C, S>(&self, camera: &mut C, sink: &mut S) -> Result<RunStats>
    where
        C: TriggerCamera,
        S: FrameSink,
    {
        let snapshot = ControlSnapshot::capture(camera, &SNAPSHOT_CONTROLS)?;

        let body = self.acquire(camera, sink);

        let restore = snapshot.restore(camera);
        if let Err(err) = &restore {
            warn!(%err, "control restore failed");
        }
        match body {
            Ok(stats) => restore.map(|()| stats),
            Err(err) => Err(err),
        }
    }

    fn acquire<C, S>(&self, camera: &mut C, sink: &mut S) -> Result<RunStats>
    where
        C: TriggerCamera,
        S: FrameSink,
    {
        let config = &self.config;
        let started = Instant::now();

        info!("preparing trigger mode");
        camera.write_control(
            controls::TRIGGER_SELECTOR,
            ControlValue::Str("FrameStart".to_owned()),
        )?;
        camera.write_control(controls::TRIGGER_MODE, ControlValue::Str("On".to_owned()))?;
        camera.write_control(
            controls::TRIGGER_SOURCE,
            ControlValue::Str("Software".to_owned()),
        )?;
        camera.write_control(controls::FRAME_RATE_ENABLE, ControlValue::Bool(true))?;

        let exposure_bounds = camera.control_bounds(controls::EXPOSURE_TIME)?;
        let rate_bounds = camera.control_bounds(controls::FRAME_RATE)?;
        let plan = ExposurePlan::build(
            &config.exposures_us,
            config.plan_policy,
            exposure_bounds,
            rate_bounds,
        )?;
        camera.write_control(controls::FRAME_RATE, ControlValue::Float(plan.frame_rate_hz))?;
        info!(frame_rate_hz = plan.frame_rate_hz, levels = plan.levels(), "plan resolved");

        info!("disabling auto exposure");
        camera.write_control(controls::EXPOSURE_AUTO, ControlValue::Str("Off".to_owned()))?;
        camera.write_control(
            controls::PIXEL_FORMAT,
            ControlValue::Str(config.pixel_format.clone()),
        )?;

        // Fail fast: never start a stream that cannot be driven.
        for name in [controls::EXPOSURE_TIME, controls::TRIGGER_SOFTWARE] {
            if !camera.control_writable(name)? {
                return Err(CaptureError::ControlNotWritable {
                    name: name.to_owned(),
                });
            }
        }

        camera.start_stream()?;
        let body = self.stream_sequences(camera, sink, &plan);
        let stop = camera.stop_stream();

        let bursts = body?;
        stop?;

        let aborted = self.abort.is_aborted();
        let stats = RunStats {
            plan,
            bursts,
            elapsed: started.elapsed(),
            aborted,
        };
        info!(
            frames = stats.frames_persisted(),
            elapsed_s = stats.elapsed.as_secs_f64(),
            aborted,
            "acquisition finished"
        );
        Ok(stats)
    }

    fn stream_sequences<C, S>(
        &self,
        camera: &mut C,
        sink: &mut S,
        plan: &ExposurePlan,
    ) -> Result<Vec<BurstStats>>
    where
        C: TriggerCamera,
        S: FrameSink,
    {
        let config = &self.config;
        let mut bursts = Vec::new();

        'sequences: for seq in 0..config.num_seq {
            info!(seq, "starting sequence");
            let seq_start = Instant::now();

            for (level, &exposure_us) in plan.exposures_us.iter().enumerate() {
                if self.abort.is_aborted() {
                    info!(seq, level, "abort requested, skipping remaining levels");
                    break 'sequences;
                }
                let stats = run_burst(
                    camera,
                    sink,
                    exposure_us,
                    seq,
                    level,
                    config,
                    self.abort.flag(),
                )?;
                bursts.push(stats);
            }

            info!(
                seq,
                elapsed_s = seq_start.elapsed().as_secs_f64(),
                "sequence complete"
            );
        }

        Ok(bursts)
    }
}
