//! Frame pipeline: one burst of triggered frames at a fixed exposure.
//!
//! Each burst writes the exposure, discards one settling frame (the new
//! setting only takes effect from the following frame), then pulls the
//! counted frames, deriving per-frame statistics and handing each frame
//! off for persistence before requeuing its buffer. A lost frame is fatal
//! for the run; the burst then reports fewer persisted frames than
//! requested instead of silently retrying.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info};

use crate::config::RunConfig;
use crate::error::Result;
use crate::persist::{CapturedFrame, FrameMetadata, FrameSink};
use crate::traits::{controls, ControlValue, FrameBuffer, TriggerCamera};
use crate::trigger::arm_and_fire;

/// Per-frame pixel statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelStats {
    /// Mean pixel value.
    pub mean: f64,
    /// Minimum pixel value.
    pub min: u16,
    /// Maximum pixel value.
    pub max: u16,
}

/// Compute mean/min/max over a raw pixel payload.
#[must_use]
pub fn pixel_stats(pixels: &[u16]) -> PixelStats {
    if pixels.is_empty() {
        return PixelStats {
            mean: 0.0,
            min: 0,
            max: 0,
        };
    }
    let mut min = u16::MAX;
    let mut max = 0u16;
    let mut sum = 0u64;
    for &pixel in pixels {
        min = min.min(pixel);
        max = max.max(pixel);
        sum += u64::from(pixel);
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum as f64 / pixels.len() as f64;
    PixelStats { mean, min, max }
}

/// Accumulated statistics for one `(sequence, exposure level)` burst.
///
/// The mean/min/max fields are running sums over the burst's frames, not
/// averages; this matches the legacy reporting contract.
#[derive(Debug, Clone)]
pub struct BurstStats {
    /// Sequence repetition index, 0-based.
    pub sequence_index: u32,
    /// Exposure level index within the plan, 0-based.
    pub exposure_index: usize,
    /// Exposure duration of this burst in microseconds.
    pub exposure_us: f64,
    /// Counted frames persisted (settling frames excluded).
    pub frames_persisted: u32,
    /// Settling frames acquired and discarded.
    pub settling_discarded: u32,
    /// Sum of per-frame mean pixel values.
    pub mean_sum: f64,
    /// Sum of per-frame minimum pixel values.
    pub min_sum: f64,
    /// Sum of per-frame maximum pixel values.
    pub max_sum: f64,
    /// Wall time spent on the burst.
    pub elapsed: Duration,
}

impl BurstStats {
    fn new(sequence_index: u32, exposure_index: usize, exposure_us: f64) -> Self {
        Self {
            sequence_index,
            exposure_index,
            exposure_us,
            frames_persisted: 0,
            settling_discarded: 0,
            mean_sum: 0.0,
            min_sum: 0.0,
            max_sum: 0.0,
            elapsed: Duration::ZERO,
        }
    }

    fn accumulate(&mut self, stats: PixelStats) {
        self.mean_sum += stats.mean;
        self.min_sum += f64::from(stats.min);
        self.max_sum += f64::from(stats.max);
        self.frames_persisted += 1;
    }
}

/// Acquire one burst at `exposure_us`.
///
/// Returns the burst statistics; on a retrieval failure the partial burst
/// is logged (persisted count is observable) and the error propagates so
/// the sequencer can run its teardown.
pub fn run_burst<C, S>(
    camera: &mut C,
    sink: &mut S,
    exposure_us: f64,
    sequence_index: u32,
    exposure_index: usize,
    config: &RunConfig,
    abort: &AtomicBool,
) -> Result<BurstStats>
where
    C: TriggerCamera,
    S: FrameSink,
{
    let started = Instant::now();
    let mut stats = BurstStats::new(sequence_index, exposure_index, exposure_us);
    info!(
        sequence_index,
        exposure_index,
        exposure_ms = exposure_us / 1000.0,
        "starting burst"
    );

    camera.write_control(controls::EXPOSURE_TIME, ControlValue::Float(exposure_us))?;

    // The device needs one full frame interval to apply the new exposure:
    // acquire and discard exactly one settling frame, unconditionally.
    arm_and_fire(camera, config.trigger_timeout)?;
    let settling = camera.get_buffer(config.buffer_timeout)?;
    camera.requeue_buffer(settling)?;
    stats.settling_discarded += 1;

    for frame_index in 0..config.num_images {
        if abort.load(Ordering::Relaxed) {
            info!(
                sequence_index,
                exposure_index, frame_index, "abort requested, ending burst early"
            );
            break;
        }

        arm_and_fire(camera, config.trigger_timeout)?;
        let buffer = match camera.get_buffer(config.buffer_timeout) {
            Ok(buffer) => buffer,
            Err(err) => {
                error!(
                    sequence_index,
                    exposure_index,
                    frame_index,
                    frames_persisted = stats.frames_persisted,
                    "buffer retrieval failed, burst is short"
                );
                return Err(err);
            }
        };

        let frame_stats = pixel_stats(&buffer.pixels);
        let captured = copy_out(&buffer, exposure_us, sequence_index, exposure_index, frame_index);

        // The buffer must go back to the pool even when the hand-off
        // fails, or the pool starves across the failure path.
        let submitted = sink.submit(captured);
        camera.requeue_buffer(buffer)?;
        submitted?;

        stats.accumulate(frame_stats);
    }

    stats.elapsed = started.elapsed();
    info!(
        sequence_index,
        exposure_index,
        mean_sum = stats.mean_sum,
        min_sum = stats.min_sum,
        max_sum = stats.max_sum,
        elapsed_s = stats.elapsed.as_secs_f64(),
        "burst complete"
    );
    Ok(stats)
}

/// Copy a frame out of its device buffer, attaching acquisition metadata.
/// The copy is what makes the immediate requeue safe.
fn copy_out(
    buffer: &FrameBuffer,
    exposure_us: f64,
    sequence_index: u32,
    exposure_index: usize,
    frame_index: u32,
) -> CapturedFrame {
    CapturedFrame {
        width: buffer.width,
        height: buffer.height,
        bit_depth: buffer.bit_depth,
        pixels: buffer.pixels.clone(),
        metadata: FrameMetadata {
            timestamp: Local::now(),
            exposure_seconds: exposure_us / 1_000_000.0,
            sequence_index,
            exposure_index,
            frame_index,
        },
    }
}
