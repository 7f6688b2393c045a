//! Deterministic simulated camera.
//!
//! Implements [`TriggerCamera`] with a full control table, a finite buffer
//! pool, and a strict trigger state machine, for tests and `--simulate`
//! runs without hardware. The state machine enforces the real device's
//! protocol: a frame can only be retrieved after a trigger fire, only one
//! trigger may be outstanding, and retrieved buffers must be requeued
//! before the pool drains.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{CaptureError, Result};
use crate::traits::{controls, ControlValue, DeviceProvider, FrameBuffer, TriggerCamera};

/// One simulated control node.
#[derive(Debug, Clone)]
struct SimControl {
    value: ControlValue,
    min: f64,
    max: f64,
    writable: bool,
    command: bool,
}

impl SimControl {
    fn value(value: ControlValue) -> Self {
        Self {
            value,
            min: 0.0,
            max: 0.0,
            writable: true,
            command: false,
        }
    }

    fn bounded(value: f64, min: f64, max: f64) -> Self {
        Self {
            value: ControlValue::Float(value),
            min,
            max,
            writable: true,
            command: false,
        }
    }

    fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    const fn command() -> Self {
        Self {
            value: ControlValue::Bool(false),
            min: 0.0,
            max: 0.0,
            writable: true,
            command: true,
        }
    }
}

/// Builder for [`SimCamera`].
#[derive(Debug)]
pub struct SimCameraBuilder {
    width: u32,
    height: u32,
    pool_size: u32,
    exposure_bounds: (f64, f64),
    rate_bounds: (f64, f64),
    removed: Vec<String>,
    read_only: Vec<String>,
    fail_buffer_after: Option<u64>,
}

impl Default for SimCameraBuilder {
    fn default() -> Self {
        Self {
            width: 64,
            height: 48,
            pool_size: 4,
            exposure_bounds: (10.0, 200_000.0),
            rate_bounds: (0.1, 100.0),
            removed: Vec::new(),
            read_only: Vec::new(),
            fail_buffer_after: None,
        }
    }
}

impl SimCameraBuilder {
    /// Set the simulated sensor dimensions.
    #[must_use]
    pub const fn dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the transport buffer pool size.
    #[must_use]
    pub const fn pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the device-reported `ExposureTime` bounds in microseconds.
    #[must_use]
    pub const fn exposure_bounds(mut self, min: f64, max: f64) -> Self {
        self.exposure_bounds = (min, max);
        self
    }

    /// Set the device-reported `AcquisitionFrameRate` bounds in Hz.
    #[must_use]
    pub const fn rate_bounds(mut self, min: f64, max: f64) -> Self {
        self.rate_bounds = (min, max);
        self
    }

    /// Remove a control from the device's surface entirely.
    #[must_use]
    pub fn without_control(mut self, name: &str) -> Self {
        self.removed.push(name.to_owned());
        self
    }

    /// Mark a control read-only.
    #[must_use]
    pub fn read_only_control(mut self, name: &str) -> Self {
        self.read_only.push(name.to_owned());
        self
    }

    /// Let the first `count` buffer retrievals succeed, then fail every
    /// later one.
    #[must_use]
    pub const fn fail_buffer_after(mut self, count: u64) -> Self {
        self.fail_buffer_after = Some(count);
        self
    }

    /// Build the simulated camera.
    #[must_use]
    pub fn build(self) -> SimCamera {
        let (exp_min, exp_max) = self.exposure_bounds;
        let (rate_min, rate_max) = self.rate_bounds;
        let mut table = HashMap::new();
        table.insert(
            controls::TRIGGER_MODE.to_owned(),
            SimControl::value(ControlValue::Str("Off".to_owned())),
        );
        table.insert(
            controls::TRIGGER_SOURCE.to_owned(),
            SimControl::value(ControlValue::Str("Line0".to_owned())),
        );
        table.insert(
            controls::TRIGGER_SELECTOR.to_owned(),
            SimControl::value(ControlValue::Str("FrameStart".to_owned())),
        );
        table.insert(controls::TRIGGER_SOFTWARE.to_owned(), SimControl::command());
        table.insert(
            controls::TRIGGER_ARMED.to_owned(),
            SimControl::value(ControlValue::Bool(false)).read_only(),
        );
        table.insert(
            controls::EXPOSURE_AUTO.to_owned(),
            SimControl::value(ControlValue::Str("Continuous".to_owned())),
        );
        table.insert(
            controls::EXPOSURE_TIME.to_owned(),
            SimControl::bounded(100_000.0, exp_min, exp_max),
        );
        table.insert(
            controls::PIXEL_FORMAT.to_owned(),
            SimControl::value(ControlValue::Str("Mono8".to_owned())),
        );
        table.insert(
            controls::FRAME_RATE_ENABLE.to_owned(),
            SimControl::value(ControlValue::Bool(false)),
        );
        table.insert(
            controls::FRAME_RATE.to_owned(),
            SimControl::bounded(10.0, rate_min, rate_max),
        );
        table.insert(
            "Width".to_owned(),
            SimControl::value(ControlValue::Int(i64::from(self.width))).read_only(),
        );
        table.insert(
            "Height".to_owned(),
            SimControl::value(ControlValue::Int(i64::from(self.height))).read_only(),
        );

        for name in &self.removed {
            table.remove(name);
        }
        for name in &self.read_only {
            if let Some(control) = table.get_mut(name) {
                control.writable = false;
            }
        }

        SimCamera {
            table,
            width: self.width,
            height: self.height,
            pool_size: self.pool_size,
            fail_buffer_after: self.fail_buffer_after,
            streaming: false,
            pending_frames: 0,
            outstanding: 0,
            frame_counter: 0,
            trigger_fires: 0,
            retrievals: 0,
        }
    }
}

/// Simulated software-triggerable camera.
#[derive(Debug)]
pub struct SimCamera {
    table: HashMap<String, SimControl>,
    width: u32,
    height: u32,
    pool_size: u32,
    fail_buffer_after: Option<u64>,
    streaming: bool,
    pending_frames: u32,
    outstanding: u32,
    frame_counter: u64,
    trigger_fires: u64,
    retrievals: u64,
}

impl Default for SimCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCamera {
    /// Create a simulated camera with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a customized simulated camera.
    #[must_use]
    pub fn builder() -> SimCameraBuilder {
        SimCameraBuilder::default()
    }

    /// Total successful trigger fires so far.
    #[must_use]
    pub const fn trigger_fires(&self) -> u64 {
        self.trigger_fires
    }

    /// Total successful buffer retrievals so far.
    #[must_use]
    pub const fn retrievals(&self) -> u64 {
        self.retrievals
    }

    /// Buffers currently held by the consumer.
    #[must_use]
    pub const fn outstanding_buffers(&self) -> u32 {
        self.outstanding
    }

    fn control(&self, name: &str) -> Result<&SimControl> {
        self.table
            .get(name)
            .ok_or_else(|| CaptureError::ControlMissing {
                name: name.to_owned(),
            })
    }

    fn trigger_mode_on(&self) -> bool {
        self.table
            .get(controls::TRIGGER_MODE)
            .map_or(false, |control| {
                matches!(&control.value, ControlValue::Str(mode) if mode == "On")
            })
    }

    /// Device-paced readiness: armed once streaming with software trigger
    /// enabled, no trigger outstanding, and pool capacity for one more
    /// frame.
    fn armed(&self) -> bool {
        self.streaming
            && self.trigger_mode_on()
            && self.pending_frames == 0
            && self.outstanding < self.pool_size
    }

    fn exposure_us(&self) -> f64 {
        self.table
            .get(controls::EXPOSURE_TIME)
            .and_then(|control| control.value.as_f64())
            .unwrap_or(0.0)
    }

    /// 12-bit gradient whose floor scales with the programmed exposure, so
    /// frame statistics respond to exposure changes.
    fn generate_frame(&mut self) -> FrameBuffer {
        let (_, exp_max) = self
            .table
            .get(controls::EXPOSURE_TIME)
            .map_or((10.0, 200_000.0), |control| (control.min, control.max));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let floor = ((self.exposure_us() / exp_max) * 2048.0).min(2048.0) as u16;

        let mut pixels = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                #[allow(clippy::cast_possible_truncation)]
                let ramp = ((x + y) & 0x3FF) as u16;
                pixels.push((floor + ramp).min(4095));
            }
        }

        self.frame_counter += 1;
        FrameBuffer {
            width: self.width,
            height: self.height,
            bit_depth: 12,
            pixels,
            timestamp_ns: self.frame_counter * 1_000_000,
        }
    }
}

impl TriggerCamera for SimCamera {
    fn read_control(&self, name: &str) -> Result<ControlValue> {
        if name == controls::TRIGGER_ARMED {
            self.control(name)?;
            return Ok(ControlValue::Bool(self.armed()));
        }
        Ok(self.control(name)?.value.clone())
    }

    fn write_control(&mut self, name: &str, value: ControlValue) -> Result<()> {
        let control = self
            .table
            .get_mut(name)
            .ok_or_else(|| CaptureError::ControlMissing {
                name: name.to_owned(),
            })?;
        if !control.writable {
            return Err(CaptureError::ControlNotWritable {
                name: name.to_owned(),
            });
        }
        control.value = value;
        Ok(())
    }

    fn control_bounds(&self, name: &str) -> Result<(f64, f64)> {
        let control = self.control(name)?;
        Ok((control.min, control.max))
    }

    fn control_writable(&self, name: &str) -> Result<bool> {
        Ok(self.control(name)?.writable)
    }

    fn execute(&mut self, name: &str) -> Result<()> {
        let control = self.control(name)?;
        if !control.command {
            return Err(CaptureError::Device {
                reason: format!("'{name}' is not a command node"),
            });
        }
        if !control.writable {
            return Err(CaptureError::ControlNotWritable {
                name: name.to_owned(),
            });
        }
        if name == controls::TRIGGER_SOFTWARE {
            if !self.armed() {
                return Err(CaptureError::Device {
                    reason: "software trigger fired while not armed".to_owned(),
                });
            }
            self.pending_frames += 1;
            self.trigger_fires += 1;
        }
        Ok(())
    }

    fn start_stream(&mut self) -> Result<()> {
        if self.streaming {
            return Err(CaptureError::Device {
                reason: "stream already started".to_owned(),
            });
        }
        self.streaming = true;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.streaming = false;
        self.pending_frames = 0;
        Ok(())
    }

    fn get_buffer(&mut self, _timeout: Duration) -> Result<FrameBuffer> {
        if !self.streaming {
            return Err(CaptureError::BufferRetrieval {
                reason: "device is not streaming".to_owned(),
            });
        }
        if let Some(limit) = self.fail_buffer_after {
            if self.retrievals >= limit {
                return Err(CaptureError::BufferRetrieval {
                    reason: "simulated transport failure".to_owned(),
                });
            }
        }
        if self.pending_frames == 0 {
            // No preceding trigger fire: nothing will ever arrive.
            return Err(CaptureError::BufferRetrieval {
                reason: "no triggered frame available before timeout".to_owned(),
            });
        }
        if self.outstanding >= self.pool_size {
            return Err(CaptureError::BufferRetrieval {
                reason: "buffer pool exhausted".to_owned(),
            });
        }
        self.pending_frames -= 1;
        self.outstanding += 1;
        self.retrievals += 1;
        Ok(self.generate_frame())
    }

    fn requeue_buffer(&mut self, buffer: FrameBuffer) -> Result<()> {
        drop(buffer);
        if self.outstanding == 0 {
            return Err(CaptureError::Device {
                reason: "requeue without an outstanding buffer".to_owned(),
            });
        }
        self.outstanding -= 1;
        Ok(())
    }
}

/// Discovery provider yielding prepared simulated cameras, optionally
/// after a number of empty results (for bounded-retry tests).
#[derive(Debug, Default)]
pub struct SimProvider {
    cameras: Vec<SimCamera>,
    empty_results: u32,
    calls: u32,
}

impl SimProvider {
    /// Provider that immediately yields the given camera.
    #[must_use]
    pub fn with_camera(camera: SimCamera) -> Self {
        Self {
            cameras: vec![camera],
            empty_results: 0,
            calls: 0,
        }
    }

    /// Report no devices for the first `count` enumeration calls.
    #[must_use]
    pub const fn empty_results(mut self, count: u32) -> Self {
        self.empty_results = count;
        self
    }

    /// Number of enumeration calls made so far.
    #[must_use]
    pub const fn calls(&self) -> u32 {
        self.calls
    }
}

impl DeviceProvider for SimProvider {
    type Device = SimCamera;

    fn create_devices(&mut self) -> Result<Vec<SimCamera>> {
        self.calls += 1;
        if self.calls <= self.empty_results {
            return Ok(Vec::new());
        }
        Ok(std::mem::take(&mut self.cameras))
    }
}
