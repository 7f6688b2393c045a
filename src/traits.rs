//! Core traits and types for triggered-camera abstraction.
//!
//! The camera SDK (device enumeration, node map access, buffer transport)
//! lives behind [`TriggerCamera`] and [`DeviceProvider`], enabling both
//! production use with a vendor SDK binding and deterministic testing with
//! the simulated camera in [`crate::sim`].

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Well-known GenICam control node names driven during a run.
pub mod controls {
    /// Trigger on/off switch.
    pub const TRIGGER_MODE: &str = "TriggerMode";
    /// Trigger signal origin (set to `Software` for this crate).
    pub const TRIGGER_SOURCE: &str = "TriggerSource";
    /// Which acquisition event the trigger gates (`FrameStart`).
    pub const TRIGGER_SELECTOR: &str = "TriggerSelector";
    /// One-shot command node that fires the software trigger.
    pub const TRIGGER_SOFTWARE: &str = "TriggerSoftware";
    /// Read-only readiness flag; true once the device will honor a fire.
    pub const TRIGGER_ARMED: &str = "TriggerArmed";
    /// Automatic exposure mode (disabled for programmed sequences).
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    /// Exposure duration in microseconds.
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    /// Sensor readout format (e.g. `Mono12`).
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    /// Enables the explicit frame-rate limit.
    pub const FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
    /// Frame-rate limit in Hz.
    pub const FRAME_RATE: &str = "AcquisitionFrameRate";
}

/// A single device control value.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    /// Boolean switch node.
    Bool(bool),
    /// Integer node.
    Int(i64),
    /// Floating-point node (exposure times, frame rates).
    Float(f64),
    /// Enumeration node, carried as its symbolic entry name.
    Str(String),
}

impl ControlValue {
    /// Interpret this value as a boolean, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Interpret this value as a float, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// One retrieved device buffer.
///
/// The pixel payload is owned by the device's buffer pool: a `FrameBuffer`
/// is only valid until it is handed back via
/// [`TriggerCamera::requeue_buffer`], and every retrieved buffer must be
/// handed back before the next trigger cycle or the finite pool starves.
/// Consumers copy pixels out before the requeue.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Significant bits per pixel (12 for `Mono12` in a 16-bit container).
    pub bit_depth: u8,
    /// Raw pixel payload, row-major, one `u16` per pixel.
    pub pixels: Vec<u16>,
    /// Device-clock timestamp in nanoseconds.
    pub timestamp_ns: u64,
}

/// Abstraction over one connected software-triggerable camera.
///
/// The protocol is strictly sequential: the device honors one outstanding
/// software trigger and one in-flight control change at a time, so a
/// `get_buffer` call must be paired with the immediately preceding
/// successful trigger fire.
pub trait TriggerCamera {
    /// Read the current value of a named control node.
    fn read_control(&self, name: &str) -> Result<ControlValue>;

    /// Write a value to a named control node.
    fn write_control(&mut self, name: &str, value: ControlValue) -> Result<()>;

    /// Device-reported `[min, max]` bounds of a numeric control.
    fn control_bounds(&self, name: &str) -> Result<(f64, f64)>;

    /// Whether a named control accepts writes (or command execution).
    fn control_writable(&self, name: &str) -> Result<bool>;

    /// Execute a one-shot command node (e.g. the software trigger).
    fn execute(&mut self, name: &str) -> Result<()>;

    /// Begin streaming; buffers become retrievable after trigger fires.
    fn start_stream(&mut self) -> Result<()>;

    /// End streaming and reclaim transport resources.
    fn stop_stream(&mut self) -> Result<()>;

    /// Retrieve the frame produced by the most recent trigger fire,
    /// blocking up to `timeout`.
    fn get_buffer(&mut self, timeout: Duration) -> Result<FrameBuffer>;

    /// Return a buffer to the device pool, consuming it.
    fn requeue_buffer(&mut self, buffer: FrameBuffer) -> Result<()>;
}

/// Ambient capability that enumerates connected devices.
pub trait DeviceProvider {
    /// Concrete camera type produced by this provider.
    type Device: TriggerCamera;

    /// Enumerate currently connected devices; an empty vector means none
    /// are attached yet (the caller may retry).
    fn create_devices(&mut self) -> Result<Vec<Self::Device>>;
}
