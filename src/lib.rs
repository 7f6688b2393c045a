//! Trig-Cam-Capture: software-triggered camera sequence acquisition.
//!
//! This library drives a GenICam-style triggered image sensor through a
//! programmed sequence of exposures for time-critical observational
//! astronomy (e.g. solar eclipse imaging), persisting every frame with
//! accurate metadata. Trait-based abstractions over the camera SDK enable
//! both production use with vendor hardware and deterministic testing with
//! the simulated camera.

pub mod config;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod plan;
pub mod sequencer;
pub mod sim;
pub mod snapshot;
pub mod traits;
pub mod trigger;

pub use config::{PlanPolicy, RunConfig};
pub use error::{CaptureError, Result};
pub use persist::{CapturedFrame, FrameMetadata, FrameSink, FrameWriter, PersistenceWorker, PgmWriter};
pub use pipeline::{pixel_stats, BurstStats, PixelStats};
pub use plan::ExposurePlan;
pub use sequencer::{discover_with_retries, AbortHandle, RunStats, Sequencer};
pub use snapshot::ControlSnapshot;
pub use traits::{controls, ControlValue, DeviceProvider, FrameBuffer, TriggerCamera};
