//! Error taxonomy for triggered acquisition runs.
//!
//! Fatal variants abort the run, but the sequencer still restores the
//! device control state and releases the device before propagating them.

use std::time::Duration;

/// Error type for acquisition operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No device answered discovery within the bounded retry budget.
    #[error("no device found after {tries} tries")]
    DeviceNotFound {
        /// Number of discovery attempts made.
        tries: u32,
    },

    /// A required control node is absent from the device's control surface.
    #[error("control node '{name}' not present on device")]
    ControlMissing {
        /// GenICam node name.
        name: String,
    },

    /// A control that must be driven during acquisition is read-only.
    #[error("control node '{name}' is not writable")]
    ControlNotWritable {
        /// GenICam node name.
        name: String,
    },

    /// The trigger never reported armed within the poll deadline.
    #[error("trigger not armed after {waited:?}")]
    TriggerTimeout {
        /// Time spent polling the armed status.
        waited: Duration,
    },

    /// A triggered frame could not be retrieved. The frame is lost; the
    /// burst reports fewer frames than requested rather than retrying.
    #[error("buffer retrieval failed: {reason}")]
    BufferRetrieval {
        /// Driver-reported failure reason.
        reason: String,
    },

    /// The persistence collaborator failed to write a frame to disk.
    #[error("persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    /// SDK-level device fault (control read/write, stream transport).
    #[error("device error: {reason}")]
    Device {
        /// Driver-reported failure reason.
        reason: String,
    },

    /// The run configuration is not acquirable as given.
    #[error("invalid configuration: {reason}")]
    Config {
        /// What the validation rejected.
        reason: String,
    },
}

/// Result type for acquisition operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
