//! Control node snapshot and restore.
//!
//! Every control mutated during a run is captured here first, and the
//! sequencer restores the whole record unconditionally at run end, so the
//! device never ends a run in a mutated trigger or exposure state.

use tracing::debug;

use crate::error::Result;
use crate::traits::{ControlValue, TriggerCamera};

/// Immutable record of control values captured before mutation.
#[derive(Debug, Clone)]
pub struct ControlSnapshot {
    values: Vec<(String, ControlValue)>,
}

impl ControlSnapshot {
    /// Read each named control, in order, before any mutation.
    ///
    /// A control absent from the device's surface fails the capture (and
    /// therefore the run) before anything has been written.
    pub fn capture<C: TriggerCamera>(camera: &C, names: &[&str]) -> Result<Self> {
        let mut values = Vec::with_capacity(names.len());
        for &name in names {
            let value = camera.read_control(name)?;
            debug!(name, %value, "captured control");
            values.push((name.to_owned(), value));
        }
        Ok(Self { values })
    }

    /// Write every captured value back in capture order.
    pub fn restore<C: TriggerCamera>(&self, camera: &mut C) -> Result<()> {
        for (name, value) in &self.values {
            camera.write_control(name, value.clone())?;
            debug!(name, %value, "restored control");
        }
        Ok(())
    }

    /// Captured value of a named control, if present in the record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ControlValue> {
        self.values
            .iter()
            .find(|(captured, _)| captured == name)
            .map(|(_, value)| value)
    }

    /// Control names in capture order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}
