//! Software trigger arm-and-fire handshake.
//!
//! One cycle per requested frame: poll the device's armed status until it
//! reports ready, then execute the one-shot software trigger. The poll is
//! bounded by a deadline; a device that never arms surfaces
//! [`CaptureError::TriggerTimeout`] instead of spinning forever.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CaptureError, Result};
use crate::traits::{controls, TriggerCamera};

/// Reads between sleeps while polling the armed flag. Arming is normally
/// hardware-paced and quick, so the first reads spin without yielding.
const SPIN_READS: u32 = 64;

/// Sleep slice once the initial spin has not observed an armed device.
const POLL_SLEEP: Duration = Duration::from_micros(100);

/// Wait until the trigger is armed, then fire it.
///
/// Exactly one frame becomes retrievable per successful return; the caller
/// must pair this with a single `get_buffer` before arming again.
pub fn arm_and_fire<C: TriggerCamera>(camera: &mut C, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut reads = 0u32;

    loop {
        let armed = camera
            .read_control(controls::TRIGGER_ARMED)?
            .as_bool()
            .ok_or_else(|| CaptureError::Device {
                reason: format!("{} is not a boolean node", controls::TRIGGER_ARMED),
            })?;
        if armed {
            break;
        }
        if Instant::now() >= deadline {
            return Err(CaptureError::TriggerTimeout { waited: timeout });
        }
        reads += 1;
        if reads > SPIN_READS {
            thread::sleep(POLL_SLEEP);
        }
    }

    camera.execute(controls::TRIGGER_SOFTWARE)
}
