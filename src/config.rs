//! Immutable run configuration.
//!
//! All acquisition parameters are known before the run starts and are
//! passed into the sequencer as one value; nothing is read from ambient
//! state mid-run.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CaptureError, Result};

/// How the exposure plan treats the requested exposure list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanPolicy {
    /// Acquire only the first (fastest) exposure per sequence repetition;
    /// fall back to the full bracket when that exposure is infeasible at
    /// the device's limits.
    #[default]
    FastestWithFallback,
    /// Always cycle through every requested exposure per repetition.
    FullBracket,
}

/// Parameters for one acquisition run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Requested exposure durations in microseconds, fastest path first.
    pub exposures_us: Vec<f64>,
    /// Counted frames per burst (settling frames excluded).
    pub num_images: u32,
    /// Sequence repetitions.
    pub num_seq: u32,
    /// Exposure plan policy.
    pub plan_policy: PlanPolicy,
    /// Directory receiving persisted frames.
    pub base_dir: PathBuf,
    /// Leading component of every persisted file name.
    pub file_stem: String,
    /// Sensor readout format written to `PixelFormat`.
    pub pixel_format: String,
    /// Discovery attempts before giving up.
    pub discovery_tries: u32,
    /// Wait between discovery attempts.
    pub discovery_wait: Duration,
    /// Deadline for the trigger-armed poll.
    pub trigger_timeout: Duration,
    /// Deadline for retrieving a triggered frame.
    pub buffer_timeout: Duration,
    /// Bound of the persistence hand-off queue.
    pub queue_depth: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            exposures_us: vec![100_000.0, 80_000.0, 25_000.0],
            num_images: 50,
            num_seq: 1,
            plan_policy: PlanPolicy::default(),
            base_dir: PathBuf::from("."),
            file_stem: "capture".to_owned(),
            pixel_format: "Mono12".to_owned(),
            discovery_tries: 6,
            discovery_wait: Duration::from_secs(10),
            trigger_timeout: Duration::from_secs(2),
            buffer_timeout: Duration::from_secs(10),
            queue_depth: 8,
        }
    }
}

impl RunConfig {
    /// Check that the configuration describes an acquirable run.
    pub fn validate(&self) -> Result<()> {
        if self.exposures_us.is_empty() {
            return Err(CaptureError::Config {
                reason: "exposure list is empty".to_owned(),
            });
        }
        if self.exposures_us.iter().any(|exp| *exp <= 0.0) {
            return Err(CaptureError::Config {
                reason: "exposure times must be positive".to_owned(),
            });
        }
        if self.num_images == 0 {
            return Err(CaptureError::Config {
                reason: "num_images must be at least 1".to_owned(),
            });
        }
        if self.num_seq == 0 {
            return Err(CaptureError::Config {
                reason: "num_seq must be at least 1".to_owned(),
            });
        }
        if self.queue_depth == 0 {
            return Err(CaptureError::Config {
                reason: "queue_depth must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RunConfig::default().validate().expect("default should validate");
    }

    #[test]
    fn empty_exposures_rejected() {
        let config = RunConfig {
            exposures_us: Vec::new(),
            ..RunConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CaptureError::Config { .. })
        ));
    }

    #[test]
    fn non_positive_exposure_rejected() {
        let config = RunConfig {
            exposures_us: vec![100_000.0, 0.0],
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_counts_rejected() {
        let config = RunConfig {
            num_images: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            num_seq: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
