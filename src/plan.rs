//! Exposure plan construction.
//!
//! Resolves the requested exposure list against the device-reported
//! exposure and frame-rate limits before any stream activity begins. The
//! fast path acquires only the first (fastest) exposure per sequence
//! repetition; when that exposure is infeasible at the device's limits the
//! plan switches to the full multi-exposure bracket instead of clipping
//! values element by element.

use tracing::{info, warn};

use crate::config::PlanPolicy;
use crate::error::{CaptureError, Result};

/// Resolved, bounds-checked exposure schedule for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposurePlan {
    /// Exposure levels to cycle through per sequence repetition, in order.
    pub exposures_us: Vec<f64>,
    /// Frame rate to program, already inside the device's allowed range.
    pub frame_rate_hz: f64,
    /// True when the derived rate fell outside the allowed range.
    pub rate_clamped: bool,
    /// True when the fast path was infeasible and the plan fell back to
    /// the full bracket.
    pub fallback: bool,
}

impl ExposurePlan {
    /// Build a plan from the requested exposures and device limits.
    ///
    /// `exposure_bounds` and `rate_bounds` are the device-reported
    /// `[min, max]` ranges for `ExposureTime` (µs) and
    /// `AcquisitionFrameRate` (Hz).
    pub fn build(
        requested: &[f64],
        policy: PlanPolicy,
        exposure_bounds: (f64, f64),
        rate_bounds: (f64, f64),
    ) -> Result<Self> {
        let Some(&first) = requested.first() else {
            return Err(CaptureError::Config {
                reason: "exposure list is empty".to_owned(),
            });
        };
        let (exp_min, exp_max) = exposure_bounds;
        let (rate_min, rate_max) = rate_bounds;

        // The rate target derives from the requested fastest exposure,
        // before any exposure clamping.
        let desired_rate = 1_000_000.0 / first;
        let frame_rate_hz = desired_rate.clamp(rate_min, rate_max);
        let rate_clamped = (frame_rate_hz - desired_rate).abs() > f64::EPSILON;
        if rate_clamped {
            warn!(
                desired_rate,
                rate_min, rate_max, "frame rate out of range, clamping to nearest bound"
            );
        }

        let smallest = requested.iter().copied().fold(f64::INFINITY, f64::min);
        let infeasible = first > exp_max || smallest < exp_min;

        let (exposures_us, fallback) = match policy {
            PlanPolicy::FastestWithFallback if !infeasible => (vec![first], false),
            PlanPolicy::FastestWithFallback => {
                // Fallback always pins the first level to the device max,
                // even when the trigger was a too-small exposure further
                // down the list.
                let mut exposures = requested.to_vec();
                if let Some(head) = exposures.first_mut() {
                    *head = exp_max;
                }
                info!(
                    ?exposures,
                    "fast path infeasible at device limits, acquiring full bracket"
                );
                (exposures, true)
            }
            PlanPolicy::FullBracket => {
                let mut exposures = requested.to_vec();
                if let Some(head) = exposures.first_mut() {
                    *head = head.min(exp_max);
                }
                (exposures, false)
            }
        };

        Ok(Self {
            exposures_us,
            frame_rate_hz,
            rate_clamped,
            fallback,
        })
    }

    /// Number of exposure levels cycled per sequence repetition.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.exposures_us.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATES: (f64, f64) = (0.1, 30.0);

    #[test]
    fn in_bounds_request_takes_fast_path() {
        let plan = ExposurePlan::build(
            &[100_000.0, 80_000.0, 25_000.0],
            PlanPolicy::FastestWithFallback,
            (10.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");

        assert_eq!(plan.exposures_us, vec![100_000.0]);
        assert!(!plan.fallback);
    }

    #[test]
    fn first_above_max_falls_back_to_bracket() {
        let plan = ExposurePlan::build(
            &[250_000.0, 80_000.0, 25_000.0],
            PlanPolicy::FastestWithFallback,
            (30_000.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");

        // First level replaced by the device max; the rest untouched, even
        // the one below the device minimum.
        assert_eq!(plan.exposures_us, vec![200_000.0, 80_000.0, 25_000.0]);
        assert!(plan.fallback);
    }

    #[test]
    fn smallest_below_min_falls_back_to_bracket() {
        // Fallback is triggered by the 25 ms level sitting below the
        // 30 ms floor; the first level is still replaced by the device
        // max, not left at its in-range request.
        let plan = ExposurePlan::build(
            &[100_000.0, 80_000.0, 25_000.0],
            PlanPolicy::FastestWithFallback,
            (30_000.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");

        assert_eq!(plan.exposures_us, vec![200_000.0, 80_000.0, 25_000.0]);
        assert!(plan.fallback);
    }

    #[test]
    fn frame_rate_within_range_is_used_exactly() {
        let plan = ExposurePlan::build(
            &[100_000.0],
            PlanPolicy::FastestWithFallback,
            (10.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");

        assert!((plan.frame_rate_hz - 10.0).abs() < 1e-9);
        assert!(!plan.rate_clamped);
    }

    #[test]
    fn frame_rate_clamps_to_nearest_bound() {
        // 25 ms fastest exposure -> 40 Hz, above the 30 Hz cap.
        let plan = ExposurePlan::build(
            &[25_000.0],
            PlanPolicy::FastestWithFallback,
            (10.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");
        assert!((plan.frame_rate_hz - 30.0).abs() < 1e-9);
        assert!(plan.rate_clamped);

        // 20 s exposure -> 0.05 Hz, below the floor.
        let plan = ExposurePlan::build(
            &[20_000_000.0],
            PlanPolicy::FastestWithFallback,
            (10.0, 30_000_000.0),
            RATES,
        )
        .expect("plan should build");
        assert!((plan.frame_rate_hz - 0.1).abs() < 1e-9);
        assert!(plan.rate_clamped);
    }

    #[test]
    fn full_bracket_keeps_every_level() {
        let plan = ExposurePlan::build(
            &[250_000.0, 80_000.0, 25_000.0],
            PlanPolicy::FullBracket,
            (10.0, 200_000.0),
            RATES,
        )
        .expect("plan should build");

        assert_eq!(plan.exposures_us, vec![200_000.0, 80_000.0, 25_000.0]);
        assert!(!plan.fallback);
        assert_eq!(plan.levels(), 3);
    }

    #[test]
    fn empty_request_is_rejected() {
        let result = ExposurePlan::build(
            &[],
            PlanPolicy::FastestWithFallback,
            (10.0, 200_000.0),
            RATES,
        );
        assert!(matches!(result, Err(CaptureError::Config { .. })));
    }
}
