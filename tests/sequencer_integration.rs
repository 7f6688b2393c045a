//! End-to-end acquisition runs against the simulated camera.
//!
//! These tests drive the full sequencer path: discovery, control
//! snapshot, exposure planning, triggered bursts, persistence hand-off,
//! and the unconditional restore-and-release teardown.

use std::time::Duration;

use serial_test::serial;

use trig_cam_capture::sim::{SimCamera, SimProvider};
use trig_cam_capture::{
    controls, discover_with_retries, CaptureError, CapturedFrame, ControlValue, FrameSink,
    PersistenceWorker, PgmWriter, PlanPolicy, RunConfig, Sequencer, TriggerCamera,
};

/// Sink collecting frames in memory.
#[derive(Default)]
struct VecSink {
    frames: Vec<CapturedFrame>,
}

impl FrameSink for VecSink {
    fn submit(&mut self, frame: CapturedFrame) -> trig_cam_capture::Result<()> {
        self.frames.push(frame);
        Ok(())
    }
}

fn test_config(num_images: u32, num_seq: u32) -> RunConfig {
    RunConfig {
        exposures_us: vec![100_000.0, 80_000.0, 25_000.0],
        num_images,
        num_seq,
        trigger_timeout: Duration::from_millis(200),
        buffer_timeout: Duration::from_millis(200),
        ..RunConfig::default()
    }
}

fn assert_initial_controls(camera: &SimCamera) {
    let expected = [
        (controls::TRIGGER_MODE, ControlValue::Str("Off".to_owned())),
        (controls::TRIGGER_SOURCE, ControlValue::Str("Line0".to_owned())),
        (
            controls::TRIGGER_SELECTOR,
            ControlValue::Str("FrameStart".to_owned()),
        ),
        (
            controls::EXPOSURE_AUTO,
            ControlValue::Str("Continuous".to_owned()),
        ),
        (controls::EXPOSURE_TIME, ControlValue::Float(100_000.0)),
    ];
    for (name, value) in expected {
        assert_eq!(
            camera.read_control(name).expect("read should succeed"),
            value,
            "control {name} should be restored to its captured value"
        );
    }
}

#[test]
fn fast_path_persists_one_level_per_sequence() {
    let mut camera = SimCamera::new();
    let mut sink = VecSink::default();
    let sequencer = Sequencer::new(test_config(6, 2)).expect("config should validate");

    let stats = sequencer
        .run(&mut camera, &mut sink)
        .expect("run should succeed");

    // All requested exposures within [10, 200000] us: single-level plan.
    assert_eq!(stats.plan.exposures_us, vec![100_000.0]);
    assert_eq!(stats.bursts.len(), 2);
    assert_eq!(stats.frames_persisted(), 12);
    assert_eq!(sink.frames.len(), 12);

    // One settling discard per (sequence, level).
    let settling: u32 = stats.bursts.iter().map(|b| b.settling_discarded).sum();
    assert_eq!(settling, 2);

    // Strict 1:1 trigger/retrieval pairing across the whole run.
    assert_eq!(camera.trigger_fires(), camera.retrievals());
    assert_eq!(camera.outstanding_buffers(), 0);

    assert_initial_controls(&camera);
}

#[test]
fn infeasible_fast_path_acquires_full_bracket() {
    let mut camera = SimCamera::builder()
        .exposure_bounds(30_000.0, 200_000.0)
        .build();
    let mut sink = VecSink::default();
    let config = RunConfig {
        exposures_us: vec![250_000.0, 80_000.0, 25_000.0],
        ..test_config(4, 1)
    };
    let sequencer = Sequencer::new(config).expect("config should validate");

    let stats = sequencer
        .run(&mut camera, &mut sink)
        .expect("run should succeed");

    assert_eq!(
        stats.plan.exposures_us,
        vec![200_000.0, 80_000.0, 25_000.0]
    );
    assert!(stats.plan.fallback);
    assert_eq!(stats.frames_persisted(), 12);

    // Each frame's metadata carries its level assignment.
    for frame in &sink.frames {
        let expected = stats
            .plan
            .exposures_us
            .get(frame.metadata.exposure_index)
            .copied()
            .expect("level index in plan");
        assert!((frame.metadata.exposure_seconds - expected / 1_000_000.0).abs() < 1e-12);
    }

    assert_initial_controls(&camera);
}

#[test]
fn programmed_frame_rate_stays_within_device_range() {
    // Fastest exposure 25 ms -> 40 Hz, above the simulated 30 Hz cap.
    let mut camera = SimCamera::builder().rate_bounds(0.1, 30.0).build();
    let mut sink = VecSink::default();
    let config = RunConfig {
        exposures_us: vec![25_000.0],
        ..test_config(2, 1)
    };
    let sequencer = Sequencer::new(config).expect("config should validate");

    let stats = sequencer
        .run(&mut camera, &mut sink)
        .expect("run should succeed");

    assert!(stats.plan.rate_clamped);
    assert!((stats.plan.frame_rate_hz - 30.0).abs() < 1e-9);
}

#[test]
#[serial]
fn full_run_writes_named_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut camera = SimCamera::new();
    let config = RunConfig {
        base_dir: dir.path().to_path_buf(),
        file_stem: "eclipse".to_owned(),
        ..test_config(3, 1)
    };
    let mut worker = PersistenceWorker::spawn(
        PgmWriter,
        config.base_dir.clone(),
        config.file_stem.clone(),
        config.queue_depth,
    );
    let sequencer = Sequencer::new(config).expect("config should validate");

    sequencer
        .run(&mut camera, &mut worker)
        .expect("run should succeed");
    let written = worker.finish().expect("writer should succeed");
    assert_eq!(written, 3);

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 3);
    for (i, name) in names.iter().enumerate() {
        assert!(name.starts_with("eclipse_"), "unexpected name {name}");
        assert!(
            name.ends_with(&format!("_seq0_exp1_i{i:02}.pgm")),
            "unexpected name {name}"
        );
    }
}

#[test]
#[serial]
fn buffer_failure_shortens_burst_and_still_restores() {
    let dir = tempfile::tempdir().expect("tempdir");
    // 1 settling frame + 4 data frames succeed, the fifth data frame fails.
    let mut camera = SimCamera::builder().fail_buffer_after(5).build();
    let config = RunConfig {
        base_dir: dir.path().to_path_buf(),
        ..test_config(50, 1)
    };
    let mut worker = PersistenceWorker::spawn(
        PgmWriter,
        config.base_dir.clone(),
        config.file_stem.clone(),
        config.queue_depth,
    );
    let sequencer = Sequencer::new(config).expect("config should validate");

    let result = sequencer.run(&mut camera, &mut worker);
    assert!(matches!(
        result,
        Err(CaptureError::BufferRetrieval { .. })
    ));

    // Fewer frames than requested were persisted, observably.
    let written = worker.finish().expect("writes that happened succeed");
    assert_eq!(written, 4);
    assert_eq!(std::fs::read_dir(dir.path()).expect("read dir").count(), 4);

    // The failed run still ran its scoped teardown.
    assert_initial_controls(&camera);
}

#[test]
fn missing_control_fails_before_any_mutation() {
    let mut camera = SimCamera::builder()
        .without_control(controls::TRIGGER_SOURCE)
        .build();
    let mut sink = VecSink::default();
    let sequencer = Sequencer::new(test_config(3, 1)).expect("config should validate");

    let result = sequencer.run(&mut camera, &mut sink);
    assert!(matches!(result, Err(CaptureError::ControlMissing { .. })));

    // Snapshot capture failed first, so nothing was written.
    assert_eq!(
        camera.read_control(controls::TRIGGER_MODE).expect("read"),
        ControlValue::Str("Off".to_owned())
    );
    assert!(sink.frames.is_empty());
}

#[test]
fn unwritable_trigger_control_fails_before_streaming() {
    let mut camera = SimCamera::builder()
        .read_only_control(controls::TRIGGER_SOFTWARE)
        .build();
    let mut sink = VecSink::default();
    let sequencer = Sequencer::new(test_config(3, 1)).expect("config should validate");

    let result = sequencer.run(&mut camera, &mut sink);
    assert!(matches!(
        result,
        Err(CaptureError::ControlNotWritable { .. })
    ));
    assert!(sink.frames.is_empty());
    assert_eq!(camera.retrievals(), 0);

    // Controls mutated during preparation were restored.
    assert_initial_controls(&camera);
}

#[test]
fn discovery_retries_until_device_appears() {
    let mut provider = SimProvider::with_camera(SimCamera::new()).empty_results(2);
    let device = discover_with_retries(&mut provider, 6, Duration::from_millis(1));
    assert!(device.is_ok());
    assert_eq!(provider.calls(), 3);
}

#[test]
fn discovery_gives_up_after_bounded_tries() {
    let mut provider = SimProvider::default().empty_results(u32::MAX);
    let result = discover_with_retries(&mut provider, 3, Duration::from_millis(1));
    assert!(matches!(
        result,
        Err(CaptureError::DeviceNotFound { tries: 3 })
    ));
    assert_eq!(provider.calls(), 3);
}

/// Sink that requests an abort after a fixed number of frames.
struct AbortingSink {
    inner: VecSink,
    abort_after: usize,
    handle: trig_cam_capture::AbortHandle,
}

impl FrameSink for AbortingSink {
    fn submit(&mut self, frame: CapturedFrame) -> trig_cam_capture::Result<()> {
        self.inner.submit(frame)?;
        if self.inner.frames.len() >= self.abort_after {
            self.handle.abort();
        }
        Ok(())
    }
}

#[test]
fn abort_skips_remaining_work_but_restores() {
    let mut camera = SimCamera::new();
    let sequencer = Sequencer::new(RunConfig {
        plan_policy: PlanPolicy::FullBracket,
        ..test_config(10, 3)
    })
    .expect("config should validate");

    let mut sink = AbortingSink {
        inner: VecSink::default(),
        abort_after: 3,
        handle: sequencer.abort_handle(),
    };

    let stats = sequencer
        .run(&mut camera, &mut sink)
        .expect("aborted run still succeeds");

    assert!(stats.aborted);
    // The abort landed mid-first-burst: far fewer than the 90 frames a
    // full run would produce.
    assert_eq!(stats.frames_persisted(), 3);
    assert_eq!(sink.inner.frames.len(), 3);
    assert_initial_controls(&camera);
}
