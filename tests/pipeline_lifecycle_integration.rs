//! Integration tests for pipeline lifecycle
//!
//! These tests validate the orchestration workflow end to end:
//! - Decision-point routing and the correction side channel
//! - Quiescence detection and failure short-circuit
//! - Ordered shutdown with in-flight transforms
//! - Fan-out ordering, mode parity and resume

mod common;

use common::builders::{gate, TestInput, TestPipelineBuilder};
use common::mock_helpers::{idle_source, MockSource};
use common::{finish, test_timeout, wait_until};
use proptest::prelude::*;
use sensor_pipeline::{BoundedQueue, DataSource, PipelineState, QueueState, StageKind};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn assert_fully_shut_down<T: sensor_pipeline::Payloads>(pipeline: &sensor_pipeline::Pipeline<T>) {
    let status = pipeline.status();
    assert_eq!(status.state, PipelineState::ShutDown);
    for module in &status.modules {
        assert!(module.queue.shut_down, "{} queue not shut down", module.stage);
        assert!(!module.working, "{} still working", module.stage);
    }
}

#[test]
fn test_mandatory_chain_skips_non_decision_points_sequential() {
    let (pipeline, recorder) = TestPipelineBuilder::sequential().build();
    pipeline.launch().unwrap();

    assert!(pipeline.inject_input(TestInput::keyframe(1)));
    assert!(pipeline.inject_input(TestInput::skipped(2)));
    assert!(pipeline.inject_input(TestInput::keyframe(3)));
    finish(&pipeline);

    assert_eq!(recorder.stage(StageKind::PrimaryEstimation), vec!["1", "2", "3"]);
    assert_eq!(recorder.stage(StageKind::Refinement), vec!["1", "3"]);
    assert_eq!(recorder.corrections(), vec![1, 3]);
    assert_eq!(pipeline.status().modules.len(), 2);
    assert_fully_shut_down(&pipeline);
}

#[test]
#[serial]
fn test_mandatory_chain_skips_non_decision_points_parallel() {
    let (pipeline, recorder) = TestPipelineBuilder::parallel().build();
    pipeline.launch().unwrap();

    for input in [
        TestInput::keyframe(1),
        TestInput::skipped(2),
        TestInput::keyframe(3),
    ] {
        assert!(pipeline.inject_input(input));
    }
    finish(&pipeline);

    assert_eq!(recorder.count(StageKind::Refinement), 2);
    assert_eq!(pipeline.status().feedback_deliveries, 2);
    assert!(pipeline.is_initialized());
    assert_fully_shut_down(&pipeline);
}

#[test]
fn test_failure_shuts_down_with_work_pending_sequential() {
    let (pipeline, recorder) = TestPipelineBuilder::sequential().all_stages().build();
    pipeline.launch().unwrap();

    pipeline.inject_input(TestInput::failing(1));
    for id in 2..6 {
        pipeline.inject_input(TestInput::keyframe(id));
    }
    assert!(pipeline.has_failed());
    assert!(pipeline.status().queued_items() > 0);

    let started = Instant::now();
    assert!(pipeline.shutdown_when_finished(Duration::from_millis(500)));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(pipeline.state(), PipelineState::ShutDown);
    assert!(pipeline.status().failed);
    assert_eq!(recorder.stage(StageKind::Refinement)[0], "1");
}

#[test]
#[serial]
fn test_failure_shuts_down_promptly_parallel() {
    let (refinement_gate, control) = gate();
    let (pipeline, recorder) = TestPipelineBuilder::parallel()
        .all_stages()
        .gate_refinement(refinement_gate)
        .build();
    // Only shutdown lets the held keyframes through.
    let releaser = control.clone();
    pipeline.register_shutdown_hook(move || {
        for _ in 0..8 {
            releaser.release();
        }
    });
    pipeline.launch().unwrap();

    control.release();
    assert!(pipeline.inject_input(TestInput::failing(1)));
    for id in 2..5 {
        assert!(pipeline.inject_input(TestInput::keyframe(id)));
    }
    assert_eq!(control.wait_entered(test_timeout()), Some(1));
    assert_eq!(control.wait_entered(test_timeout()), Some(2));
    assert!(wait_until(test_timeout(), || {
        let status = pipeline.status();
        status.module(StageKind::Refinement).unwrap().queue.len == 2
    }));
    assert!(pipeline.has_failed());
    assert!(pipeline.status().queued_items() >= 2);

    // Never quiescent while keyframe 2 is held: only the failure ends the wait.
    let started = Instant::now();
    assert!(pipeline.shutdown_when_finished(Duration::from_millis(5)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_fully_shut_down(&pipeline);
    assert!(pipeline.status().failed);
    assert_eq!(
        recorder.stage(StageKind::Refinement),
        vec!["1", "2", "3", "4"]
    );
}

#[test]
#[serial]
fn test_full_queue_stalls_producer_and_injection() {
    let (refinement_gate, control) = gate();
    let (pipeline, recorder) = TestPipelineBuilder::parallel()
        .capacity(1)
        .gate_refinement(refinement_gate)
        .build();
    pipeline.launch().unwrap();

    // 1 is held in refinement, 2 fills its queue, 3 stalls the primary
    // stage and 4 fills the head queue.
    for id in 1..=4 {
        assert!(pipeline.inject_input(TestInput::keyframe(id)));
    }
    assert_eq!(control.wait_entered(test_timeout()), Some(1));
    assert!(wait_until(test_timeout(), || {
        let status = pipeline.status();
        let primary = status.module(StageKind::PrimaryEstimation).unwrap();
        let refinement = status.module(StageKind::Refinement).unwrap();
        primary.working && primary.queue.len == 1 && refinement.queue.len == 1
    }));

    let handle = pipeline.input_handle();
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let injector = thread::spawn(move || {
        let _ = done_tx.send(handle.inject(TestInput::keyframe(5)));
    });

    assert!(
        done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "injection returned while the head queue was full"
    );
    let status = pipeline.status();
    let primary = status.module(StageKind::PrimaryEstimation).unwrap();
    assert!(primary.working);
    assert_eq!(primary.queue.len, primary.queue.capacity);
    assert_eq!(recorder.count(StageKind::Refinement), 0);

    for _ in 1..=5 {
        control.release();
    }
    assert_eq!(done_rx.recv_timeout(test_timeout()), Ok(true));
    injector.join().unwrap();
    finish(&pipeline);

    assert_eq!(
        recorder.stage(StageKind::Refinement),
        vec!["1", "2", "3", "4", "5"]
    );
    assert_fully_shut_down(&pipeline);
}

#[test]
fn test_sequential_queues_stay_within_capacity() {
    let (pipeline, recorder) = TestPipelineBuilder::sequential()
        .all_stages()
        .capacity(2)
        .build();
    pipeline.launch().unwrap();

    let inputs = 60u32;
    let mut keyframes = 0usize;
    for id in 0..inputs {
        let input = if id % 4 == 3 {
            TestInput::skipped(id)
        } else {
            keyframes += 1;
            TestInput::keyframe(id)
        };
        assert!(pipeline.inject_input(input));
        for module in pipeline.status().modules {
            assert!(
                module.queue.len <= module.queue.capacity,
                "{} holds {} items after input {}",
                module.stage,
                module.queue.len,
                id
            );
        }
    }
    finish(&pipeline);

    // Nothing is dropped to stay within bounds.
    let chain = inputs as usize + keyframes;
    assert_eq!(recorder.count(StageKind::Refinement), keyframes);
    assert_eq!(recorder.count(StageKind::MapReconstruction), chain);
    assert_eq!(recorder.count(StageKind::RevisitDetection), chain);
    assert_eq!(recorder.count(StageKind::Visualization), 2 * chain);
    assert_eq!(recorder.count(StageKind::Display), 2 * chain);
    assert_fully_shut_down(&pipeline);
}

#[test]
#[serial]
fn test_shutdown_waits_for_in_flight_transform() {
    let (refinement_gate, control) = gate();
    let (pipeline, recorder) = TestPipelineBuilder::parallel()
        .gate_refinement(refinement_gate)
        .build();
    let pipeline = Arc::new(pipeline);
    pipeline.launch().unwrap();

    pipeline.inject_input(TestInput::keyframe(7));
    assert_eq!(control.wait_entered(test_timeout()), Some(7));

    let done = Arc::new(AtomicBool::new(false));
    let shutdown = {
        let pipeline = Arc::clone(&pipeline);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            pipeline.shutdown();
            done.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!done.load(Ordering::SeqCst), "join returned before transform finished");
    let refinement = pipeline.status();
    let refinement = refinement.module(StageKind::Refinement).unwrap();
    assert!(refinement.working);
    assert!(refinement.queue.shut_down);

    control.release();
    shutdown.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
    assert_eq!(recorder.stage(StageKind::Refinement), vec!["7"]);
    assert_fully_shut_down(&pipeline);
}

#[test]
fn test_push_after_shutdown_returns_without_blocking() {
    let queue = BoundedQueue::new("head", 1);
    assert!(queue.push(1));
    queue.shutdown();

    let started = Instant::now();
    assert!(!queue.push_blocking(2, Duration::from_secs(10)));
    assert!(!queue.push(3));
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(queue.state(), QueueState::Draining);
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), None);
    assert_eq!(queue.state(), QueueState::ShutDown);
}

#[test]
#[serial]
fn test_inject_after_shutdown_is_rejected() {
    let (pipeline, recorder) = TestPipelineBuilder::parallel().capacity(1).build();
    pipeline.launch().unwrap();
    pipeline.shutdown();

    let started = Instant::now();
    for id in 0..10 {
        assert!(!pipeline.inject_input(TestInput::keyframe(id)));
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(recorder.count(StageKind::PrimaryEstimation), 0);
}

#[test]
#[serial]
fn test_shutdown_is_idempotent() {
    let (pipeline, _recorder) = TestPipelineBuilder::parallel().all_stages().build();
    pipeline.register_data_source(Arc::new(idle_source()));
    pipeline.launch().unwrap();
    for id in 0..4 {
        pipeline.inject_input(TestInput::keyframe(id));
    }
    finish(&pipeline);

    let once = pipeline.status();
    pipeline.shutdown();
    pipeline.shutdown();
    assert_eq!(pipeline.status(), once);
    assert_fully_shut_down(&pipeline);
}

#[test]
fn test_shutdown_without_launch_tolerates_missing_threads() {
    let (pipeline, _recorder) = TestPipelineBuilder::parallel().all_stages().build();
    assert_eq!(pipeline.state(), PipelineState::Built);
    pipeline.shutdown();
    assert_fully_shut_down(&pipeline);
}

#[test]
#[serial]
fn test_fan_out_preserves_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = common::builders::Recorder::default();
    let mut builder = TestPipelineBuilder::parallel().builder(&recorder);
    for subscriber in ["a", "b", "c"] {
        let log = Arc::clone(&log);
        builder = builder.on_estimate(move |estimate| {
            log.lock().unwrap().push(format!("{}{}", subscriber, estimate.id));
        });
    }
    let pipeline = builder.build().unwrap();
    pipeline.launch().unwrap();

    for id in 0..3 {
        pipeline.inject_input(TestInput::skipped(id));
    }
    finish(&pipeline);

    assert_eq!(
        *log.lock().unwrap(),
        vec!["a0", "b0", "c0", "a1", "b1", "c1", "a2", "b2", "c2"]
    );
}

#[test]
fn test_sequential_steps_in_topological_order() {
    let (pipeline, recorder) = TestPipelineBuilder::sequential().all_stages().build();
    pipeline.launch().unwrap();
    pipeline.inject_input(TestInput::keyframe(1));

    // One injection steps every stage once: the map sees the estimate, the
    // visualizer sees the estimate and its frame reaches the display.
    assert_eq!(
        recorder.events(),
        vec![
            (StageKind::PrimaryEstimation, "1".to_string()),
            (StageKind::Refinement, "1".to_string()),
            (StageKind::MapReconstruction, "E1".to_string()),
            (StageKind::RevisitDetection, "E1".to_string()),
            (StageKind::Visualization, "E1".to_string()),
            (StageKind::Display, "frame:E1".to_string()),
        ]
    );
    finish(&pipeline);
}

#[test]
#[serial]
fn test_sequential_and_parallel_parity() {
    let inputs: Vec<TestInput> = (0..12)
        .map(|id| {
            if id % 3 == 1 {
                TestInput::skipped(id)
            } else {
                TestInput::keyframe(id)
            }
        })
        .collect();

    let run = |builder: TestPipelineBuilder| {
        let (pipeline, recorder) = builder.all_stages().build();
        pipeline.launch().unwrap();
        for input in &inputs {
            assert!(pipeline.inject_input(*input));
        }
        finish(&pipeline);
        recorder
    };
    let sequential = run(TestPipelineBuilder::sequential());
    let parallel = run(TestPipelineBuilder::parallel());

    // Chain stages have a single producer: identical order.
    for stage in [StageKind::PrimaryEstimation, StageKind::Refinement] {
        assert_eq!(sequential.stage(stage), parallel.stage(stage), "{}", stage);
    }
    assert_eq!(sequential.corrections(), parallel.corrections());

    // Fan-in stages may interleave producers differently but see the same items.
    for stage in [
        StageKind::MapReconstruction,
        StageKind::RevisitDetection,
        StageKind::Visualization,
        StageKind::Display,
    ] {
        let mut seq = sequential.stage(stage);
        let mut par = parallel.stage(stage);
        seq.sort();
        par.sort();
        assert_eq!(seq, par, "{}", stage);
    }
}

#[test]
#[serial]
fn test_resume_accepts_input_again() {
    let (pipeline, recorder) = TestPipelineBuilder::parallel().all_stages().build();
    pipeline.launch().unwrap();
    for id in 0..3 {
        pipeline.inject_input(TestInput::keyframe(id));
    }
    finish(&pipeline);
    assert!(!pipeline.inject_input(TestInput::keyframe(99)));

    pipeline.resume().unwrap();
    assert_eq!(pipeline.state(), PipelineState::Built);
    for module in pipeline.status().modules {
        assert_eq!(module.queue.state, QueueState::Active);
    }

    pipeline.launch().unwrap();
    for id in 3..6 {
        assert!(pipeline.inject_input(TestInput::keyframe(id)));
    }
    finish(&pipeline);

    assert_eq!(
        recorder.stage(StageKind::Refinement),
        vec!["0", "1", "2", "3", "4", "5"]
    );
    assert_fully_shut_down(&pipeline);
}

#[test]
#[serial]
fn test_working_data_source_delays_shutdown() {
    let (pipeline, _recorder) = TestPipelineBuilder::parallel().build();
    let working = Arc::new(AtomicBool::new(true));
    let mut source = MockSource::new();
    let flag = Arc::clone(&working);
    source
        .expect_is_working()
        .returning(move || flag.load(Ordering::SeqCst));
    source.expect_shutdown().times(1).return_const(());
    let source: Arc<dyn DataSource> = Arc::new(source);
    pipeline.register_data_source(source);
    pipeline.launch().unwrap();

    let pipeline = Arc::new(pipeline);
    let waiter = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || pipeline.shutdown_when_finished(Duration::from_millis(5)))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(pipeline.state(), PipelineState::Running);
    working.store(false, Ordering::SeqCst);
    assert!(waiter.join().unwrap());
    assert_eq!(pipeline.state(), PipelineState::ShutDown);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_any_input_sequence_drains_to_shutdown(decisions in proptest::collection::vec(any::<bool>(), 0..24)) {
        let (pipeline, recorder) = TestPipelineBuilder::sequential().all_stages().build();
        pipeline.launch().unwrap();
        for (id, decision) in decisions.iter().enumerate() {
            let input = if *decision {
                TestInput::keyframe(id as u32)
            } else {
                TestInput::skipped(id as u32)
            };
            prop_assert!(pipeline.inject_input(input));
        }
        finish(&pipeline);

        let keyframes = decisions.iter().filter(|d| **d).count();
        prop_assert_eq!(recorder.count(StageKind::PrimaryEstimation), decisions.len());
        prop_assert_eq!(recorder.count(StageKind::Refinement), keyframes);
        prop_assert_eq!(recorder.count(StageKind::MapReconstruction), decisions.len() + keyframes);
        let status = pipeline.status();
        prop_assert_eq!(status.state, PipelineState::ShutDown);
        for module in &status.modules {
            prop_assert!(module.queue.shut_down);
            prop_assert!(!module.working);
        }
    }
}
