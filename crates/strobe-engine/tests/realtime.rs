//! Integration test: the realtime render loop commits on the render thread
//! while workers compute, and shuts down cleanly.

use std::sync::Arc;
use std::time::Duration;

use strobe_core::{ArmingCondition, EventId, FrameId, NoExternalLock, Phase, UnitFlags};
use strobe_engine::{EngineConfig, RealtimeEngine};
use strobe_test_utils::{EventLog, RecordingProcessor, RecordingTarget};

const WAIT: Duration = Duration::from_secs(10);

fn config() -> EngineConfig {
    EngineConfig {
        worker_count: Some(2),
        target_frame_rate_hz: 240,
        ..EngineConfig::default()
    }
}

#[test]
fn commits_run_on_render_thread_computes_on_workers() {
    let target = RecordingTarget::new();
    let mut engine =
        RealtimeEngine::new(config(), Box::new(target.clone()), Arc::new(NoExternalLock)).unwrap();
    let log = EventLog::new();
    engine
        .scheduler()
        .register(
            RecordingProcessor::new("spin", &log)
                .armed(ArmingCondition::NewFrame)
                .boxed(),
            UnitFlags::default(),
        )
        .unwrap();

    let start = engine.last_committed();
    assert!(engine.wait_committed(FrameId(start.0 + 5), WAIT));
    let report = engine.shutdown();
    assert!(report.render_joined);
    assert_eq!(report.workers_joined, 2);

    let commits = log.of("spin", Phase::Commit);
    assert!(commits.len() >= 3);
    assert!(commits
        .iter()
        .all(|e| e.thread_name.as_deref() == Some("strobe-render")));
    assert!(log
        .of("spin", Phase::Compute)
        .iter()
        .all(|e| e.thread_name.as_deref().is_some_and(|n| n.starts_with("strobe-worker-"))));

    let frames = target.frames();
    assert!(frames.windows(2).all(|w| w[0] <= w[1]));
    let stats = engine.stats();
    assert!(stats.frames_committed >= 5);
    assert_eq!(stats.compute_failures, 0);
}

#[test]
fn events_posted_from_app_thread_are_committed() {
    let mut engine = RealtimeEngine::new(
        config(),
        Box::new(RecordingTarget::new()),
        Arc::new(NoExternalLock),
    )
    .unwrap();
    let log = EventLog::new();
    engine
        .scheduler()
        .register(
            RecordingProcessor::new("listener", &log)
                .armed(ArmingCondition::post_event([EventId(3)]))
                .boxed(),
            UnitFlags::default(),
        )
        .unwrap();

    let handle = engine.handle();
    assert_eq!(handle.distribute_post_event(EventId(3)), 1);
    let seen = engine.last_committed();
    assert!(engine.wait_committed(FrameId(seen.0 + 3), WAIT));
    engine.shutdown();
    assert_eq!(log.count("listener", Phase::Commit), 1);
}

#[test]
fn shutdown_is_prompt_and_idempotent() {
    let mut engine = RealtimeEngine::new(
        EngineConfig {
            target_frame_rate_hz: 10,
            ..config()
        },
        Box::new(RecordingTarget::new()),
        Arc::new(NoExternalLock),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let report = engine.shutdown();
    // The render thread is parked for up to 100ms; unpark wakes it early.
    assert!(report.total_ms < 1_000, "shutdown took {}ms", report.total_ms);
    assert!(!engine.is_running());
    let again = engine.shutdown();
    assert_eq!(again.workers_joined, 0);
    assert!(!engine.wait_committed(FrameId(u64::MAX), Duration::from_millis(10)));
}
