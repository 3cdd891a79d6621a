use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use super::controller::{EVENT_CAPACITY, RunController};
use super::test_support::*;
use crate::cancel::RunState;
use crate::error::StartError;
use crate::events::RunEvent;
use crate::task::{ActionSpec, FocusPolicy, RunConfig};

fn idle_config() -> RunConfig {
    let mut config = run_config(vec![task(&[&["a.png"]], 0, vec![ActionSpec::Click])]);
    config.poll_interval = Duration::from_secs(10);
    config
}

/// Collect events until `Finished` arrives or `timeout` passes.
fn drain_until_finished(rx: &Receiver<RunEvent>, timeout: Duration) -> Vec<RunEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => {
                let finished = matches!(event, RunEvent::Finished(_));
                events.push(event);
                if finished {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    events
}

fn wait_for_state(controller: &RunController, state: RunState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if controller.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    controller.state() == state
}

#[test]
fn second_start_is_rejected_while_running() {
    let mut controller = RunController::with_platform(Box::new(TestPlatform::default()));

    controller.start(idle_config(), 1).unwrap();
    assert!(controller.is_running());
    assert!(matches!(
        controller.start(idle_config(), 1),
        Err(StartError::AlreadyRunning)
    ));

    controller.stop();
    assert_eq!(controller.state(), RunState::Idle);
}

#[test]
fn stop_is_idempotent_and_safe_when_idle() {
    let mut controller = RunController::with_platform(Box::new(TestPlatform::default()));
    controller.stop();
    assert_eq!(controller.state(), RunState::Idle);

    controller.start(idle_config(), 1).unwrap();
    let started = Instant::now();
    controller.stop();
    controller.stop();
    controller.stop();
    assert!(started.elapsed() < Duration::from_secs(1), "sleeping loop must wake on stop");
    assert_eq!(controller.state(), RunState::Idle);

    let events = drain_until_finished(&controller.events(), Duration::from_secs(1));
    assert!(matches!(events.first(), Some(RunEvent::Started(_))));
    assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
    assert!(!events.iter().any(|e| matches!(e, RunEvent::Fault(_))));
}

#[test]
fn invalid_config_never_starts() {
    let mut controller = RunController::with_platform(Box::new(TestPlatform::default()));

    let err = controller.start(run_config(vec![]), 1).unwrap_err();
    assert!(matches!(err, StartError::Config(_)));
    assert_eq!(controller.state(), RunState::Idle);

    controller.start(idle_config(), 1).unwrap();
    controller.stop();
}

#[test]
fn can_restart_after_stop_with_a_new_run_id() {
    let mut controller = RunController::with_platform(Box::new(TestPlatform::default()));
    let events = controller.events();

    controller.start(idle_config(), 1).unwrap();
    controller.stop();
    let first = drain_until_finished(&events, Duration::from_secs(1));

    controller.start(idle_config(), 1).unwrap();
    controller.stop();
    let second = drain_until_finished(&events, Duration::from_secs(1));

    let run_id = |events: &[RunEvent]| match events.first() {
        Some(RunEvent::Started(id)) => *id,
        other => panic!("expected Started, got {other:?}"),
    };
    assert_ne!(run_id(&first), run_id(&second));
}

#[test]
fn matching_run_clicks_until_stopped() {
    let platform = TestPlatform {
        scorer: ScriptedScorer::default().with("a.png", 0.9, (0, 0)),
        ..Default::default()
    };
    let input = platform.input.clone();
    let mut config = idle_config();
    config.tasks[0].delay = Duration::from_millis(20);
    let mut controller = RunController::with_platform(Box::new(platform));

    controller.start(config, 1).unwrap();
    thread::sleep(Duration::from_millis(150));
    controller.stop();

    let clicks = input.clicks();
    assert!(clicks >= 2, "only {clicks} clicks");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(input.clicks(), clicks, "no input after stop returned");
}

#[test]
fn fault_is_surfaced_once_and_run_tears_down() {
    let platform = TestPlatform {
        source: MemorySource {
            missing: vec!["a.png".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let mut controller = RunController::with_platform(Box::new(platform));
    let events = controller.events();

    controller.start(idle_config(), 1).unwrap();
    let seen = drain_until_finished(&events, Duration::from_secs(2));

    let faults: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            RunEvent::Fault(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(faults.len(), 1, "{seen:?}");
    assert!(faults[0].contains("a.png"), "{}", faults[0]);
    assert!(matches!(seen.last(), Some(RunEvent::Finished(_))));
    assert!(wait_for_state(&controller, RunState::Idle, Duration::from_secs(1)));

    // The faulted worker is reaped by the next start.
    controller.start(idle_config(), 1).unwrap();
    controller.stop();
}

#[test]
fn teardown_releases_cached_templates() {
    let platform = TestPlatform {
        scorer: ScriptedScorer::default().with("a.png", 0.1, (0, 0)),
        ..Default::default()
    };
    let mut controller = RunController::with_platform(Box::new(platform));
    let events = controller.events();

    controller.start(idle_config(), 1).unwrap();
    thread::sleep(Duration::from_millis(50));
    controller.stop();

    let seen = drain_until_finished(&events, Duration::from_secs(1));
    assert!(
        seen.iter().any(|e| matches!(
            e,
            RunEvent::Diagnostic { message, .. } if message.contains("released 1 cached templates")
        )),
        "{seen:?}"
    );
}

#[test]
fn stop_interrupts_a_blocked_capture_within_bounds() {
    let platform = TestPlatform {
        backend: MockBackend {
            block_for: Some(Duration::from_secs(5)),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut controller = RunController::with_platform(Box::new(platform));
    let events = controller.events();

    controller.start(idle_config(), 1).unwrap();
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    controller.stop();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(1900), "graceful wait skipped: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3500), "caller blocked for {elapsed:?}");

    let seen = drain_until_finished(&events, Duration::from_secs(2));
    assert!(matches!(seen.last(), Some(RunEvent::Finished(_))), "{seen:?}");
    assert!(!seen.iter().any(|e| matches!(e, RunEvent::Fault(_))), "{seen:?}");
    assert!(wait_for_state(&controller, RunState::Idle, Duration::from_secs(1)));
}

#[test]
fn dropping_the_controller_stops_the_run() {
    let platform = TestPlatform {
        scorer: ScriptedScorer::default().with("a.png", 0.9, (0, 0)),
        ..Default::default()
    };
    let input = platform.input.clone();
    let mut config = idle_config();
    config.tasks[0].delay = Duration::from_millis(10);

    let mut controller = RunController::with_platform(Box::new(platform));
    controller.start(config, 1).unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(controller);

    let clicks = input.clicks();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(input.clicks(), clicks);
}

#[test]
fn undrained_events_stay_bounded_and_keep_the_latest() {
    // Every sweep matches and warns about the target index, with no pacing.
    let platform = TestPlatform {
        scorer: ScriptedScorer::default().with("a.png", 0.9, (0, 0)),
        ..Default::default()
    };
    let config = run_config(vec![task(&[&["a.png"]], 5, vec![ActionSpec::Click])]);
    let mut controller = RunController::with_platform(Box::new(platform));
    let events = controller.events();

    controller.start(config, 1).unwrap();
    thread::sleep(Duration::from_millis(200));
    controller.stop();

    let seen: Vec<RunEvent> = events.try_iter().collect();
    assert!(seen.len() <= EVENT_CAPACITY, "{} events queued", seen.len());
    assert!(matches!(seen.last(), Some(RunEvent::Finished(_))), "{:?}", seen.last());
}

#[test]
fn focus_loss_ends_the_run_under_the_stop_policy() {
    let platform = TestPlatform {
        scorer: ScriptedScorer::default().with("a.png", 0.9, (0, 0)),
        ..Default::default()
    };
    let unfocused = platform.backend.unfocused.clone();
    let input = platform.input.clone();
    let mut config = idle_config();
    config.poll_interval = Duration::from_millis(20);
    config.tasks[0].delay = Duration::from_millis(20);
    config.on_focus_loss = FocusPolicy::Stop;
    let mut controller = RunController::with_platform(Box::new(platform));
    let events = controller.events();

    controller.start(config, 1).unwrap();
    thread::sleep(Duration::from_millis(60));
    unfocused.store(true, Ordering::SeqCst);

    let seen = drain_until_finished(&events, Duration::from_secs(2));
    assert!(matches!(seen.last(), Some(RunEvent::Finished(_))), "{seen:?}");
    assert!(
        seen.iter().any(|e| matches!(
            e,
            RunEvent::Diagnostic { message, .. } if message.contains("lost focus")
        )),
        "{seen:?}"
    );
    assert!(!seen.iter().any(|e| matches!(e, RunEvent::Fault(_))), "{seen:?}");
    assert!(wait_for_state(&controller, RunState::Idle, Duration::from_secs(1)));

    let clicks = input.clicks();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(input.clicks(), clicks);
    controller.stop();
}
